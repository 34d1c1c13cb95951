use std::sync::Arc;

use poem::Result as PoemResult;
use poem_openapi::{
    OpenApi,
    param::{Path, Query},
    payload::Json,
};
use uuid::Uuid;

use crate::presentation::{
    http::{
        endpoints::root::{ApiState, EndpointsTags},
        errors::problem,
        mappers::map_outbox_event,
        responses::OutboxEventDto,
    },
    models::OutboxStateKind,
};

/// Operator view of the outbox.
#[derive(Clone)]
pub struct OutboxEndpoints {
    state: Arc<ApiState>,
}

impl OutboxEndpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}

#[OpenApi]
impl OutboxEndpoints {
    #[oai(path = "/outbox", method = "get", tag = EndpointsTags::Outbox)]
    pub async fn list_outbox_events(
        &self,
        state: Query<Option<OutboxStateKind>>,
        limit: Query<Option<u32>>,
    ) -> PoemResult<Json<Vec<OutboxEventDto>>> {
        let events = self
            .state
            .list_outbox_events_usecase
            .execute(state.0.unwrap_or_default().into(), limit.0)
            .await
            .map_err(problem)?;

        Ok(Json(events.iter().map(map_outbox_event).collect()))
    }

    #[oai(
        path = "/outbox/:outbox_id/release",
        method = "post",
        tag = EndpointsTags::Outbox,
    )]
    pub async fn release_outbox_event(
        &self,
        outbox_id: Path<Uuid>,
    ) -> PoemResult<Json<OutboxEventDto>> {
        let event = self
            .state
            .release_outbox_event_usecase
            .execute(outbox_id.0)
            .await
            .map_err(problem)?;

        Ok(Json(map_outbox_event(&event)))
    }
}
