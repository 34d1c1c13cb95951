use poem::{Result as PoemResult, http::StatusCode};
use poem_openapi::{OpenApi, payload::PlainText};
use tracing::warn;

use crate::{
    domain::models::OutboxState,
    presentation::http::endpoints::root::{Endpoints, EndpointsTags},
};

#[OpenApi]
impl Endpoints {
    /// Reports `OK` once the outbox store answers queries.
    #[oai(path = "/health", method = "get", tag = EndpointsTags::Health)]
    pub async fn health(&self) -> PoemResult<PlainText<&'static str>> {
        self.state
            .list_outbox_events_usecase
            .execute(OutboxState::Pending, Some(1))
            .await
            .map_err(|err| {
                warn!(error = %err, "health check failed");
                poem::Error::from_string("store unavailable", StatusCode::SERVICE_UNAVAILABLE)
            })?;
        Ok(PlainText("OK"))
    }
}
