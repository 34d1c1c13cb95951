use std::sync::Arc;

use poem_openapi::Tags;

use crate::application::usecases::{
    create_shipment::CreateShipmentUseCase, get_shipment::GetShipmentUseCase,
    list_outbox_events::ListOutboxEventsUseCase, list_shipments::ListShipmentsUseCase,
    release_outbox_event::ReleaseOutboxEventUseCase, upload_document::UploadDocumentUseCase,
};

#[derive(Clone)]
pub struct ApiState {
    pub create_shipment_usecase: Arc<CreateShipmentUseCase>,
    pub get_shipment_usecase: Arc<GetShipmentUseCase>,
    pub list_shipments_usecase: Arc<ListShipmentsUseCase>,
    pub upload_document_usecase: Arc<UploadDocumentUseCase>,
    pub list_outbox_events_usecase: Arc<ListOutboxEventsUseCase>,
    pub release_outbox_event_usecase: Arc<ReleaseOutboxEventUseCase>,
}

/// Enum of API sections (tags)
#[derive(Tags)]
pub enum EndpointsTags {
    Health,
    Shipments,
    Outbox,
}

#[derive(Clone)]
pub struct Endpoints {
    pub(super) state: Arc<ApiState>,
}

impl Endpoints {
    pub fn new(state: Arc<ApiState>) -> Self {
        Self { state }
    }
}
