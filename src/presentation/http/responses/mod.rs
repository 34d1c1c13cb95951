use poem_openapi::{ApiResponse, Object, payload::Json};
use uuid::Uuid;

use crate::presentation::models::{OutboxStateKind, ShipmentStatusKind};

#[derive(Object)]
pub struct ShipmentCreatedDto {
    pub id: Uuid,
}

#[derive(ApiResponse)]
pub enum CreateShipmentResponse {
    #[oai(status = 201)]
    Created(Json<ShipmentCreatedDto>, #[oai(header = "Location")] String),
}

#[derive(Object)]
pub struct ShipmentDocumentDto {
    pub id: Uuid,
    pub content_handle: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: String,
}

#[derive(Object)]
pub struct ShipmentDto {
    pub id: Uuid,
    pub reference_number: String,
    pub sender: String,
    pub recipient: String,
    pub status: ShipmentStatusKind,
    pub created_at: String,
    pub processed_at: Option<String>,
    pub documents: Vec<ShipmentDocumentDto>,
}

#[derive(Object)]
pub struct ShipmentPageDto {
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<ShipmentDto>,
}

#[derive(Object)]
pub struct UploadDocumentResponseDto {
    pub document_id: Uuid,
    pub content_handle: String,
}

#[derive(Object)]
pub struct OutboxEventDto {
    pub id: Uuid,
    pub event_type: String,
    pub state: OutboxStateKind,
    pub correlation_id: String,
    pub occurred_at: String,
    pub dispatched_at: Option<String>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub lease_owner: Option<String>,
    pub lease_until: Option<String>,
    pub quarantined_at: Option<String>,
}
