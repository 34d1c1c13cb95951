use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::ContentHandle;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentDocument {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub content_handle: ContentHandle,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

impl ShipmentDocument {
    pub fn new(
        shipment_id: Uuid,
        content_handle: ContentHandle,
        file_name: String,
        content_type: Option<String>,
        size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipment_id,
            content_handle,
            file_name,
            content_type: content_type
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            size,
            uploaded_at: Utc::now(),
        }
    }
}
