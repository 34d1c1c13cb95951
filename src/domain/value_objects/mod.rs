use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque reference to bytes held by a content store.
///
/// Handles look like `{shipment_id}/{uuid}-{file_name}`; the random segment
/// keeps two uploads of the same file for the same shipment apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(String);

impl ContentHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate(shipment_id: Uuid, file_name: &str) -> Self {
        Self(format!(
            "{}/{}-{}",
            shipment_id,
            Uuid::new_v4(),
            sanitize_file_name(file_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn sanitize_file_name(file_name: &str) -> String {
    file_name.trim().replace(['/', '\\'], "_")
}
