use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::value_objects::ContentHandle;

#[derive(Debug, Clone)]
pub struct ContentMetadata {
    pub shipment_id: Uuid,
    pub file_name: String,
    pub content_type: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores the bytes under a freshly generated handle.
    async fn put(&self, content: Vec<u8>, metadata: &ContentMetadata)
    -> anyhow::Result<ContentHandle>;
    async fn get(&self, handle: &ContentHandle) -> anyhow::Result<Vec<u8>>;
}
