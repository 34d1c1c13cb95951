use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    application::services::content_store::{ContentMetadata, ContentStore},
    domain::value_objects::ContentHandle,
};

#[derive(Clone, Default)]
pub struct InMemoryContentStore {
    blobs: Arc<RwLock<HashMap<ContentHandle, Vec<u8>>>>,
    fetches: Arc<AtomicUsize>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `get` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub async fn stored_count(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(
        &self,
        content: Vec<u8>,
        metadata: &ContentMetadata,
    ) -> anyhow::Result<ContentHandle> {
        let handle = ContentHandle::generate(metadata.shipment_id, &metadata.file_name);
        let mut blobs = self.blobs.write().await;
        blobs.insert(handle.clone(), content);
        Ok(handle)
    }

    async fn get(&self, handle: &ContentHandle) -> anyhow::Result<Vec<u8>> {
        let blobs = self.blobs.read().await;
        let content = blobs
            .get(handle)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("content '{handle}' not found"))?;
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(content)
    }
}
