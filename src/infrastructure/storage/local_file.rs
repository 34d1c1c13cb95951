use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::{
    application::services::content_store::{ContentMetadata, ContentStore},
    domain::value_objects::ContentHandle,
};

/// Content store backed by a directory; handles map to relative paths.
pub struct LocalFileContentStore {
    root: PathBuf,
}

impl LocalFileContentStore {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create content root {}", root.display()))?;
        Ok(Self { root })
    }

    fn path_for(&self, handle: &ContentHandle) -> anyhow::Result<PathBuf> {
        let relative = Path::new(handle.as_str());
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !safe || handle.as_str().is_empty() {
            anyhow::bail!("invalid content handle '{handle}'");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentStore for LocalFileContentStore {
    async fn put(
        &self,
        content: Vec<u8>,
        metadata: &ContentMetadata,
    ) -> anyhow::Result<ContentHandle> {
        let handle = ContentHandle::generate(metadata.shipment_id, &metadata.file_name);
        let path = self.path_for(&handle)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(content_handle = %handle, bytes = content.len(), "content stored");
        Ok(handle)
    }

    async fn get(&self, handle: &ContentHandle) -> anyhow::Result<Vec<u8>> {
        let path = self.path_for(handle)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
    }
}
