use std::{sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::services::content_store::ContentStore,
    domain::{
        errors::ErrorKind,
        events::DocumentUploadedEvent,
        repositories::ShipmentRepository,
        value_objects::ContentHandle,
    },
};

#[derive(Debug, Clone)]
pub struct DocumentProcessingConfig {
    pub simulated_delay: Duration,
}

impl Default for DocumentProcessingConfig {
    fn default() -> Self {
        Self {
            simulated_delay: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Processed,
    AlreadyProcessed,
}

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("shipment {0} not found")]
    ShipmentNotFound(Uuid),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("failed to load shipment: {0}")]
    Lookup(String),
    #[error("content '{handle}' unavailable: {reason}")]
    ContentUnavailable {
        handle: ContentHandle,
        reason: String,
    },
    #[error("failed to save processed status: {0}")]
    Persistence(String),
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::ShipmentNotFound(_) => ErrorKind::NotFound,
            ProcessingError::InvalidMessage(_) => ErrorKind::Permanent,
            ProcessingError::Lookup(_)
            | ProcessingError::ContentUnavailable { .. }
            | ProcessingError::Persistence(_) => ErrorKind::ExternalDependency,
        }
    }

    /// Permanent failures go to the dead-letter path; the rest are redelivered.
    pub fn is_permanent(&self) -> bool {
        !self.kind().is_retryable()
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            ProcessingError::ShipmentNotFound(_) => "not_found",
            ProcessingError::InvalidMessage(_) => "invalid_message",
            ProcessingError::Lookup(_) => "db_load_failed",
            ProcessingError::ContentUnavailable { .. } => "content_unavailable",
            ProcessingError::Persistence(_) => "db_save_failed",
        }
    }
}

/// Idempotent consumer of `DocumentUploaded` events.
pub struct DocumentProcessingHandler {
    shipments: Arc<dyn ShipmentRepository>,
    content: Arc<dyn ContentStore>,
    config: DocumentProcessingConfig,
}

impl DocumentProcessingHandler {
    pub fn new(
        shipments: Arc<dyn ShipmentRepository>,
        content: Arc<dyn ContentStore>,
        config: DocumentProcessingConfig,
    ) -> Self {
        Self {
            shipments,
            content,
            config,
        }
    }

    pub async fn handle(
        &self,
        event: &DocumentUploadedEvent,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        info!(
            shipment_id = %event.shipment_id,
            content_handle = %event.content_handle,
            correlation_id = %event.correlation_id,
            "document processing started"
        );

        let mut shipment = self
            .shipments
            .get(event.shipment_id)
            .await
            .map_err(|err| ProcessingError::Lookup(format!("{err:#}")))?
            .ok_or(ProcessingError::ShipmentNotFound(event.shipment_id))?;

        if shipment.is_processed() {
            info!(shipment_id = %shipment.id, "shipment already processed, skipping");
            return Ok(ProcessingOutcome::AlreadyProcessed);
        }

        let content = self
            .content
            .get(&event.content_handle)
            .await
            .map_err(|err| ProcessingError::ContentUnavailable {
                handle: event.content_handle.clone(),
                reason: format!("{err:#}"),
            })?;

        if !self.config.simulated_delay.is_zero() {
            tokio::time::sleep(self.config.simulated_delay).await;
        }
        info!(
            shipment_id = %shipment.id,
            bytes = content.len(),
            "document content processed"
        );

        shipment.mark_processed(Utc::now());
        let advanced = self
            .shipments
            .mark_processed(&shipment)
            .await
            .map_err(|err| ProcessingError::Persistence(format!("{err:#}")))?;
        if !advanced {
            warn!(shipment_id = %shipment.id, "shipment was processed concurrently");
            return Ok(ProcessingOutcome::AlreadyProcessed);
        }

        info!(shipment_id = %shipment.id, "shipment marked processed");
        Ok(ProcessingOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::*;
    use crate::{
        application::services::content_store::MockContentStore,
        domain::{
            models::{Shipment, ShipmentStatus},
            repositories::MockShipmentRepository,
        },
    };

    fn shipment(status: ShipmentStatus) -> Shipment {
        let mut shipment = Shipment::new("REF-100".into(), "ACME".into(), "Globex".into());
        shipment.status = status;
        if status == ShipmentStatus::Processed {
            shipment.processed_at = Some(Utc::now());
        }
        shipment
    }

    fn event_for(shipment: &Shipment) -> DocumentUploadedEvent {
        DocumentUploadedEvent {
            shipment_id: shipment.id,
            document_id: Uuid::new_v4(),
            content_handle: ContentHandle::generate(shipment.id, "invoice.pdf"),
            correlation_id: "corr-1".into(),
        }
    }

    fn handler(repo: MockShipmentRepository, content: MockContentStore) -> DocumentProcessingHandler {
        DocumentProcessingHandler::new(
            Arc::new(repo),
            Arc::new(content),
            DocumentProcessingConfig {
                simulated_delay: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn processes_uploaded_shipment() {
        let stored = shipment(ShipmentStatus::DocumentUploaded);
        let event = event_for(&stored);
        let mut repo = MockShipmentRepository::new();
        let loaded = stored.clone();
        repo.expect_get()
            .with(eq(stored.id))
            .returning(move |_| Ok(Some(loaded.clone())));
        repo.expect_mark_processed()
            .withf(|s| s.status == ShipmentStatus::Processed && s.processed_at.is_some())
            .times(1)
            .returning(|_| Ok(true));
        let mut content = MockContentStore::new();
        let handle = event.content_handle.clone();
        content
            .expect_get()
            .withf(move |h| *h == handle)
            .times(1)
            .returning(|_| Ok(b"%PDF".to_vec()));

        let outcome = handler(repo, content).handle(&event).await.unwrap();

        assert_eq!(outcome, ProcessingOutcome::Processed);
    }

    #[tokio::test]
    async fn already_processed_skips_content_fetch() {
        let stored = shipment(ShipmentStatus::Processed);
        let event = event_for(&stored);
        let mut repo = MockShipmentRepository::new();
        repo.expect_get().returning(move |_| Ok(Some(stored.clone())));
        repo.expect_mark_processed().never();
        let mut content = MockContentStore::new();
        content.expect_get().never();

        let outcome = handler(repo, content).handle(&event).await.unwrap();

        assert_eq!(outcome, ProcessingOutcome::AlreadyProcessed);
    }

    #[tokio::test]
    async fn missing_shipment_is_permanent() {
        let stored = shipment(ShipmentStatus::DocumentUploaded);
        let event = event_for(&stored);
        let mut repo = MockShipmentRepository::new();
        repo.expect_get().returning(|_| Ok(None));
        let mut content = MockContentStore::new();
        content.expect_get().never();

        let err = handler(repo, content).handle(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::ShipmentNotFound(id) if id == stored.id));
        assert!(err.is_permanent());
        assert_eq!(err.reason_code(), "not_found");
    }

    #[tokio::test]
    async fn content_failure_is_transient_and_leaves_status() {
        let stored = shipment(ShipmentStatus::DocumentUploaded);
        let event = event_for(&stored);
        let mut repo = MockShipmentRepository::new();
        repo.expect_get().returning(move |_| Ok(Some(stored.clone())));
        repo.expect_mark_processed().never();
        let mut content = MockContentStore::new();
        content
            .expect_get()
            .returning(|_| Err(anyhow::anyhow!("blob service timeout")));

        let err = handler(repo, content).handle(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::ContentUnavailable { .. }));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn persistence_failure_is_transient() {
        let stored = shipment(ShipmentStatus::DocumentUploaded);
        let event = event_for(&stored);
        let mut repo = MockShipmentRepository::new();
        repo.expect_get().returning(move |_| Ok(Some(stored.clone())));
        repo.expect_mark_processed()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let mut content = MockContentStore::new();
        content.expect_get().returning(|_| Ok(vec![1, 2, 3]));

        let err = handler(repo, content).handle(&event).await.unwrap_err();

        assert!(matches!(err, ProcessingError::Persistence(_)));
        assert!(!err.is_permanent());
        assert_eq!(err.reason_code(), "db_save_failed");
    }

    #[tokio::test]
    async fn lost_race_reports_already_processed() {
        let stored = shipment(ShipmentStatus::DocumentUploaded);
        let event = event_for(&stored);
        let mut repo = MockShipmentRepository::new();
        repo.expect_get().returning(move |_| Ok(Some(stored.clone())));
        repo.expect_mark_processed().returning(|_| Ok(false));
        let mut content = MockContentStore::new();
        content.expect_get().returning(|_| Ok(vec![1]));

        let outcome = handler(repo, content).handle(&event).await.unwrap();

        assert_eq!(outcome, ProcessingOutcome::AlreadyProcessed);
    }
}
