use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};

use crate::domain::{events::DomainEvent, models::OutboxEvent, repositories::UnitOfWork};

/// Stages outbox rows inside a caller's unit of work.
///
/// Rows written through one writer get strictly increasing `occurred_at`
/// values even when the wall clock stalls or steps back.
#[derive(Default)]
pub struct OutboxWriter {
    last_occurred_at: Mutex<Option<DateTime<Utc>>>,
}

impl OutboxWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue_event(
        &self,
        uow: &mut dyn UnitOfWork,
        event: &DomainEvent,
        correlation_id: &str,
    ) -> anyhow::Result<OutboxEvent> {
        let payload = event
            .encode()
            .with_context(|| format!("failed to encode {} event", event.event_type()))?;
        self.enqueue(uow, event.event_type(), payload, correlation_id)
            .await
    }

    pub async fn enqueue(
        &self,
        uow: &mut dyn UnitOfWork,
        event_type: &str,
        payload: String,
        correlation_id: &str,
    ) -> anyhow::Result<OutboxEvent> {
        if event_type.trim().is_empty() {
            anyhow::bail!("outbox event type must not be empty");
        }
        let event = OutboxEvent::new(event_type, payload, correlation_id, self.next_timestamp());
        uow.append_outbox(&event)
            .await
            .context("failed to append outbox event")?;
        tracing::debug!(
            outbox_id = %event.id,
            event_type,
            correlation_id,
            "outbox event staged"
        );
        Ok(event)
    }

    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self
            .last_occurred_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let next = match *last {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        domain::{
            events::{DOCUMENT_UPLOADED, DocumentUploadedEvent},
            models::OutboxState,
            repositories::{OutboxRepository, UnitOfWorkFactory},
            value_objects::ContentHandle,
        },
        infrastructure::repositories::in_memory::InMemoryStore,
    };

    #[test]
    fn timestamps_strictly_increase() {
        let writer = OutboxWriter::new();

        let stamps: Vec<_> = (0..1_000).map(|_| writer.next_timestamp()).collect();

        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn staged_rows_appear_only_after_commit() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();
        let shipment_id = Uuid::new_v4();
        let event = DomainEvent::DocumentUploaded(DocumentUploadedEvent {
            shipment_id,
            document_id: Uuid::new_v4(),
            content_handle: ContentHandle::generate(shipment_id, "invoice.pdf"),
            correlation_id: "corr-1".into(),
        });

        let mut uow = store.begin().await.unwrap();
        let staged = writer
            .enqueue_event(uow.as_mut(), &event, "corr-1")
            .await
            .unwrap();
        assert!(store.list(OutboxState::Pending, 10).await.unwrap().is_empty());

        uow.commit().await.unwrap();

        let pending = store.list(OutboxState::Pending, 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, staged.id);
        assert_eq!(pending[0].event_type, DOCUMENT_UPLOADED);
        assert_eq!(pending[0].correlation_id, "corr-1");
        assert_eq!(pending[0].attempt_count, 0);
    }

    #[tokio::test]
    async fn dropped_unit_of_work_leaves_no_rows() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();

        {
            let mut uow = store.begin().await.unwrap();
            writer
                .enqueue(uow.as_mut(), DOCUMENT_UPLOADED, "{}".into(), "corr-2")
                .await
                .unwrap();
        }

        assert!(store.list(OutboxState::Pending, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_event_type_is_rejected() {
        let store = InMemoryStore::new();
        let writer = OutboxWriter::new();
        let mut uow = store.begin().await.unwrap();

        let result = writer.enqueue(uow.as_mut(), " ", "{}".into(), "corr").await;

        assert!(result.is_err());
    }
}
