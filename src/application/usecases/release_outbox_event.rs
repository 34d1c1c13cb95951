use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::{
    errors::DomainError,
    models::{OutboxEvent, OutboxState},
    repositories::OutboxRepository,
};

/// Returns a quarantined outbox row to the pending set.
pub struct ReleaseOutboxEventUseCase {
    repo: Arc<dyn OutboxRepository>,
}

impl ReleaseOutboxEventUseCase {
    pub fn new(repo: Arc<dyn OutboxRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, outbox_id: Uuid) -> Result<OutboxEvent, DomainError> {
        let event = self
            .repo
            .get(outbox_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("outbox event {outbox_id}")))?;
        if event.state() != OutboxState::Quarantined {
            return Err(DomainError::Conflict(format!(
                "outbox event {outbox_id} is {}, not quarantined",
                event.state().as_str()
            )));
        }

        if !self.repo.release_quarantined(outbox_id).await? {
            return Err(DomainError::Conflict(format!(
                "outbox event {outbox_id} was changed concurrently"
            )));
        }
        info!(outbox_id = %outbox_id, event_type = %event.event_type, "outbox event released");

        self.repo
            .get(outbox_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("outbox event {outbox_id}")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        domain::repositories::UnitOfWorkFactory,
        infrastructure::repositories::in_memory::InMemoryStore,
    };

    async fn seeded(store: &InMemoryStore) -> OutboxEvent {
        let event = OutboxEvent::new("Unknown", "{}".into(), "corr", Utc::now());
        let mut uow = store.begin().await.unwrap();
        uow.append_outbox(&event).await.unwrap();
        uow.commit().await.unwrap();
        event
    }

    #[tokio::test]
    async fn quarantined_rows_are_released() {
        let store = InMemoryStore::new();
        let event = seeded(&store).await;
        store.quarantine(event.id, "unknown event type", Utc::now()).await.unwrap();
        let usecase = ReleaseOutboxEventUseCase::new(Arc::new(store.clone()));

        let released = usecase.execute(event.id).await.unwrap();

        assert_eq!(released.state(), OutboxState::Pending);
        assert_eq!(released.attempt_count, 0);
        assert_eq!(released.last_error, None);
        assert!(released.is_eligible(Utc::now()));
    }

    #[tokio::test]
    async fn pending_rows_cannot_be_released() {
        let store = InMemoryStore::new();
        let event = seeded(&store).await;
        let usecase = ReleaseOutboxEventUseCase::new(Arc::new(store));

        let err = usecase.execute(event.id).await.unwrap_err();

        assert!(matches!(err, DomainError::Conflict(_)));
        assert!(err.to_string().contains("is pending, not quarantined"));
    }

    #[tokio::test]
    async fn unknown_rows_are_not_found() {
        let usecase = ReleaseOutboxEventUseCase::new(Arc::new(InMemoryStore::new()));

        let err = usecase.execute(Uuid::new_v4()).await.unwrap_err();

        assert!(matches!(err, DomainError::NotFound(_)));
    }
}
