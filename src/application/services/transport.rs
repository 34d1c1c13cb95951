use async_trait::async_trait;

use crate::domain::events::DispatchedEvent;

/// Delivers dispatched outbox events to the consumer side.
///
/// `Ok` means the event is durably accepted (or handed to the in-process
/// queue); only then may the outbox row be marked dispatched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn publish(&self, event: &DispatchedEvent) -> anyhow::Result<()>;
}
