use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{OutboxEvent, OutboxState, Shipment, ShipmentDocument};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    /// Returns `false` when the reference number is already taken.
    async fn insert(&self, shipment: &Shipment) -> anyhow::Result<bool>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Shipment>>;
    /// Newest first.
    async fn list(&self, limit: u32, offset: u32) -> anyhow::Result<Vec<Shipment>>;
    /// Persists a `Processed` transition. Returns `false` if the stored row
    /// was already processed, in which case nothing is written.
    async fn mark_processed(&self, shipment: &Shipment) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Atomically claims up to `limit` eligible rows for `owner`.
    async fn lease_batch(
        &self,
        owner: &str,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<OutboxEvent>>;

    async fn mark_dispatched(&self, id: Uuid, dispatched_at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn quarantine(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> anyhow::Result<()>;

    /// Returns `false` if the row does not exist or is not quarantined.
    async fn release_quarantined(&self, id: Uuid) -> anyhow::Result<bool>;

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<OutboxEvent>>;

    async fn list(&self, state: OutboxState, limit: u32) -> anyhow::Result<Vec<OutboxEvent>>;
}

/// Groups a shipment mutation and its outbox rows into one commit.
///
/// Dropping a unit of work without calling `commit` discards everything
/// staged through it.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads the shipment and holds it for the rest of the unit of work.
    async fn load_shipment(&mut self, id: Uuid) -> anyhow::Result<Option<Shipment>>;
    async fn add_document(&mut self, document: &ShipmentDocument) -> anyhow::Result<()>;
    async fn save_status(&mut self, shipment: &Shipment) -> anyhow::Result<()>;
    async fn append_outbox(&mut self, event: &OutboxEvent) -> anyhow::Result<()>;
    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
}

#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    async fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>>;
}
