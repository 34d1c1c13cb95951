use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    models::{OutboxEvent, OutboxState, Shipment, ShipmentDocument, ShipmentStatus},
    repositories::{OutboxRepository, ShipmentRepository, UnitOfWork, UnitOfWorkFactory},
};

#[derive(Default)]
struct StoreState {
    shipments: HashMap<Uuid, Shipment>,
    outbox: HashMap<Uuid, OutboxEvent>,
}

/// Shipments and outbox rows behind a single lock so a unit of work can
/// apply both in one step.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShipmentRepository for InMemoryStore {
    async fn insert(&self, shipment: &Shipment) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let taken = state
            .shipments
            .values()
            .any(|existing| existing.reference_number == shipment.reference_number);
        if taken {
            return Ok(false);
        }
        state.shipments.insert(shipment.id, shipment.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Shipment>> {
        let state = self.state.read().await;
        Ok(state.shipments.get(&id).cloned())
    }

    async fn list(&self, limit: u32, offset: u32) -> anyhow::Result<Vec<Shipment>> {
        let state = self.state.read().await;
        let mut shipments: Vec<Shipment> = state.shipments.values().cloned().collect();
        shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shipments
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn mark_processed(&self, shipment: &Shipment) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        let stored = state
            .shipments
            .get_mut(&shipment.id)
            .ok_or_else(|| anyhow::anyhow!("shipment {} not found", shipment.id))?;
        let processed_at = shipment.processed_at.unwrap_or_else(Utc::now);
        Ok(stored.mark_processed(processed_at))
    }
}

#[async_trait]
impl OutboxRepository for InMemoryStore {
    async fn lease_batch(
        &self,
        owner: &str,
        limit: u32,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> anyhow::Result<Vec<OutboxEvent>> {
        let mut state = self.state.write().await;
        let mut eligible: Vec<&mut OutboxEvent> = state
            .outbox
            .values_mut()
            .filter(|event| event.is_eligible(now))
            .collect();
        eligible.sort_by_key(|event| event.occurred_at);
        Ok(eligible
            .into_iter()
            .take(limit as usize)
            .map(|event| {
                event.lease(owner, lease_until);
                event.clone()
            })
            .collect())
    }

    async fn mark_dispatched(&self, id: Uuid, dispatched_at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if let Some(event) = state.outbox.get_mut(&id) {
            event.record_dispatched(dispatched_at);
        }
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        retry_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if let Some(event) = state.outbox.get_mut(&id) {
            event.record_failure(error, retry_at);
        }
        Ok(())
    }

    async fn quarantine(&self, id: Uuid, error: &str, at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        if let Some(event) = state.outbox.get_mut(&id) {
            event.quarantine(error, at);
        }
        Ok(())
    }

    async fn release_quarantined(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .outbox
            .get_mut(&id)
            .is_some_and(|event| event.release()))
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<OutboxEvent>> {
        let state = self.state.read().await;
        Ok(state.outbox.get(&id).cloned())
    }

    async fn list(&self, state_filter: OutboxState, limit: u32) -> anyhow::Result<Vec<OutboxEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<OutboxEvent> = state
            .outbox
            .values()
            .filter(|event| event.state() == state_filter)
            .cloned()
            .collect();
        match state_filter {
            OutboxState::Pending => events.sort_by_key(|event| event.occurred_at),
            OutboxState::Dispatched => events.sort_by(|a, b| b.dispatched_at.cmp(&a.dispatched_at)),
            OutboxState::Quarantined => {
                events.sort_by(|a, b| b.quarantined_at.cmp(&a.quarantined_at))
            }
        }
        events.truncate(limit as usize);
        Ok(events)
    }
}

#[async_trait]
impl UnitOfWorkFactory for InMemoryStore {
    async fn begin(&self) -> anyhow::Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }
}

enum Staged {
    Document(ShipmentDocument),
    Status(Uuid, ShipmentStatus, Option<DateTime<Utc>>),
    Outbox(OutboxEvent),
}

pub struct InMemoryUnitOfWork {
    state: Arc<RwLock<StoreState>>,
    staged: Vec<Staged>,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn load_shipment(&mut self, id: Uuid) -> anyhow::Result<Option<Shipment>> {
        let state = self.state.read().await;
        Ok(state.shipments.get(&id).cloned())
    }

    async fn add_document(&mut self, document: &ShipmentDocument) -> anyhow::Result<()> {
        self.staged.push(Staged::Document(document.clone()));
        Ok(())
    }

    async fn save_status(&mut self, shipment: &Shipment) -> anyhow::Result<()> {
        self.staged.push(Staged::Status(
            shipment.id,
            shipment.status,
            shipment.processed_at,
        ));
        Ok(())
    }

    async fn append_outbox(&mut self, event: &OutboxEvent) -> anyhow::Result<()> {
        self.staged.push(Staged::Outbox(event.clone()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let mut state = self.state.write().await;

        // Validate everything before touching the maps so a bad unit of work
        // leaves no partial writes behind.
        for staged in &self.staged {
            match staged {
                Staged::Document(document) => {
                    if !state.shipments.contains_key(&document.shipment_id) {
                        anyhow::bail!("shipment {} not found", document.shipment_id);
                    }
                }
                Staged::Status(id, _, _) => {
                    if !state.shipments.contains_key(id) {
                        anyhow::bail!("shipment {id} not found");
                    }
                }
                Staged::Outbox(event) => {
                    if state.outbox.contains_key(&event.id) {
                        anyhow::bail!("outbox event {} already exists", event.id);
                    }
                }
            }
        }

        for staged in self.staged {
            match staged {
                Staged::Document(document) => {
                    if let Some(shipment) = state.shipments.get_mut(&document.shipment_id) {
                        shipment.documents.push(document);
                    }
                }
                Staged::Status(id, status, processed_at) => {
                    if let Some(shipment) = state.shipments.get_mut(&id) {
                        // A concurrent consumer may have moved the shipment on.
                        if status > shipment.status {
                            shipment.status = status;
                        }
                        if shipment.processed_at.is_none() {
                            shipment.processed_at = processed_at;
                        }
                    }
                }
                Staged::Outbox(event) => {
                    state.outbox.insert(event.id, event);
                }
            }
        }
        Ok(())
    }
}
