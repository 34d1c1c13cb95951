use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{errors::DomainError, models::Shipment, repositories::ShipmentRepository};

pub struct GetShipmentUseCase {
    repo: Arc<dyn ShipmentRepository>,
}

impl GetShipmentUseCase {
    pub fn new(repo: Arc<dyn ShipmentRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, shipment_id: Uuid) -> Result<Shipment, DomainError> {
        self.repo
            .get(shipment_id)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("shipment {shipment_id}")))
    }
}
