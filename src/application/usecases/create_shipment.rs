use std::sync::Arc;

use tracing::info;

use crate::domain::{errors::DomainError, models::Shipment, repositories::ShipmentRepository};

const REFERENCE_NUMBER_MAX_LEN: usize = 64;
const PARTY_MAX_LEN: usize = 256;

pub struct CreateShipmentRequest {
    pub reference_number: String,
    pub sender: String,
    pub recipient: String,
}

pub struct CreateShipmentUseCase {
    repo: Arc<dyn ShipmentRepository>,
}

impl CreateShipmentUseCase {
    pub fn new(repo: Arc<dyn ShipmentRepository>) -> Self {
        Self { repo }
    }

    pub async fn execute(&self, request: CreateShipmentRequest) -> Result<Shipment, DomainError> {
        let reference_number = required(
            "reference_number",
            &request.reference_number,
            REFERENCE_NUMBER_MAX_LEN,
        )?;
        let sender = required("sender", &request.sender, PARTY_MAX_LEN)?;
        let recipient = required("recipient", &request.recipient, PARTY_MAX_LEN)?;

        let shipment = Shipment::new(reference_number, sender, recipient);
        if !self.repo.insert(&shipment).await? {
            return Err(DomainError::AlreadyExists(format!(
                "shipment with reference number '{}'",
                shipment.reference_number
            )));
        }

        info!(
            shipment_id = %shipment.id,
            reference_number = %shipment.reference_number,
            "shipment created"
        );
        Ok(shipment)
    }
}

fn required(field: &str, value: &str, max_len: usize) -> Result<String, DomainError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(DomainError::Validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value.to_string())
}
