use poem_openapi::Enum;

use crate::domain::models::{OutboxState, ShipmentStatus};

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShipmentStatusKind {
    #[oai(rename = "created")]
    Created,
    #[oai(rename = "document_uploaded")]
    DocumentUploaded,
    #[oai(rename = "processed")]
    Processed,
}

impl From<ShipmentStatus> for ShipmentStatusKind {
    fn from(value: ShipmentStatus) -> Self {
        match value {
            ShipmentStatus::Created => ShipmentStatusKind::Created,
            ShipmentStatus::DocumentUploaded => ShipmentStatusKind::DocumentUploaded,
            ShipmentStatus::Processed => ShipmentStatusKind::Processed,
        }
    }
}

#[derive(Enum, Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutboxStateKind {
    #[oai(rename = "pending")]
    Pending,
    #[oai(rename = "dispatched")]
    Dispatched,
    #[oai(rename = "quarantined")]
    Quarantined,
}

impl Default for OutboxStateKind {
    fn default() -> Self {
        OutboxStateKind::Pending
    }
}

impl From<OutboxStateKind> for OutboxState {
    fn from(value: OutboxStateKind) -> Self {
        match value {
            OutboxStateKind::Pending => OutboxState::Pending,
            OutboxStateKind::Dispatched => OutboxState::Dispatched,
            OutboxStateKind::Quarantined => OutboxState::Quarantined,
        }
    }
}

impl From<OutboxState> for OutboxStateKind {
    fn from(value: OutboxState) -> Self {
        match value {
            OutboxState::Pending => OutboxStateKind::Pending,
            OutboxState::Dispatched => OutboxStateKind::Dispatched,
            OutboxState::Quarantined => OutboxStateKind::Quarantined,
        }
    }
}
