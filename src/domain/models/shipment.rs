use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::ShipmentDocument;

/// Lifecycle of a shipment. Variants are ordered; a shipment never moves
/// back to an earlier status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Created,
    DocumentUploaded,
    Processed,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Created => "created",
            ShipmentStatus::DocumentUploaded => "document_uploaded",
            ShipmentStatus::Processed => "processed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "created" => Some(ShipmentStatus::Created),
            "document_uploaded" => Some(ShipmentStatus::DocumentUploaded),
            "processed" => Some(ShipmentStatus::Processed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub reference_number: String,
    pub sender: String,
    pub recipient: String,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub documents: Vec<ShipmentDocument>,
}

impl Shipment {
    pub fn new(reference_number: String, sender: String, recipient: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference_number,
            sender,
            recipient,
            status: ShipmentStatus::Created,
            created_at: Utc::now(),
            processed_at: None,
            documents: Vec::new(),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.status == ShipmentStatus::Processed
    }

    /// Attaches a document and moves a fresh shipment to `DocumentUploaded`.
    /// A shipment that is already further along keeps its status.
    pub fn attach_document(&mut self, document: ShipmentDocument) {
        self.documents.push(document);
        self.advance_to(ShipmentStatus::DocumentUploaded);
    }

    /// Returns `false` when the shipment was already processed; `processed_at`
    /// is only ever written once.
    pub fn mark_processed(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_processed() {
            return false;
        }
        self.status = ShipmentStatus::Processed;
        self.processed_at.get_or_insert(at);
        true
    }

    fn advance_to(&mut self, status: ShipmentStatus) -> bool {
        if status <= self.status {
            return false;
        }
        self.status = status;
        true
    }
}
