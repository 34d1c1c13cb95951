pub mod document;
pub mod outbox;
pub mod shipment;

pub use document::ShipmentDocument;
pub use outbox::{OutboxEvent, OutboxState};
pub use shipment::{Shipment, ShipmentStatus};
