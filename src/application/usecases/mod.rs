pub mod create_shipment;
pub mod get_shipment;
pub mod list_outbox_events;
pub mod list_shipments;
pub mod release_outbox_event;
pub mod upload_document;
