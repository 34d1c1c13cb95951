pub mod content_store;
pub mod outbox_writer;
pub mod transport;
