pub mod health;
pub mod outbox;
pub mod root;
pub mod shipments;
