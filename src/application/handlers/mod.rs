pub mod document_processor;
pub mod outbox_dispatcher;
