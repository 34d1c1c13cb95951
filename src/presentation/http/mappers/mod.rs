use crate::{
    domain::models::{OutboxEvent, Shipment, ShipmentDocument},
    presentation::http::responses::{OutboxEventDto, ShipmentDocumentDto, ShipmentDto},
};

pub fn map_shipment(shipment: &Shipment) -> ShipmentDto {
    ShipmentDto {
        id: shipment.id,
        reference_number: shipment.reference_number.clone(),
        sender: shipment.sender.clone(),
        recipient: shipment.recipient.clone(),
        status: shipment.status.into(),
        created_at: shipment.created_at.to_rfc3339(),
        processed_at: shipment.processed_at.map(|at| at.to_rfc3339()),
        documents: shipment.documents.iter().map(map_document).collect(),
    }
}

pub fn map_document(document: &ShipmentDocument) -> ShipmentDocumentDto {
    ShipmentDocumentDto {
        id: document.id,
        content_handle: document.content_handle.to_string(),
        file_name: document.file_name.clone(),
        content_type: document.content_type.clone(),
        size: document.size,
        uploaded_at: document.uploaded_at.to_rfc3339(),
    }
}

pub fn map_outbox_event(event: &OutboxEvent) -> OutboxEventDto {
    OutboxEventDto {
        id: event.id,
        event_type: event.event_type.clone(),
        state: event.state().into(),
        correlation_id: event.correlation_id.clone(),
        occurred_at: event.occurred_at.to_rfc3339(),
        dispatched_at: event.dispatched_at.map(|at| at.to_rfc3339()),
        attempt_count: event.attempt_count,
        last_error: event.last_error.clone(),
        lease_owner: event.lease_owner.clone(),
        lease_until: event.lease_until.map(|at| at.to_rfc3339()),
        quarantined_at: event.quarantined_at.map(|at| at.to_rfc3339()),
    }
}
