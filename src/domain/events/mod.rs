use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::ContentHandle;

pub const DOCUMENT_UPLOADED: &str = "DocumentUploaded";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentUploadedEvent {
    pub shipment_id: Uuid,
    pub document_id: Uuid,
    pub content_handle: ContentHandle,
    pub correlation_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    DocumentUploaded(DocumentUploadedEvent),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown event type '{0}'")]
    UnknownType(String),
    #[error("malformed {event_type} payload: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::DocumentUploaded(_) => DOCUMENT_UPLOADED,
        }
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        match self {
            DomainEvent::DocumentUploaded(event) => serde_json::to_string(event),
        }
    }

    fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            DomainEvent::DocumentUploaded(event) => serde_json::to_value(event),
        }
    }

    pub fn decode(event_type: &str, payload: &str) -> Result<Self, EventDecodeError> {
        let value = serde_json::from_str(payload).map_err(|source| EventDecodeError::Payload {
            event_type: event_type.to_string(),
            source,
        })?;
        Self::decode_value(event_type, value)
    }

    pub fn decode_value(
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<Self, EventDecodeError> {
        let malformed = |source| EventDecodeError::Payload {
            event_type: event_type.to_string(),
            source,
        };
        match event_type {
            DOCUMENT_UPLOADED => serde_json::from_value(payload)
                .map(DomainEvent::DocumentUploaded)
                .map_err(malformed),
            other => Err(EventDecodeError::UnknownType(other.to_string())),
        }
    }
}

/// An outbox row decoded and handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub outbox_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: String,
    pub event: DomainEvent,
}

/// Wire format used by networked transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub outbox_id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub correlation_id: String,
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn from_dispatched(event: &DispatchedEvent) -> serde_json::Result<Self> {
        Ok(Self {
            outbox_id: event.outbox_id,
            event_type: event.event.event_type().to_string(),
            payload: event.event.to_value()?,
            correlation_id: event.correlation_id.clone(),
            occurred_at: event.occurred_at,
        })
    }

    pub fn into_dispatched(self) -> Result<DispatchedEvent, EventDecodeError> {
        let event = DomainEvent::decode_value(&self.event_type, self.payload)?;
        Ok(DispatchedEvent {
            outbox_id: self.outbox_id,
            occurred_at: self.occurred_at,
            correlation_id: self.correlation_id,
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded() -> DomainEvent {
        let shipment_id = Uuid::new_v4();
        DomainEvent::DocumentUploaded(DocumentUploadedEvent {
            shipment_id,
            document_id: Uuid::new_v4(),
            content_handle: ContentHandle::generate(shipment_id, "invoice.pdf"),
            correlation_id: "corr-1".into(),
        })
    }

    #[test]
    fn stored_payload_decodes_by_type() {
        let event = uploaded();
        let payload = event.encode().unwrap();

        let decoded = DomainEvent::decode(event.event_type(), &payload).unwrap();

        assert_eq!(decoded, event);
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = DomainEvent::decode("ShipmentCancelled", "{}").unwrap_err();

        assert!(matches!(err, EventDecodeError::UnknownType(t) if t == "ShipmentCancelled"));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let err = DomainEvent::decode(DOCUMENT_UPLOADED, "{\"shipment_id\":1}").unwrap_err();
        assert!(matches!(err, EventDecodeError::Payload { .. }));

        let err = DomainEvent::decode(DOCUMENT_UPLOADED, "not json").unwrap_err();
        assert!(matches!(err, EventDecodeError::Payload { .. }));
    }

    #[test]
    fn envelope_carries_type_tag() {
        let dispatched = DispatchedEvent {
            outbox_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            correlation_id: "corr-1".into(),
            event: uploaded(),
        };

        let json = serde_json::to_value(EventEnvelope::from_dispatched(&dispatched).unwrap()).unwrap();
        assert_eq!(json["type"], DOCUMENT_UPLOADED);

        let envelope: EventEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(envelope.into_dispatched().unwrap(), dispatched);
    }
}
