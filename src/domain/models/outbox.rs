use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutboxState {
    Pending,
    Dispatched,
    Quarantined,
}

impl OutboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxState::Pending => "pending",
            OutboxState::Dispatched => "dispatched",
            OutboxState::Quarantined => "quarantined",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OutboxState::Pending),
            "dispatched" => Some(OutboxState::Dispatched),
            "quarantined" => Some(OutboxState::Quarantined),
            _ => None,
        }
    }
}

/// A durable record of an event that still has to reach the transport.
///
/// `dispatched_at` is terminal. `lease_until` doubles as the retry cooldown
/// after a failed attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    pub payload: String,
    pub correlation_id: String,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    pub lease_owner: Option<String>,
    pub quarantined_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(
        event_type: impl Into<String>,
        payload: String,
        correlation_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at,
            event_type: event_type.into(),
            payload,
            correlation_id: correlation_id.into(),
            dispatched_at: None,
            attempt_count: 0,
            last_error: None,
            lease_until: None,
            lease_owner: None,
            quarantined_at: None,
        }
    }

    pub fn state(&self) -> OutboxState {
        if self.dispatched_at.is_some() {
            OutboxState::Dispatched
        } else if self.quarantined_at.is_some() {
            OutboxState::Quarantined
        } else {
            OutboxState::Pending
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state() == OutboxState::Pending
            && self.lease_until.map_or(true, |until| until < now)
    }

    pub fn lease(&mut self, owner: &str, until: DateTime<Utc>) {
        self.lease_owner = Some(owner.to_string());
        self.lease_until = Some(until);
    }

    /// Returns `false` if the row was already dispatched.
    pub fn record_dispatched(&mut self, at: DateTime<Utc>) -> bool {
        if self.dispatched_at.is_some() {
            return false;
        }
        self.dispatched_at = Some(at);
        self.last_error = None;
        true
    }

    pub fn record_failure(&mut self, error: &str, retry_at: DateTime<Utc>) -> bool {
        if self.dispatched_at.is_some() {
            return false;
        }
        self.attempt_count += 1;
        self.last_error = Some(error.to_string());
        self.lease_until = Some(retry_at);
        true
    }

    pub fn quarantine(&mut self, error: &str, at: DateTime<Utc>) -> bool {
        if self.dispatched_at.is_some() {
            return false;
        }
        self.attempt_count += 1;
        self.last_error = Some(error.to_string());
        self.quarantined_at = Some(at);
        true
    }

    /// Puts a quarantined row back into the pending set with a fresh budget.
    pub fn release(&mut self) -> bool {
        if self.state() != OutboxState::Quarantined {
            return false;
        }
        self.quarantined_at = None;
        self.attempt_count = 0;
        self.last_error = None;
        self.lease_until = None;
        self.lease_owner = None;
        true
    }
}
