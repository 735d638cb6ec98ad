// Datastore card state machine.
//
// Mirrors one datastore tile on the dashboard: its current value, when that
// value last changed, and whether the delete confirmation is open. The card
// never touches the network itself; `handle` returns a `CardCommand` when the
// caller should submit a value or delete the datastore.

use chrono::{DateTime, Local, Utc};
use serde_json::Value;

use crate::protocol::{RequestError, SubmissionRequest};

/// Whether the delete confirmation is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardState {
    #[default]
    Idle,
    ConfirmingDelete,
}

/// Inputs the surrounding UI feeds into a card.
#[derive(Debug, Clone, PartialEq)]
pub enum CardEvent {
    /// User opened the delete confirmation.
    RequestDelete,
    /// User confirmed the deletion.
    ConfirmDelete,
    /// User dismissed the confirmation.
    CancelDelete,
    /// A new value arrived from the hub.
    ValueChanged(Value),
    /// User edited the value and wants it written.
    ValueEdited(Value),
}

/// Side effects the caller is expected to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum CardCommand {
    Submit(SubmissionRequest),
    Delete { name: String },
}

#[derive(Debug, Clone)]
pub struct DatastoreCard {
    name: String,
    format: String,
    value: Value,
    last_updated: DateTime<Utc>,
    state: CardState,
}

impl DatastoreCard {
    /// Create a card for an existing datastore.
    ///
    /// Name and format are checked up front so every `Submit` the card emits
    /// is a valid request.
    pub fn new(
        name: impl Into<String>,
        format: impl Into<String>,
        value: Value,
        now: DateTime<Utc>,
    ) -> Result<Self, RequestError> {
        let name = name.into();
        let format = format.into();
        SubmissionRequest::new(name.as_str(), Value::Null, format.as_str())?;
        Ok(Self {
            name,
            format,
            value,
            last_updated: now,
            state: CardState::Idle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn state(&self) -> CardState {
        self.state
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// `HH:MM:SS` in local time, for the card footer.
    pub fn last_updated_label(&self) -> String {
        self.last_updated
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string()
    }

    /// Apply one event.
    ///
    /// While the confirmation is open only the confirmation events and
    /// hub-pushed values are honored; user edits are dropped.
    pub fn handle(&mut self, event: CardEvent, now: DateTime<Utc>) -> Option<CardCommand> {
        match (self.state, event) {
            (CardState::Idle, CardEvent::RequestDelete) => {
                self.state = CardState::ConfirmingDelete;
                None
            }
            (CardState::ConfirmingDelete, CardEvent::CancelDelete) => {
                self.state = CardState::Idle;
                None
            }
            (CardState::ConfirmingDelete, CardEvent::ConfirmDelete) => {
                self.state = CardState::Idle;
                Some(CardCommand::Delete {
                    name: self.name.clone(),
                })
            }
            (_, CardEvent::ValueChanged(value)) => {
                if value != self.value {
                    self.value = value;
                    self.last_updated = now;
                }
                None
            }
            (CardState::Idle, CardEvent::ValueEdited(value)) => {
                SubmissionRequest::new(self.name.as_str(), value, self.format.as_str())
                    .ok()
                    .map(CardCommand::Submit)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
