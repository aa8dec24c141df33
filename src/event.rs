// src/event.rs

//! Outbound event model.
//!
//! A run produces one ordered stream of [`Event`]s. Events derive
//! `Serialize` (tagged by `type`) so printers can emit JSON directly.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::errors::{ErrorKind, KapplyError};
use crate::object::ObjMetadata;
use crate::polling::ResourceStatus;

/// What a stage does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    Inventory,
    Apply,
    Prune,
    Delete,
    Wait,
}

/// Plan entry announced in the [`Event::Init`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionGroup {
    pub name: String,
    pub action: ActionKind,
    pub identifiers: Vec<ObjMetadata>,
}

/// Error payload carried on events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&KapplyError> for EventError {
    fn from(err: &KapplyError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<KapplyError> for EventError {
    fn from(err: KapplyError) -> Self {
        Self::from(&err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActuationStatus {
    Successful,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WaitStatus {
    Pending,
    Successful,
    Skipped,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// First event of every run: the plan about to execute.
    Init { action_groups: Vec<ActionGroup> },
    ActionGroupStart { group: String, action: ActionKind },
    ActionGroupFinish { group: String, action: ActionKind },
    Apply {
        group: String,
        id: ObjMetadata,
        status: ActuationStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<EventError>,
    },
    Prune {
        group: String,
        id: ObjMetadata,
        status: ActuationStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<EventError>,
    },
    Delete {
        group: String,
        id: ObjMetadata,
        status: ActuationStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<EventError>,
    },
    Wait {
        group: String,
        id: ObjMetadata,
        status: WaitStatus,
    },
    StatusUpdate(ResourceStatus),
    Error {
        error: EventError,
        /// Fatal errors end the run; nothing but the stream close follows.
        fatal: bool,
    },
}

impl Event {
    pub fn error(err: &KapplyError, fatal: bool) -> Self {
        Event::Error {
            error: err.into(),
            fatal,
        }
    }

    /// Stage name for stage-scoped events.
    pub fn group(&self) -> Option<&str> {
        match self {
            Event::ActionGroupStart { group, .. }
            | Event::ActionGroupFinish { group, .. }
            | Event::Apply { group, .. }
            | Event::Prune { group, .. }
            | Event::Delete { group, .. }
            | Event::Wait { group, .. } => Some(group),
            Event::Init { .. } | Event::StatusUpdate(_) | Event::Error { .. } => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::Error { fatal: true, .. })
    }
}

/// Sending half of a run's event stream.
///
/// Sends wait for channel space; a dropped receiver turns sends into no-ops.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Returns `false` once the receiver is gone.
    pub async fn send(&self, event: Event) -> bool {
        trace!(?event, "emitting event");
        self.tx.send(event).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::ActionGroupStart {
            group: "apply-0".to_string(),
            action: ActionKind::Apply,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({ "type": "ActionGroupStart", "group": "apply-0", "action": "Apply" })
        );
    }

    #[test]
    fn error_events_carry_kind() {
        let event = Event::error(&KapplyError::Cancelled, true);
        assert!(event.is_fatal());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["error"]["kind"], "cancelled");
    }
}
