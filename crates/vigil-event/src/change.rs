//! Change-feed events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vigil_types::EventId;

/// Kind of backend mutation carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A row was created (e.g. a new alert).
    Insert,
    /// A row changed (e.g. an alert was acknowledged).
    Update,
    /// A row was removed.
    Delete,
}

impl ChangeKind {
    /// All kinds.
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert => f.write_str("insert"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// One mutation notification from a backend change stream.
///
/// Events on a single channel arrive in backend emission order. Nothing is
/// buffered across a reconnect, so consumers that need completeness must
/// re-fetch authoritative state after a gap.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use vigil_event::{ChangeEvent, ChangeKind};
///
/// let event = ChangeEvent::new("alerts", ChangeKind::Insert, json!({"mandalId": "M1"}));
/// assert_eq!(event.resource, "alerts");
/// assert_eq!(event.field("mandalId"), Some(&json!("M1")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique event identifier.
    pub id: EventId,
    /// Stream the event came from (the channel's resource key).
    pub resource: String,
    /// Mutation kind.
    pub kind: ChangeKind,
    /// Row image after the change (before it, for deletes).
    pub payload: Value,
    /// When this process received the event.
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(resource: impl Into<String>, kind: ChangeKind, payload: Value) -> Self {
        Self {
            id: EventId::new(),
            resource: resource.into(),
            kind,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Returns a top-level payload field, if the payload is an object.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.as_object().and_then(|obj| obj.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_on_non_object_payload_is_none() {
        let event = ChangeEvent::new("alerts", ChangeKind::Delete, json!(42));
        assert!(event.field("mandalId").is_none());
    }

    #[test]
    fn kind_wire_names() {
        let json = serde_json::to_string(&ChangeKind::Update).expect("serialize kind");
        assert_eq!(json, "\"update\"");
        assert_eq!(ChangeKind::Insert.to_string(), "insert");
    }
}
