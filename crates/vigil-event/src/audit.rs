//! Audit trail message types.
//!
//! An [`AuditEntry`] is what a caller hands to the recorder; the recorder
//! stamps it with a timestamp and origin to produce the write-once
//! [`AuditRecord`] that reaches the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use vigil_types::IdentityId;

/// Name of an audited action.
///
/// Session lifecycle actions have constants; business actions use
/// [`AuditAction::custom`] with their own UPPER_SNAKE_CASE names.
///
/// ```
/// use vigil_event::AuditAction;
///
/// assert_eq!(AuditAction::LOGIN.as_str(), "LOGIN");
/// assert_eq!(AuditAction::custom("LOCK_EVIDENCE").as_str(), "LOCK_EVIDENCE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditAction(Cow<'static, str>);

impl AuditAction {
    /// Successful login.
    pub const LOGIN: Self = Self(Cow::Borrowed("LOGIN"));
    /// Rejected login (bad credentials, lookup or scope failure).
    pub const LOGIN_FAILED: Self = Self(Cow::Borrowed("LOGIN_FAILED"));
    /// User-initiated logout.
    pub const LOGOUT: Self = Self(Cow::Borrowed("LOGOUT"));
    /// Backend invalidated the credential.
    pub const SESSION_EXPIRED: Self = Self(Cow::Borrowed("SESSION_EXPIRED"));
    /// A session viewed data outside its own assigned node.
    pub const SCOPE_WIDENED: Self = Self(Cow::Borrowed("SCOPE_WIDENED"));
    /// A capability check refused an action.
    pub const ACCESS_DENIED: Self = Self(Cow::Borrowed("ACCESS_DENIED"));

    /// Creates an application-defined action name.
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Returns the action name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-side draft of an audit record.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use vigil_event::{AuditAction, AuditEntry};
/// use vigil_types::IdentityId;
///
/// let entry = AuditEntry::new(AuditAction::custom("ESCALATE_ALERT"), "alert")
///     .actor(IdentityId::named("dist.d3"))
///     .entity_id("A-1042")
///     .evidence(json!({"reason": "repeated face mismatch"}));
/// assert_eq!(entry.entity_id.as_deref(), Some("A-1042"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Acting identity; `None` only before authentication.
    pub actor_id: Option<IdentityId>,
    /// What was done.
    pub action: AuditAction,
    /// Entity type the action targeted (`"session"`, `"alert"`, ...).
    pub entity: String,
    /// Entity instance, when there is one.
    pub entity_id: Option<String>,
    /// Free-form supporting payload.
    pub evidence: Option<Value>,
}

impl AuditEntry {
    /// Creates an entry with no actor, entity ID or evidence.
    #[must_use]
    pub fn new(action: AuditAction, entity: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            action,
            entity: entity.into(),
            entity_id: None,
            evidence: None,
        }
    }

    /// Sets the acting identity.
    #[must_use]
    pub fn actor(mut self, id: IdentityId) -> Self {
        self.actor_id = Some(id);
        self
    }

    /// Sets the entity instance.
    #[must_use]
    pub fn entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Attaches evidence.
    #[must_use]
    pub fn evidence(mut self, evidence: Value) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Stamps the entry into a record.
    #[must_use]
    pub fn stamp(self, origin: impl Into<String>, timestamp: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            actor_id: self.actor_id,
            action: self.action,
            entity: self.entity,
            entity_id: self.entity_id,
            evidence: self.evidence,
            timestamp,
            origin: origin.into(),
        }
    }
}

/// Append-only audit log entry, as written to the sink.
///
/// Records are never mutated or deleted by this layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Acting identity; `None` only before authentication.
    pub actor_id: Option<IdentityId>,
    /// What was done.
    pub action: AuditAction,
    /// Entity type.
    pub entity: String,
    /// Entity instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Supporting payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Value>,
    /// When the record was stamped.
    pub timestamp: DateTime<Utc>,
    /// Which deployment or surface produced it.
    pub origin: String,
}
