//! Identifier types.
//!
//! Actor, session and event identifiers are UUID-based. Organizational
//! nodes keep the backend's own string keys (`"D3"`, `"M1"`, `"C7"`), since
//! those are what query filters and change-feed predicates carry.

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// Namespace for deterministic identity UUIDs (v5).
const VIGIL_NAMESPACE: Uuid = uuid!("6f1d7c52-3b0e-4d8a-9a41-2c5e8f90b7d3");

/// Identifier of an authenticated actor.
///
/// # Example
///
/// ```
/// use vigil_types::IdentityId;
///
/// // Directory-backed identities are stable across processes.
/// let a = IdentityId::named("centre.c7");
/// let b = IdentityId::named("centre.c7");
/// assert_eq!(a, b);
///
/// assert_ne!(IdentityId::new(), IdentityId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityId(pub Uuid);

impl IdentityId {
    /// Creates a random identity ID (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic identity ID from a login name (UUID v5).
    #[must_use]
    pub fn named(login: &str) -> Self {
        Self(Uuid::new_v5(&VIGIL_NAMESPACE, login.as_bytes()))
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for IdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "identity:{}", self.0)
    }
}

/// Identifier of one authenticated session (one successful login).
///
/// A new `SessionId` is minted on every login, so live subscriptions opened
/// under an earlier session can be released without touching the new one.
///
/// Intentionally has no `Default`: a session ID only exists once a login
/// has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Identifier of an inbound change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "evt:{}", self.0)
    }
}

/// Key of an organizational node (district, mandal or examination centre).
///
/// The key is opaque; which tier it belongs to is always carried alongside
/// it (see [`Tier`](crate::Tier)).
///
/// # Example
///
/// ```
/// use vigil_types::NodeId;
///
/// let mandal = NodeId::new("M1");
/// assert_eq!(mandal.as_str(), "M1");
/// assert_eq!(mandal.to_string(), "M1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for NodeId {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_identity_is_deterministic() {
        assert_eq!(IdentityId::named("dist.d3"), IdentityId::named("dist.d3"));
        assert_ne!(IdentityId::named("dist.d3"), IdentityId::named("dist.d4"));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn display_prefixes() {
        let id = IdentityId::new();
        assert!(id.to_string().starts_with("identity:"));
        assert!(SessionId::new().to_string().starts_with("session:"));
        assert!(EventId::new().to_string().starts_with("evt:"));
    }

    #[test]
    fn node_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&NodeId::new("C7")).expect("serialize node id");
        assert_eq!(json, "\"C7\"");
        let back: NodeId = serde_json::from_str(&json).expect("deserialize node id");
        assert_eq!(back.as_str(), "C7");
    }
}
