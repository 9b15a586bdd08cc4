//! Authenticated session snapshot.

use crate::{AccessDenied, Capability, GeographicScope, PermissionMatrix};
use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_types::{Identity, Role, SessionId};

/// Immutable view of an authenticated session.
///
/// Created once per successful login and never mutated; readers hold it
/// behind an `Arc` and a logout or expiry replaces rather than edits it.
/// `capabilities` is always [`PermissionMatrix::capabilities_for`] of the
/// role; there is no way to set it directly.
///
/// # Example
///
/// ```
/// use vigil_auth::{GeographicScope, Session};
/// use vigil_types::{Identity, IdentityId, NodeId, Role, SessionId, Tier};
///
/// let session = Session::new(
///     SessionId::new(),
///     Identity::new(IdentityId::named("centre.c7"), "centre.c7"),
///     Role::CentreInCharge,
///     GeographicScope::confined(Tier::Centre, NodeId::new("C7")),
/// );
/// assert!(session.capabilities().can_acknowledge());
/// assert!(!session.capabilities().can_terminate_attempts());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    id: SessionId,
    identity: Identity,
    role: Role,
    scope: GeographicScope,
    capabilities: Capability,
    authenticated_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session stamped now, deriving capabilities from `role`.
    #[must_use]
    pub fn new(id: SessionId, identity: Identity, role: Role, scope: GeographicScope) -> Self {
        Self {
            id,
            identity,
            role,
            scope,
            capabilities: PermissionMatrix::capabilities_for(role),
            authenticated_at: Utc::now(),
        }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Who is acting.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Assigned role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Resolved scope.
    #[must_use]
    pub fn scope(&self) -> &GeographicScope {
        &self.scope
    }

    /// Derived capabilities.
    #[must_use]
    pub fn capabilities(&self) -> Capability {
        self.capabilities
    }

    /// When authentication completed.
    #[must_use]
    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }

    /// Returns `true` if the session holds every flag in `cap`.
    #[must_use]
    pub fn can(&self, cap: Capability) -> bool {
        self.capabilities.contains(cap)
    }

    /// Capability gate for `operation`.
    ///
    /// # Errors
    ///
    /// [`AccessDenied::CapabilityDenied`] if the role lacks `required`.
    pub fn require(&self, required: Capability, operation: &str) -> Result<(), AccessDenied> {
        PermissionMatrix::require(self.role, required, operation)
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} {}", self.id, self.identity, self.role, self.scope)
    }
}
