//! Authorization error types.
//!
//! Two layers can refuse an operation:
//!
//! ```text
//! Effective permission = Capability(WHAT) ∩ Scope(WHERE)
//!                            │                 │
//!                   CapabilityDenied       OutOfScope
//! ```
//!
//! [`ScopeError`] is raised while *computing* a scope or filter; it is not a
//! refusal but a failure, and callers must deny on it.

use crate::{Capability, GeographicScope};
use thiserror::Error;
use vigil_types::{ErrorCode, NodeId, Role, Tier};

/// Failure computing a scope or a scoped filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The role's node assignment cannot produce a scope.
    ///
    /// Fatal to the session being materialized; surfaced as access denied.
    #[error("scope resolution failed for {role}: {reason}")]
    Resolution {
        /// Role being resolved.
        role: Role,
        /// What was wrong with the assignment.
        reason: String,
    },

    /// A scope reached a resolver operation in a shape no resolution can
    /// produce. Programming error.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl ScopeError {
    pub(crate) fn resolution(role: Role, reason: impl Into<String>) -> Self {
        Self::Resolution {
            role,
            reason: reason.into(),
        }
    }
}

impl ErrorCode for ScopeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "SCOPE_RESOLUTION",
            Self::InvariantViolation(_) => "SCOPE_INVARIANT_VIOLATION",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// An operation was refused.
///
/// # Example
///
/// ```
/// use vigil_auth::{AccessDenied, Capability};
///
/// let err = AccessDenied::CapabilityDenied {
///     operation: "terminate_attempt".to_string(),
///     required: Capability::TERMINATE_ATTEMPTS,
///     available: Capability::ALERT_HANDLING,
/// };
/// assert!(err.to_string().contains("terminate_attempt"));
/// assert_eq!(err.layer(), "capability");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    /// The role lacks a capability the operation requires.
    #[error("capability denied: '{operation}' requires {required}, available: {available}")]
    CapabilityDenied {
        /// Operation attempted.
        operation: String,
        /// Capability required.
        required: Capability,
        /// Capabilities the role holds.
        available: Capability,
    },

    /// The target node lies outside the session's scope.
    #[error("out of scope: {tier} {node}")]
    OutOfScope {
        /// Tier of the target.
        tier: Tier,
        /// Target node.
        node: NodeId,
    },

    /// A scope change would reach outside the caller's own subtree.
    #[error("scope escalation refused: {from} cannot reach {to}")]
    Escalation {
        /// Caller's scope.
        from: GeographicScope,
        /// Requested scope.
        to: GeographicScope,
    },

    /// No authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The scope could not be evaluated; denied by default.
    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl AccessDenied {
    /// Returns the layer that refused.
    #[must_use]
    pub fn layer(&self) -> &'static str {
        match self {
            Self::CapabilityDenied { .. } => "capability",
            Self::OutOfScope { .. } | Self::Escalation { .. } | Self::Scope(_) => "scope",
            Self::NotAuthenticated => "session",
        }
    }
}

impl ErrorCode for AccessDenied {
    fn code(&self) -> &'static str {
        match self {
            Self::CapabilityDenied { .. } => "ACCESS_CAPABILITY_DENIED",
            Self::OutOfScope { .. } => "ACCESS_OUT_OF_SCOPE",
            Self::Escalation { .. } => "ACCESS_SCOPE_ESCALATION",
            Self::NotAuthenticated => "ACCESS_NOT_AUTHENTICATED",
            Self::Scope(_) => "ACCESS_SCOPE_FAILURE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}
