//! Scope resolution and filter narrowing.
//!
//! [`ScopeResolver`] is the single gate between a session and organizational
//! data:
//!
//! ```text
//! (role, assigned node) ──resolve_scope──► GeographicScope
//!                                              │
//!           base Filter ──build_filter─────────┼──► ScopedFilter ──► query / live channel
//!                                              │
//!      (target node, tier) ──can_view──────────┴──► bool
//! ```
//!
//! Every ambiguity resolves to the most restrictive outcome. A scope that
//! no resolution could have produced is an invariant violation, handled per
//! [`InvariantMode`].
//!
//! # Row model
//!
//! Narrowing adds the scope's confining field to the filter. Rows and
//! change payloads are expected to carry the identifier of every ancestor
//! tier (`districtId`, `mandalId`, `centreId`), so an equality clause on the
//! confining field is enough to keep a query inside the subtree.

use crate::{
    AccessDenied, Capability, Confinement, Filter, GeographicScope, OrgHierarchy, ScopeError,
    ScopedFilter, Session,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use vigil_types::{NodeId, Role, Tier};

/// What to do on a scope invariant violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvariantMode {
    /// Panic. For development and test builds.
    Panic,
    /// Log at error level and return [`ScopeError::InvariantViolation`].
    #[default]
    Deny,
}

impl std::str::FromStr for InvariantMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "panic" => Ok(Self::Panic),
            "deny" => Ok(Self::Deny),
            other => Err(format!("unknown invariant mode '{other}' (expected panic or deny)")),
        }
    }
}

/// Derives scopes and narrows filters against an organizational hierarchy.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use serde_json::json;
/// use vigil_auth::{Filter, MemoryHierarchy, ScopeResolver};
/// use vigil_types::{NodeId, Role};
///
/// let resolver = ScopeResolver::new(Arc::new(MemoryHierarchy::new()));
/// let scope = resolver.resolve_scope(Role::MandalInCharge, Some(&NodeId::new("M1")))?;
/// let filter = resolver.build_filter(&scope, Filter::new().where_eq("status", "OPEN"))?;
///
/// assert_eq!(serde_json::to_value(&filter)?, json!({"status": "OPEN", "mandalId": "M1"}));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct ScopeResolver {
    hierarchy: Arc<dyn OrgHierarchy>,
    mode: InvariantMode,
}

impl std::fmt::Debug for ScopeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeResolver")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ScopeResolver {
    /// Creates a resolver in [`InvariantMode::Deny`].
    #[must_use]
    pub fn new(hierarchy: Arc<dyn OrgHierarchy>) -> Self {
        Self {
            hierarchy,
            mode: InvariantMode::default(),
        }
    }

    /// Sets the invariant mode.
    #[must_use]
    pub fn with_invariant_mode(mut self, mode: InvariantMode) -> Self {
        self.mode = mode;
        self
    }

    /// Current invariant mode.
    #[must_use]
    pub fn invariant_mode(&self) -> InvariantMode {
        self.mode
    }

    /// The hierarchy used for ancestry checks.
    #[must_use]
    pub fn hierarchy(&self) -> &dyn OrgHierarchy {
        self.hierarchy.as_ref()
    }

    fn violation(&self, detail: String) -> ScopeError {
        tracing::error!(%detail, "scope invariant violated");
        if self.mode == InvariantMode::Panic {
            panic!("scope invariant violated: {detail}");
        }
        ScopeError::InvariantViolation(detail)
    }

    fn confinement<'s>(&self, scope: &'s GeographicScope) -> Result<Confinement<'s>, ScopeError> {
        scope.confinement().map_err(|err| match err {
            ScopeError::InvariantViolation(detail) => self.violation(detail),
            other => other,
        })
    }

    /// Verifies that `scope` is the shape `role` resolves to.
    fn check_role_scope(&self, role: Role, scope: &GeographicScope) -> Result<(), ScopeError> {
        let confinement = self.confinement(scope)?;
        match (role.confining_tier(), confinement) {
            (None, Confinement::Unrestricted) => Ok(()),
            (Some(expected), Confinement::Confined { tier, .. }) if expected == tier => Ok(()),
            (None, Confinement::Confined { tier, .. }) => Err(self.violation(format!(
                "{role} carries a {tier} confining field: {scope}"
            ))),
            (Some(expected), Confinement::Unrestricted) => Err(self.violation(format!(
                "{role} has an empty scope, expected a {expected} confining field"
            ))),
            (Some(expected), Confinement::Confined { tier, .. }) => Err(self.violation(format!(
                "{role} is confined at {tier}, expected {expected}: {scope}"
            ))),
        }
    }

    /// Derives the scope for `role` assigned to `assigned`.
    ///
    /// `SUPER_ADMIN` resolves to the empty scope and its assignment is
    /// ignored. Every other role gets exactly its confining field set to the
    /// assigned node.
    ///
    /// # Errors
    ///
    /// [`ScopeError::Resolution`] if a confined role has no (or a blank)
    /// assigned node.
    pub fn resolve_scope(
        &self,
        role: Role,
        assigned: Option<&NodeId>,
    ) -> Result<GeographicScope, ScopeError> {
        let Some(tier) = role.confining_tier() else {
            return Ok(GeographicScope::unrestricted());
        };
        let node = assigned.ok_or_else(|| ScopeError::resolution(role, "no assigned node"))?;
        if node.as_str().trim().is_empty() {
            return Err(ScopeError::resolution(role, "assigned node key is blank"));
        }
        Ok(GeographicScope::confined(tier, node.clone()))
    }

    /// Narrows `base` to `scope`.
    ///
    /// - Unrestricted scope: `base` unchanged.
    /// - Confined scope: the confining field is added. A clause `base`
    ///   already has for that field is never removed; if it names a
    ///   different node the filter is marked contradicted and matches
    ///   nothing.
    ///
    /// Idempotent: narrowing the result again returns an equal filter.
    ///
    /// # Errors
    ///
    /// [`ScopeError::InvariantViolation`] for a scope with more than one
    /// confining field.
    pub fn build_filter(
        &self,
        scope: &GeographicScope,
        base: Filter,
    ) -> Result<ScopedFilter, ScopeError> {
        let Confinement::Confined { tier, node } = self.confinement(scope)? else {
            return Ok(ScopedFilter::new(base));
        };

        let mut filter = base;
        let field = tier.field_name();
        let required = Value::String(node.as_str().to_owned());
        match filter.get(field).cloned() {
            None => {
                filter.insert(field, required);
            }
            Some(existing) if existing == required => {}
            Some(existing) => {
                tracing::debug!(field, %existing, %scope, "filter pins a node outside scope");
                filter.mark_contradicted();
            }
        }
        Ok(ScopedFilter::new(filter))
    }

    /// [`build_filter`](Self::build_filter) after checking that `scope`
    /// matches `role`.
    ///
    /// # Errors
    ///
    /// [`ScopeError::InvariantViolation`] if the scope is not the shape the
    /// role resolves to. A confined role with an empty scope is never
    /// treated as unrestricted.
    pub fn build_filter_for(
        &self,
        role: Role,
        scope: &GeographicScope,
        base: Filter,
    ) -> Result<ScopedFilter, ScopeError> {
        self.check_role_scope(role, scope)?;
        self.build_filter(scope, base)
    }

    /// Whether `scope` may see `target` at `tier`.
    ///
    /// True iff the scope is unrestricted, or confined at `tier` to
    /// `target`, or confined at a strictly higher tier to an ancestor of
    /// `target`. Ancestry is always checked against the hierarchy; a
    /// district scope does not see a mandal of another district.
    ///
    /// # Errors
    ///
    /// [`ScopeError::InvariantViolation`] for a malformed scope.
    pub fn can_view(
        &self,
        scope: &GeographicScope,
        target: &NodeId,
        tier: Tier,
    ) -> Result<bool, ScopeError> {
        let visible = match self.confinement(scope)? {
            Confinement::Unrestricted => true,
            Confinement::Confined { tier: own, node } if own == tier => node == target,
            Confinement::Confined { tier: own, node } if own.is_above(tier) => {
                self.hierarchy.is_descendant(own, node, tier, target)
            }
            Confinement::Confined { .. } => false,
        };
        Ok(visible)
    }

    /// [`can_view`](Self::can_view) after checking that `scope` matches
    /// `role`.
    ///
    /// # Errors
    ///
    /// [`ScopeError::InvariantViolation`] as for
    /// [`build_filter_for`](Self::build_filter_for).
    pub fn can_view_for(
        &self,
        role: Role,
        scope: &GeographicScope,
        target: &NodeId,
        tier: Tier,
    ) -> Result<bool, ScopeError> {
        self.check_role_scope(role, scope)?;
        self.can_view(scope, target, tier)
    }

    /// Visibility check for `session` as an access decision.
    ///
    /// # Errors
    ///
    /// [`AccessDenied::OutOfScope`] if the target is not visible,
    /// [`AccessDenied::Scope`] if the session's scope is malformed.
    pub fn check_view(
        &self,
        session: &Session,
        target: &NodeId,
        tier: Tier,
    ) -> Result<(), AccessDenied> {
        if self.can_view_for(session.role(), session.scope(), target, tier)? {
            Ok(())
        } else {
            Err(AccessDenied::OutOfScope {
                tier,
                node: target.clone(),
            })
        }
    }

    /// Derives a working scope at `target` for an operator managing that
    /// part of the organization.
    ///
    /// Requires [`Capability::MANAGE_USERS`], and the target must lie inside
    /// the session's own subtree. Only an unrestricted session may widen to
    /// the unrestricted scope.
    ///
    /// # Errors
    ///
    /// - [`AccessDenied::CapabilityDenied`] without `MANAGE_USERS`
    /// - [`AccessDenied::Escalation`] if `target` is outside the caller's subtree
    /// - [`AccessDenied::Scope`] if either scope is malformed
    pub fn widen(
        &self,
        session: &Session,
        target: &GeographicScope,
    ) -> Result<GeographicScope, AccessDenied> {
        session.require(Capability::MANAGE_USERS, "widen_scope")?;
        self.check_role_scope(session.role(), session.scope())?;

        let reachable = match self.confinement(target)? {
            Confinement::Unrestricted => session.scope().is_unrestricted(),
            Confinement::Confined { tier, node } => self.can_view(session.scope(), node, tier)?,
        };
        if !reachable {
            return Err(AccessDenied::Escalation {
                from: session.scope().clone(),
                to: target.clone(),
            });
        }
        tracing::info!(
            session = %session.id(),
            from = %session.scope(),
            to = %target,
            "scope widened"
        );
        Ok(target.clone())
    }
}
