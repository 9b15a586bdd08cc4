//! Geographic visibility scope.

use crate::ScopeError;
use serde::{Deserialize, Serialize};
use vigil_types::{NodeId, Tier};

/// The geographic subtree a session may see.
///
/// At most one field is set: the *confining field* of the session's role.
/// All fields empty means unrestricted, which only `SUPER_ADMIN` resolves to.
///
/// Scopes are produced by [`ScopeResolver::resolve_scope`](crate::ScopeResolver::resolve_scope);
/// a scope built by hand with two fields set is rejected by every resolver
/// operation.
///
/// ```
/// use vigil_auth::{Confinement, GeographicScope};
/// use vigil_types::{NodeId, Tier};
///
/// let scope = GeographicScope::confined(Tier::Mandal, NodeId::new("M1"));
/// assert_eq!(scope.mandal_id, Some(NodeId::new("M1")));
/// assert_eq!(
///     scope.confinement().unwrap(),
///     Confinement::Confined { tier: Tier::Mandal, node: &NodeId::new("M1") },
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeographicScope {
    /// Confining district.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district_id: Option<NodeId>,
    /// Confining mandal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mandal_id: Option<NodeId>,
    /// Confining examination centre.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centre_id: Option<NodeId>,
}

/// Interpreted form of a [`GeographicScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confinement<'a> {
    /// No confining field.
    Unrestricted,
    /// Exactly one confining field.
    Confined {
        /// Tier of the confining field.
        tier: Tier,
        /// Node the scope is confined to.
        node: &'a NodeId,
    },
}

impl GeographicScope {
    /// The empty scope.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// A scope confined to one node of `tier`.
    #[must_use]
    pub fn confined(tier: Tier, node: NodeId) -> Self {
        let mut scope = Self::default();
        *scope.slot_mut(tier) = Some(node);
        scope
    }

    /// Node set at `tier`, if any.
    #[must_use]
    pub fn node_at(&self, tier: Tier) -> Option<&NodeId> {
        match tier {
            Tier::District => self.district_id.as_ref(),
            Tier::Mandal => self.mandal_id.as_ref(),
            Tier::Centre => self.centre_id.as_ref(),
        }
    }

    fn slot_mut(&mut self, tier: Tier) -> &mut Option<NodeId> {
        match tier {
            Tier::District => &mut self.district_id,
            Tier::Mandal => &mut self.mandal_id,
            Tier::Centre => &mut self.centre_id,
        }
    }

    /// `true` when no field is set.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        Tier::ALL.iter().all(|tier| self.node_at(*tier).is_none())
    }

    /// Interprets the scope.
    ///
    /// # Errors
    ///
    /// [`ScopeError::InvariantViolation`] if more than one field is set.
    pub fn confinement(&self) -> Result<Confinement<'_>, ScopeError> {
        let mut set = Tier::ALL
            .iter()
            .filter_map(|tier| self.node_at(*tier).map(|node| (*tier, node)));
        match (set.next(), set.next()) {
            (None, _) => Ok(Confinement::Unrestricted),
            (Some((tier, node)), None) => Ok(Confinement::Confined { tier, node }),
            (Some(_), Some(_)) => Err(ScopeError::InvariantViolation(format!(
                "scope has more than one confining field: {self}"
            ))),
        }
    }
}

impl std::fmt::Display for GeographicScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = Tier::ALL
            .iter()
            .filter_map(|tier| {
                self.node_at(*tier)
                    .map(|node| format!("{}={node}", tier.field_name()))
            })
            .collect();
        if parts.is_empty() {
            f.write_str("{unrestricted}")
        } else {
            write!(f, "{{{}}}", parts.join(", "))
        }
    }
}
