//! Organizational hierarchy lookups.
//!
//! Ancestry checks need to know which district a mandal belongs to and
//! which mandal a centre belongs to. [`OrgHierarchy`] is that lookup; the
//! store behind it is an external collaborator. [`MemoryHierarchy`] is a
//! complete in-memory implementation, loadable from a [`HierarchySpec`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use vigil_types::{NodeId, Tier};

/// Parent lookup over the district → mandal → centre tree.
pub trait OrgHierarchy: Send + Sync {
    /// Parent of `node` at `tier`.
    ///
    /// `None` for districts and for nodes the hierarchy does not know.
    fn parent_of(&self, tier: Tier, node: &NodeId) -> Option<NodeId>;

    /// Whether `node` exists at `tier`.
    fn contains(&self, tier: Tier, node: &NodeId) -> bool;

    /// Whether `node` at `tier` lies under `ancestor` at `ancestor_tier`.
    ///
    /// Walks parents upward. Unknown nodes are never descendants, and a
    /// node is not its own descendant.
    fn is_descendant(
        &self,
        ancestor_tier: Tier,
        ancestor: &NodeId,
        tier: Tier,
        node: &NodeId,
    ) -> bool {
        if !ancestor_tier.is_above(tier) {
            return false;
        }
        let mut current_tier = tier;
        let mut current = node.clone();
        while let Some(parent_tier) = current_tier.parent() {
            let Some(parent) = self.parent_of(current_tier, &current) else {
                return false;
            };
            if parent_tier == ancestor_tier {
                return &parent == ancestor;
            }
            current_tier = parent_tier;
            current = parent;
        }
        false
    }
}

/// Hierarchy construction failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    /// A child references a parent that was not declared.
    #[error("{tier} {node} references unknown parent {parent}")]
    UnknownParent {
        /// Tier of the child.
        tier: Tier,
        /// Child node.
        node: NodeId,
        /// Missing parent.
        parent: NodeId,
    },
    /// A mandal or centre was declared without a parent.
    #[error("{tier} {node} has no parent")]
    MissingParent {
        /// Tier of the child.
        tier: Tier,
        /// Child node.
        node: NodeId,
    },
    /// The same node was declared twice at one tier.
    #[error("{tier} {node} declared more than once")]
    Duplicate {
        /// Tier.
        tier: Tier,
        /// Node.
        node: NodeId,
    },
}

/// Serializable description of a hierarchy.
///
/// ```toml
/// [[district]]
/// id = "D1"
///
/// [[mandal]]
/// id = "M1"
/// parent = "D1"
///
/// [[centre]]
/// id = "C7"
/// parent = "M1"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchySpec {
    /// Districts.
    #[serde(default)]
    pub district: Vec<NodeSpec>,
    /// Mandals; `parent` is a district.
    #[serde(default)]
    pub mandal: Vec<NodeSpec>,
    /// Centres; `parent` is a mandal.
    #[serde(default)]
    pub centre: Vec<NodeSpec>,
}

/// One node of a [`HierarchySpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node key.
    pub id: NodeId,
    /// Parent key; ignored for districts.
    #[serde(default)]
    pub parent: Option<NodeId>,
}

/// In-memory hierarchy.
///
/// ```
/// use vigil_auth::{MemoryHierarchy, OrgHierarchy};
/// use vigil_types::{NodeId, Tier};
///
/// let h = MemoryHierarchy::new()
///     .with_district("D1")
///     .with_mandal("M1", "D1")
///     .with_centre("C7", "M1");
/// assert!(h.is_descendant(Tier::District, &NodeId::new("D1"), Tier::Centre, &NodeId::new("C7")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryHierarchy {
    nodes: HashMap<(Tier, NodeId), Option<NodeId>>,
}

impl MemoryHierarchy {
    /// Empty hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a district.
    #[must_use]
    pub fn with_district(mut self, id: impl Into<NodeId>) -> Self {
        self.nodes.insert((Tier::District, id.into()), None);
        self
    }

    /// Adds a mandal under `district`. Does not validate the parent.
    #[must_use]
    pub fn with_mandal(mut self, id: impl Into<NodeId>, district: impl Into<NodeId>) -> Self {
        self.nodes
            .insert((Tier::Mandal, id.into()), Some(district.into()));
        self
    }

    /// Adds a centre under `mandal`. Does not validate the parent.
    #[must_use]
    pub fn with_centre(mut self, id: impl Into<NodeId>, mandal: impl Into<NodeId>) -> Self {
        self.nodes
            .insert((Tier::Centre, id.into()), Some(mandal.into()));
        self
    }

    /// Number of nodes across all tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` when no node is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl TryFrom<HierarchySpec> for MemoryHierarchy {
    type Error = HierarchyError;

    /// Builds a hierarchy, checking that every parent was declared at the
    /// tier above and no node is declared twice.
    fn try_from(spec: HierarchySpec) -> Result<Self, Self::Error> {
        let mut hierarchy = Self::new();
        let tiers = [
            (Tier::District, spec.district),
            (Tier::Mandal, spec.mandal),
            (Tier::Centre, spec.centre),
        ];
        for (tier, nodes) in tiers {
            for node in nodes {
                let parent = match tier.parent() {
                    None => None,
                    Some(parent_tier) => {
                        let parent = node.parent.clone().ok_or_else(|| {
                            HierarchyError::MissingParent {
                                tier,
                                node: node.id.clone(),
                            }
                        })?;
                        if !hierarchy.contains(parent_tier, &parent) {
                            return Err(HierarchyError::UnknownParent {
                                tier,
                                node: node.id,
                                parent,
                            });
                        }
                        Some(parent)
                    }
                };
                let key = (tier, node.id);
                if hierarchy.nodes.contains_key(&key) {
                    return Err(HierarchyError::Duplicate { tier, node: key.1 });
                }
                hierarchy.nodes.insert(key, parent);
            }
        }
        Ok(hierarchy)
    }
}

impl OrgHierarchy for MemoryHierarchy {
    fn parent_of(&self, tier: Tier, node: &NodeId) -> Option<NodeId> {
        self.nodes.get(&(tier, node.clone())).cloned().flatten()
    }

    fn contains(&self, tier: Tier, node: &NodeId) -> bool {
        self.nodes.contains_key(&(tier, node.clone()))
    }
}
