//! Subscription descriptors and channel keys.

use vigil_auth::{Filter, ScopedFilter};
use vigil_event::ChangeKind;

/// What a consumer wants to hear about.
///
/// Descriptors with the same `(resource, predicate)` share one channel;
/// `kinds` is per consumer and does not affect sharing.
///
/// The predicate is a [`ScopedFilter`], so a scope-narrowing predicate can
/// only come from `ScopeResolver::build_filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDescriptor {
    resource: String,
    kinds: Vec<ChangeKind>,
    predicate: Option<ScopedFilter>,
}

impl SubscriptionDescriptor {
    /// Every kind on `resource`, no predicate.
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            kinds: ChangeKind::ALL.to_vec(),
            predicate: None,
        }
    }

    /// Every kind on `resource`, narrowed by `predicate`.
    #[must_use]
    pub fn scoped(resource: impl Into<String>, predicate: ScopedFilter) -> Self {
        Self::new(resource).with_predicate(predicate)
    }

    /// Sets the predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: ScopedFilter) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Restricts delivery to `kinds`.
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self.kinds.dedup();
        self
    }

    /// Stream name.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Kinds delivered to this consumer.
    #[must_use]
    pub fn kinds(&self) -> &[ChangeKind] {
        &self.kinds
    }

    /// Predicate, if any.
    #[must_use]
    pub fn predicate(&self) -> Option<&ScopedFilter> {
        self.predicate.as_ref()
    }

    pub(crate) fn predicate_filter(&self) -> Filter {
        self.predicate
            .as_ref()
            .map(|p| p.as_filter().clone())
            .unwrap_or_default()
    }

    /// Whether this consumer wants `kind`.
    #[must_use]
    pub fn accepts(&self, kind: ChangeKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Deduplication key.
    #[must_use]
    pub fn key(&self) -> ChannelKey {
        ChannelKey {
            resource: self.resource.clone(),
            predicate: self
                .predicate
                .as_ref()
                .map(|p| p.canonical_key())
                .unwrap_or_default(),
        }
    }
}

/// Identity of a shared channel: resource plus canonical predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    resource: String,
    predicate: String,
}

impl ChannelKey {
    /// Stream name.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.predicate.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}?{}", self.resource, self.predicate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_auth::{GeographicScope, MemoryHierarchy, ScopeResolver};
    use vigil_types::{NodeId, Tier};

    fn scoped(mandal: &str, base: Filter) -> ScopedFilter {
        ScopeResolver::new(Arc::new(MemoryHierarchy::new()))
            .build_filter(&GeographicScope::confined(Tier::Mandal, NodeId::new(mandal)), base)
            .expect("scoped")
    }

    #[test]
    fn kinds_do_not_change_key() {
        let a = SubscriptionDescriptor::scoped("alerts", scoped("M1", Filter::new()));
        let b = a.clone().with_kinds([ChangeKind::Insert]);
        assert_eq!(a.key(), b.key());
        assert!(b.accepts(ChangeKind::Insert));
        assert!(!b.accepts(ChangeKind::Delete));
    }

    #[test]
    fn predicate_changes_key() {
        let m1 = SubscriptionDescriptor::scoped("alerts", scoped("M1", Filter::new()));
        let m2 = SubscriptionDescriptor::scoped("alerts", scoped("M2", Filter::new()));
        let bare = SubscriptionDescriptor::new("alerts");
        assert_ne!(m1.key(), m2.key());
        assert_ne!(m1.key(), bare.key());
        assert_eq!(bare.key().to_string(), "alerts");
        assert_eq!(m1.key().to_string(), r#"alerts?"mandalId"="M1""#);
    }

    #[test]
    fn clause_order_does_not_change_key() {
        let a = scoped("M1", Filter::new().where_eq("status", "OPEN").where_eq("kind", "face"));
        let b = scoped("M1", Filter::new().where_eq("kind", "face").where_eq("status", "OPEN"));
        assert_eq!(
            SubscriptionDescriptor::scoped("alerts", a).key(),
            SubscriptionDescriptor::scoped("alerts", b).key()
        );
    }
}
