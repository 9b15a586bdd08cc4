//! Data-access filters.
//!
//! A [`Filter`] is a conjunction of field equality clauses, the shape every
//! list query and change-feed predicate in the control center takes
//! (`status = "OPEN" AND mandalId = "M1"`).
//!
//! A [`ScopedFilter`] is a filter that has passed through
//! [`ScopeResolver::build_filter`](crate::ScopeResolver::build_filter). It
//! has no public constructor and does not implement `Deserialize`, so an
//! API that takes one cannot be handed an unscoped filter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Deref;

/// Equality-clause filter.
///
/// A *contradicted* filter carries two incompatible requirements for the
/// same field and matches nothing. Scope narrowing produces one when a
/// caller pins the confining field to a node outside the scope.
///
/// ```
/// use serde_json::json;
/// use vigil_auth::Filter;
///
/// let f = Filter::new().where_eq("status", "OPEN");
/// assert!(f.matches(&json!({"status": "OPEN", "mandalId": "M1"})));
/// assert!(!f.matches(&json!({"status": "CLOSED"})));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(flatten)]
    clauses: BTreeMap<String, Value>,
    #[serde(
        default,
        rename = "$contradicted",
        skip_serializing_if = "std::ops::Not::not"
    )]
    contradicted: bool,
}

impl Filter {
    /// An empty filter; matches every object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) an equality clause.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.insert(field.into(), value.into());
        self
    }

    /// Inserts a clause, returning the previous value for `field`.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.clauses.insert(field.into(), value.into())
    }

    /// Required value of `field`, if constrained.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.clauses.get(field)
    }

    /// Clauses in field order.
    pub fn clauses(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.clauses.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of clauses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// `true` when there are no clauses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// `true` when the filter can match nothing.
    #[must_use]
    pub fn is_contradicted(&self) -> bool {
        self.contradicted
    }

    pub(crate) fn mark_contradicted(&mut self) {
        self.contradicted = true;
    }

    /// Evaluates the filter against a JSON payload.
    ///
    /// Every clause must equal the payload's top-level field. A non-object
    /// payload only matches a filter with no clauses.
    #[must_use]
    pub fn matches(&self, payload: &Value) -> bool {
        if self.contradicted {
            return false;
        }
        if self.clauses.is_empty() {
            return true;
        }
        let Some(object) = payload.as_object() else {
            return false;
        };
        self.clauses
            .iter()
            .all(|(field, expected)| object.get(field) == Some(expected))
    }

    /// Deterministic text form; equal filters produce equal keys.
    ///
    /// ```
    /// use vigil_auth::Filter;
    ///
    /// let a = Filter::new().where_eq("b", 2).where_eq("a", "x");
    /// let b = Filter::new().where_eq("a", "x").where_eq("b", 2);
    /// assert_eq!(a.canonical_key(), b.canonical_key());
    /// assert_eq!(a.canonical_key(), r#""a"="x"&"b"=2"#);
    /// ```
    #[must_use]
    pub fn canonical_key(&self) -> String {
        let mut key = self
            .clauses
            .iter()
            .map(|(field, value)| format!("{}={value}", Value::String(field.clone())))
            .collect::<Vec<_>>()
            .join("&");
        if self.contradicted {
            key.push_str("&!");
        }
        key
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            clauses: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            contradicted: false,
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.clauses.is_empty() && !self.contradicted {
            return f.write_str("{}");
        }
        f.write_str(&self.canonical_key())
    }
}

/// A filter narrowed to a session's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScopedFilter(Filter);

impl ScopedFilter {
    pub(crate) fn new(filter: Filter) -> Self {
        Self(filter)
    }

    /// The underlying filter.
    #[must_use]
    pub fn as_filter(&self) -> &Filter {
        &self.0
    }

    /// Unwraps into a plain filter, e.g. to extend it and re-scope it.
    #[must_use]
    pub fn into_filter(self) -> Filter {
        self.0
    }
}

impl Deref for ScopedFilter {
    type Target = Filter;

    fn deref(&self) -> &Filter {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_anything() {
        let f = Filter::new();
        assert!(f.matches(&json!({"a": 1})));
        assert!(f.matches(&json!(null)));
        assert_eq!(f.to_string(), "{}");
    }

    #[test]
    fn non_object_payload_fails_constrained_filter() {
        let f = Filter::new().where_eq("mandalId", "M1");
        assert!(!f.matches(&json!(["M1"])));
        assert!(!f.matches(&json!({})));
    }

    #[test]
    fn value_types_must_match_exactly() {
        let f = Filter::new().where_eq("attempt", 3);
        assert!(f.matches(&json!({"attempt": 3})));
        assert!(!f.matches(&json!({"attempt": "3"})));
    }

    #[test]
    fn contradicted_matches_nothing() {
        let mut f = Filter::new();
        f.mark_contradicted();
        assert!(!f.matches(&json!({})));
        assert!(f.canonical_key().ends_with('!'));
    }

    #[test]
    fn serde_is_flat_object() {
        let f = Filter::new().where_eq("status", "OPEN").where_eq("mandalId", "M1");
        let json = serde_json::to_value(&f).expect("serialize filter");
        assert_eq!(json, json!({"status": "OPEN", "mandalId": "M1"}));
        let back: Filter = serde_json::from_value(json).expect("deserialize filter");
        assert_eq!(back, f);
    }

    #[test]
    fn contradiction_survives_serde() {
        let mut f = Filter::new().where_eq("mandalId", "M2");
        f.mark_contradicted();
        let json = serde_json::to_value(&f).expect("serialize filter");
        assert_eq!(json["$contradicted"], json!(true));
        let back: Filter = serde_json::from_value(json).expect("deserialize filter");
        assert!(back.is_contradicted());
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn collect_from_pairs() {
        let f: Filter = [("status", "OPEN"), ("tier", "mandal")].into_iter().collect();
        assert_eq!(f.get("status"), Some(&json!("OPEN")));
        assert_eq!(f.clauses().count(), 2);
    }
}
