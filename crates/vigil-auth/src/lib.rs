//! Authorization scoping for the vigil control layer.
//!
//! # Two-Layer Permission Model
//!
//! ```text
//! Effective permission = Capability(WHAT) ∩ Scope(WHERE)
//! ```
//!
//! | Layer | Type | Derived from |
//! |-------|------|--------------|
//! | [`Capability`] | Bitflags | role only, via [`PermissionMatrix`] |
//! | [`GeographicScope`] | Struct | role + assigned node, via [`ScopeResolver`] |
//!
//! A [`Session`] snapshot carries both. Every data query and live
//! subscription predicate passes through [`ScopeResolver::build_filter`],
//! which returns a [`ScopedFilter`]; APIs that touch data accept only that
//! type.
//!
//! # Crate Architecture
//!
//! ```text
//! vigil-types  (IDs, Role, Tier)
//!     ↑            ↑
//! vigil-event  vigil-auth  ◄── THIS CRATE
//!                  ↑
//!            vigil-runtime (SessionStore, SubscriptionManager)
//! ```
//!
//! # Design Principles
//!
//! - **Deny wins**: any ambiguity in scope computation resolves to the most
//!   restrictive outcome
//! - **No role comparisons outside the matrix**: callers ask "can I X"
//! - **Strict ancestry**: outranking a tier is not visibility into it

pub mod capability;
pub mod error;
pub mod filter;
pub mod hierarchy;
pub mod matrix;
pub mod resolver;
pub mod scope;
pub mod session;

pub use capability::Capability;
pub use error::{AccessDenied, ScopeError};
pub use filter::{Filter, ScopedFilter};
pub use hierarchy::{HierarchyError, HierarchySpec, MemoryHierarchy, NodeSpec, OrgHierarchy};
pub use matrix::PermissionMatrix;
pub use resolver::{InvariantMode, ScopeResolver};
pub use scope::{Confinement, GeographicScope};
pub use session::Session;

pub use vigil_types::{NodeId, Role, Tier};
