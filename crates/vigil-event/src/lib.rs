//! Message types for the vigil control layer.
//!
//! Two kinds of messages cross this layer's boundary:
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | [`ChangeEvent`] | backend → subscribers | live mutation notifications |
//! | [`AuditRecord`] | this layer → audit sink | append-only trail of security-relevant actions |
//!
//! Neither type contains authorization logic. Scope filtering of change
//! events and the decision to audit happen in `vigil-runtime`.

pub mod audit;
pub mod change;

pub use audit::{AuditAction, AuditEntry, AuditRecord};
pub use change::{ChangeEvent, ChangeKind};
