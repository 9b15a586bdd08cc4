//! Core types for the vigil control layer.
//!
//! # Crate Architecture
//!
//! ```text
//! vigil-types   (IDs, Role, Tier, Identity, ErrorCode)   ◄── HERE
//!     ↑               ↑
//! vigil-event     vigil-auth
//! (ChangeEvent,   (PermissionMatrix, ScopeResolver,
//!  AuditRecord)    Filter, Session)
//!     ↑               ↑
//!     └─── vigil-runtime ───┘
//!          (SessionStore, SubscriptionManager, AuditRecorder, config)
//!               ↑
//!          vigil-cli
//! ```
//!
//! # Example
//!
//! ```
//! use vigil_types::{IdentityId, NodeId, Role, Tier};
//!
//! let role: Role = "MANDAL_IN_CHARGE".parse().unwrap();
//! assert_eq!(role.confining_tier(), Some(Tier::Mandal));
//!
//! let node = NodeId::new("M1");
//! let who = IdentityId::named("mandal.m1");
//! assert_eq!(node.as_str(), "M1");
//! assert_eq!(who, IdentityId::named("mandal.m1"));
//! ```

mod error;
mod id;
mod identity;
mod role;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{EventId, IdentityId, NodeId, SessionId};
pub use identity::Identity;
pub use role::{ParseRoleError, Role, Tier};
