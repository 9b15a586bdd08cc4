//! Vigil Runtime - session lifecycle, live subscriptions and audit.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  vigil-types  : IDs, Role, Tier, Identity, ErrorCode        │
//! │  vigil-event  : ChangeEvent, AuditEntry, AuditRecord        │
//! │  vigil-auth   : Capability, ScopeResolver, ScopedFilter     │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  session/  : SessionStore, Authenticator, IdentityDirectory │
//! │  realtime/ : SubscriptionManager, ChangeFeed, Backoff       │
//! │  audit/    : AuditRecorder, AuditSink                       │
//! │  control   : ControlPlane facade                            │
//! │  config/   : VigilConfig, ConfigLoader                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! ## [`session`] - Session Lifecycle
//!
//! - [`SessionStore`](session::SessionStore): single-writer login/logout/expiry
//! - [`SessionStatus`](session::SessionStatus): observable state
//!
//! ## [`realtime`] - Live Subscriptions
//!
//! - [`SubscriptionManager`](realtime::SubscriptionManager): deduplicated channels
//! - [`SubscriptionHandle`](realtime::SubscriptionHandle): RAII registration
//! - [`ChangeFeed`](realtime::ChangeFeed): backend transport trait
//!
//! ## [`audit`] - Audit Trail
//!
//! - [`AuditRecorder`](audit::AuditRecorder): best-effort writer
//!
//! ## [`control`] - Facade
//!
//! - [`ControlPlane`](control::ControlPlane): session-aware helpers
//!
//! ## [`testing`] - Test Doubles
//!
//! In-memory backends for every trait above.

pub mod audit;
pub mod config;
pub mod control;
pub mod realtime;
pub mod session;
pub mod testing;

pub use audit::{AuditError, AuditOutcome, AuditRecorder, AuditSink};
pub use config::{ConfigError, ConfigLoader, VigilConfig};
pub use control::{Backends, ControlPlane, Operation, PerformError};
pub use realtime::{
    ChangeFeed, ChannelError, ChannelState, Connectivity, SubscriptionDescriptor,
    SubscriptionHandle, SubscriptionManager,
};
pub use session::{Credentials, SessionError, SessionStatus, SessionStore};
