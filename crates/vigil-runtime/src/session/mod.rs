//! Session lifecycle.
//!
//! # State Machine
//!
//! ```text
//!                  login()
//! Unauthenticated ────────► Authenticating ──ok──► Authenticated
//!       ▲                         │                      │
//!       └─────────failure─────────┘                      │
//!       └──────────────── logout() / backend expiry ─────┘
//! ```
//!
//! # Backends
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Authenticator`] | verify credentials, invalidate, push expiries |
//! | [`IdentityDirectory`] | identity → role + assigned node |
//!
//! # Error Handling
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | Bad credentials | `SESSION_AUTH` | Yes |
//! | Lookup failed | `SESSION_DIRECTORY` | If transient |
//! | Bad assignment | `SESSION_SCOPE` | No |
//! | Transition in flight | `SESSION_BUSY` | Yes |
//! | Already logged in | `SESSION_ALREADY_AUTHENTICATED` | No |
//! | Not logged in | `SESSION_NOT_AUTHENTICATED` | No |

mod backend;
mod error;
mod store;

pub use backend::{
    Assignment, AuthError, Authenticator, Credentials, DirectoryError, IdentityDirectory,
};
pub use error::SessionError;
pub use store::{SessionStatus, SessionStore};
