//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────┐
//! │  1. Environment Variables (VIGIL_*)      │  Runtime override
//! ├──────────────────────────────────────────┤
//! │  2. Project Config (.vigil/config.toml)  │  Deployment-specific
//! ├──────────────────────────────────────────┤
//! │  3. Global Config (~/.vigil/config.toml) │  Operator defaults
//! ├──────────────────────────────────────────┤
//! │  4. Default Values (compile-time)        │  Fallback
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `VIGIL_DEBUG` | `debug` | bool |
//! | `VIGIL_INVARIANT_MODE` | `auth.invariant_mode` | `panic` \| `deny` |
//! | `VIGIL_OPEN_TIMEOUT_MS` | `realtime.open_timeout_ms` | u64 |
//! | `VIGIL_AUDIT_ORIGIN` | `audit.origin` | String |
//! | `VIGIL_AUDIT_ENABLED` | `audit.enabled` | bool |
//!
//! # Example Configuration
//!
//! ```toml
//! # ~/.vigil/config.toml
//! debug = false
//!
//! [auth]
//! invariant_mode = "deny"
//!
//! [realtime]
//! open_timeout_ms = 10000
//! backoff_base_ms = 500
//! backoff_max_ms = 30000
//! max_reconnect_attempts = 0
//! event_buffer = 256
//!
//! [audit]
//! origin = "control-center"
//! enabled = true
//! write_timeout_ms = 2000
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{AuditConfig, AuthConfig, RealtimeConfig, VigilConfig};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".vigil")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".vigil";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
