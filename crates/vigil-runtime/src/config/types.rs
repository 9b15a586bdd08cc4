//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use crate::realtime::Backoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_auth::InvariantMode;

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use vigil_runtime::config::VigilConfig;
///
/// let config = VigilConfig::default();
/// assert!(!config.debug);
/// assert_eq!(config.realtime.open_timeout_ms, 10_000);
/// assert_eq!(config.audit.origin, "control-center");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VigilConfig {
    /// Enable debug mode (verbose logging).
    pub debug: bool,

    /// Authorization settings.
    pub auth: AuthConfig,

    /// Live subscription settings.
    pub realtime: RealtimeConfig,

    /// Audit trail settings.
    pub audit: AuditConfig,
}

impl VigilConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they
    /// differ from the default.
    pub fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.debug != default.debug {
            self.debug = other.debug;
        }

        self.auth.merge(&other.auth);
        self.realtime.merge(&other.realtime);
        self.audit.merge(&other.audit);
    }
}

/// Authorization configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Handling of scope invariant violations: `"deny"` (default) or `"panic"`.
    pub invariant_mode: InvariantMode,
}

impl AuthConfig {
    fn merge(&mut self, other: &Self) {
        if other.invariant_mode != InvariantMode::default() {
            self.invariant_mode = other.invariant_mode;
        }
    }
}

/// Realtime subscription configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RealtimeConfig {
    /// How long a channel may take to reach Subscribed before the attempt
    /// counts as failed.
    pub open_timeout_ms: u64,

    /// First reconnect delay.
    pub backoff_base_ms: u64,

    /// Reconnect delay cap.
    pub backoff_max_ms: u64,

    /// Consecutive failed reconnects before a channel is closed.
    /// `0` retries forever.
    pub max_reconnect_attempts: u32,

    /// Per-channel transport buffer, in events.
    pub event_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 10_000,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            max_reconnect_attempts: 0,
            event_buffer: 256,
        }
    }
}

impl RealtimeConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.open_timeout_ms != default.open_timeout_ms {
            self.open_timeout_ms = other.open_timeout_ms;
        }
        if other.backoff_base_ms != default.backoff_base_ms {
            self.backoff_base_ms = other.backoff_base_ms;
        }
        if other.backoff_max_ms != default.backoff_max_ms {
            self.backoff_max_ms = other.backoff_max_ms;
        }
        if other.max_reconnect_attempts != default.max_reconnect_attempts {
            self.max_reconnect_attempts = other.max_reconnect_attempts;
        }
        if other.event_buffer != default.event_buffer {
            self.event_buffer = other.event_buffer;
        }
    }

    /// Channel open timeout.
    #[must_use]
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Reconnect schedule.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
        .with_max_attempts(self.max_reconnect_attempts)
    }
}

/// Audit configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Origin stamped on every record.
    pub origin: String,

    /// Write records at all.
    pub enabled: bool,

    /// Longest a single sink append may take before it is abandoned.
    pub write_timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            origin: "control-center".into(),
            enabled: true,
            write_timeout_ms: 2_000,
        }
    }
}

impl AuditConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.origin != default.origin {
            self.origin = other.origin.clone();
        }
        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
        if other.write_timeout_ms != default.write_timeout_ms {
            self.write_timeout_ms = other.write_timeout_ms;
        }
    }

    /// Audit append timeout.
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
