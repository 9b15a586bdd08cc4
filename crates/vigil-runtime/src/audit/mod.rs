//! Audit recording.
//!
//! ```text
//! caller ──AuditEntry──► AuditRecorder ──stamp(origin, now)──► AuditSink::append
//!                             │
//!                             └── failure: warn! and AuditOutcome::Failed, never propagated
//! ```
//!
//! The recorder is called *after* the triggering action has succeeded or
//! failed. Audit writing never gates, rolls back or retries that action:
//! every append is bounded by the recorder's write timeout.

use crate::config::AuditConfig;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use vigil_event::{AuditAction, AuditEntry, AuditRecord};
use vigil_types::ErrorCode;

/// Append-only destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// [`AuditError`] if the record could not be written.
    async fn append(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Audit write failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// The sink could not be reached.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    /// The sink refused the record.
    #[error("audit record rejected: {0}")]
    Rejected(String),
    /// The sink did not answer within the write timeout.
    #[error("audit write timed out after {0:?}")]
    TimedOut(Duration),
}

impl ErrorCode for AuditError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "AUDIT_SINK_UNAVAILABLE",
            Self::Rejected(_) => "AUDIT_REJECTED",
            Self::TimedOut(_) => "AUDIT_TIMEOUT",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::TimedOut(_))
    }
}

/// Result of one [`AuditRecorder::record`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// The sink accepted the record.
    Written,
    /// The sink failed; the failure has been logged.
    Failed(AuditError),
    /// Recording is switched off in configuration.
    Disabled,
}

impl AuditOutcome {
    /// `true` for [`AuditOutcome::Written`].
    #[must_use]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Stamps and writes audit entries. Cheap to clone.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use vigil_event::{AuditAction, AuditEntry};
/// use vigil_runtime::audit::{AuditOutcome, AuditRecorder};
/// use vigil_runtime::testing::MemoryAuditSink;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = Arc::new(MemoryAuditSink::new());
/// let recorder = AuditRecorder::new(sink.clone(), "control-center");
///
/// let outcome = recorder.record(AuditEntry::new(AuditAction::LOGIN_FAILED, "session")).await;
/// assert_eq!(outcome, AuditOutcome::Written);
/// assert_eq!(sink.records()[0].origin, "control-center");
/// # }
/// ```
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    origin: Arc<str>,
    enabled: bool,
    write_timeout: Duration,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("origin", &self.origin)
            .field("enabled", &self.enabled)
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

impl AuditRecorder {
    /// Creates an enabled recorder stamping `origin` on every record.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, origin: impl Into<String>) -> Self {
        Self {
            sink,
            origin: Arc::from(origin.into()),
            enabled: true,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Creates a recorder from the `[audit]` config section.
    #[must_use]
    pub fn from_config(sink: Arc<dyn AuditSink>, config: &AuditConfig) -> Self {
        Self::new(sink, config.origin.clone())
            .with_enabled(config.enabled)
            .with_write_timeout(config.write_timeout())
    }

    /// Switches recording on or off.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Bounds how long one append may take. Zero is raised to 1ms.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Origin stamped on records.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether records are written.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stamps and writes `entry`. Never fails.
    pub async fn record(&self, entry: AuditEntry) -> AuditOutcome {
        if !self.enabled {
            tracing::debug!(action = %entry.action, "audit disabled, record dropped");
            return AuditOutcome::Disabled;
        }
        if entry.actor_id.is_none() && entry.action != AuditAction::LOGIN_FAILED {
            tracing::warn!(action = %entry.action, "audit record has no actor");
        }

        let record = entry.stamp(self.origin.as_ref(), Utc::now());
        let action = record.action.clone();
        let entity = record.entity.clone();
        let written = tokio::time::timeout(self.write_timeout, self.sink.append(record))
            .await
            .unwrap_or(Err(AuditError::TimedOut(self.write_timeout)));
        match written {
            Ok(()) => {
                tracing::debug!(%action, %entity, "audit record written");
                AuditOutcome::Written
            }
            Err(err) => {
                tracing::warn!(
                    %action,
                    %entity,
                    code = err.code(),
                    error = %err,
                    "audit write failed"
                );
                AuditOutcome::Failed(err)
            }
        }
    }

    /// Writes `entry` on a spawned task.
    ///
    /// For callers that must not await the sink. Must be called from
    /// within a Tokio runtime.
    pub fn record_detached(&self, entry: AuditEntry) -> JoinHandle<AuditOutcome> {
        let recorder = self.clone();
        tokio::spawn(async move { recorder.record(entry).await })
    }
}
