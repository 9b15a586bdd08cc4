//! Capability flags.
//!
//! A [`Capability`] set answers "may this session do X". It is derived
//! solely from the role (see [`PermissionMatrix`](crate::PermissionMatrix))
//! and never depends on scope: scope decides *where*, capability decides
//! *what*.
//!
//! ```text
//! Effective permission = Capability(WHAT, from role) ∩ Scope(WHERE, from assigned node)
//! ```
//!
//! # Example
//!
//! ```
//! use vigil_auth::Capability;
//!
//! let caps = Capability::ACKNOWLEDGE | Capability::ESCALATE;
//! assert!(caps.can_acknowledge());
//! assert!(!caps.can_terminate_attempts());
//! assert_eq!(caps.to_string(), "ACKNOWLEDGE | ESCALATE");
//! ```

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Named permissions for privileged proctoring actions.
    ///
    /// | Capability | Action |
    /// |------------|--------|
    /// | [`ACKNOWLEDGE`](Self::ACKNOWLEDGE) | acknowledge a live alert |
    /// | [`ESCALATE`](Self::ESCALATE) | escalate an alert to the tier above |
    /// | [`LOCK_EVIDENCE`](Self::LOCK_EVIDENCE) | lock captured evidence against deletion |
    /// | [`TERMINATE_ATTEMPTS`](Self::TERMINATE_ATTEMPTS) | terminate a candidate's exam attempt |
    /// | [`TERMINATE_SESSIONS`](Self::TERMINATE_SESSIONS) | force-end another operator's session |
    /// | [`EXPORT_REPORTS`](Self::EXPORT_REPORTS) | export reports |
    /// | [`MANAGE_USERS`](Self::MANAGE_USERS) | manage accounts, act on a sub-node's scope |
    /// | [`VIEW_AUDIT`](Self::VIEW_AUDIT) | read the audit trail |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capability: u16 {
        /// Acknowledge a live alert.
        const ACKNOWLEDGE        = 0b0000_0001;
        /// Escalate an alert.
        const ESCALATE           = 0b0000_0010;
        /// Lock evidence files.
        const LOCK_EVIDENCE      = 0b0000_0100;
        /// Terminate a candidate's attempt.
        const TERMINATE_ATTEMPTS = 0b0000_1000;
        /// Force-end another operator's session.
        const TERMINATE_SESSIONS = 0b0001_0000;
        /// Export reports.
        const EXPORT_REPORTS     = 0b0010_0000;
        /// Manage operator accounts.
        const MANAGE_USERS       = 0b0100_0000;
        /// Read the audit trail.
        const VIEW_AUDIT         = 0b1000_0000;
    }
}

/// Name table, in flag order.
const NAMES: [(Capability, &str); 8] = [
    (Capability::ACKNOWLEDGE, "ACKNOWLEDGE"),
    (Capability::ESCALATE, "ESCALATE"),
    (Capability::LOCK_EVIDENCE, "LOCK_EVIDENCE"),
    (Capability::TERMINATE_ATTEMPTS, "TERMINATE_ATTEMPTS"),
    (Capability::TERMINATE_SESSIONS, "TERMINATE_SESSIONS"),
    (Capability::EXPORT_REPORTS, "EXPORT_REPORTS"),
    (Capability::MANAGE_USERS, "MANAGE_USERS"),
    (Capability::VIEW_AUDIT, "VIEW_AUDIT"),
];

impl Capability {
    /// Alert handling at the point of incident.
    pub const ALERT_HANDLING: Self = Self::ACKNOWLEDGE.union(Self::ESCALATE);

    /// Every capability.
    pub const ALL: Self = Self::all();

    /// Can acknowledge alerts.
    #[must_use]
    pub fn can_acknowledge(self) -> bool {
        self.contains(Self::ACKNOWLEDGE)
    }

    /// Can escalate alerts.
    #[must_use]
    pub fn can_escalate(self) -> bool {
        self.contains(Self::ESCALATE)
    }

    /// Can lock evidence.
    #[must_use]
    pub fn can_lock_evidence(self) -> bool {
        self.contains(Self::LOCK_EVIDENCE)
    }

    /// Can terminate exam attempts.
    #[must_use]
    pub fn can_terminate_attempts(self) -> bool {
        self.contains(Self::TERMINATE_ATTEMPTS)
    }

    /// Can terminate other operators' sessions.
    #[must_use]
    pub fn can_terminate_sessions(self) -> bool {
        self.contains(Self::TERMINATE_SESSIONS)
    }

    /// Can export reports.
    #[must_use]
    pub fn can_export_reports(self) -> bool {
        self.contains(Self::EXPORT_REPORTS)
    }

    /// Can manage users.
    #[must_use]
    pub fn can_manage_users(self) -> bool {
        self.contains(Self::MANAGE_USERS)
    }

    /// Can read the audit trail.
    #[must_use]
    pub fn can_view_audit(self) -> bool {
        self.contains(Self::VIEW_AUDIT)
    }

    /// Returns the names of the set flags, in flag order.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    /// Parses a capability name (case-insensitive). `ALL` is accepted.
    ///
    /// ```
    /// use vigil_auth::Capability;
    ///
    /// assert_eq!(Capability::parse("lock_evidence"), Some(Capability::LOCK_EVIDENCE));
    /// assert_eq!(Capability::parse("ALL"), Some(Capability::ALL));
    /// assert_eq!(Capability::parse("root"), None);
    /// ```
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        if upper == "ALL" {
            return Some(Self::ALL);
        }
        NAMES
            .iter()
            .find(|(_, n)| *n == upper)
            .map(|(flag, _)| *flag)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self.names();
        if names.is_empty() {
            write!(f, "(none)")
        } else {
            write!(f, "{}", names.join(" | "))
        }
    }
}
