//! Role → capability table.
//!
//! [`PermissionMatrix`] is the only place a role is turned into
//! permissions. Code elsewhere asks "can this session X" through the
//! resulting [`Capability`] set and never matches on [`Role`] to decide
//! authorization.
//!
//! | Capability | SUPER_ADMIN | DISTRICT | MANDAL | CENTRE |
//! |------------|:-:|:-:|:-:|:-:|
//! | ACKNOWLEDGE | ✓ | ✓ | ✓ | ✓ |
//! | ESCALATE | ✓ | ✓ | ✓ | ✓ |
//! | LOCK_EVIDENCE | ✓ | ✓ | ✓ | |
//! | TERMINATE_ATTEMPTS | ✓ | ✓ | ✓ | |
//! | TERMINATE_SESSIONS | ✓ | ✓ | | |
//! | EXPORT_REPORTS | ✓ | ✓ | ✓ | |
//! | MANAGE_USERS | ✓ | ✓ | | |
//! | VIEW_AUDIT | ✓ | ✓ | | |
//!
//! Any new privileged action needs a row here.

use crate::{AccessDenied, Capability};
use vigil_types::Role;

const DISTRICT: Capability = Capability::ALERT_HANDLING
    .union(Capability::LOCK_EVIDENCE)
    .union(Capability::TERMINATE_ATTEMPTS)
    .union(Capability::TERMINATE_SESSIONS)
    .union(Capability::EXPORT_REPORTS)
    .union(Capability::MANAGE_USERS)
    .union(Capability::VIEW_AUDIT);

const MANDAL: Capability = Capability::ALERT_HANDLING
    .union(Capability::LOCK_EVIDENCE)
    .union(Capability::TERMINATE_ATTEMPTS)
    .union(Capability::EXPORT_REPORTS);

const CENTRE: Capability = Capability::ALERT_HANDLING;

/// Static mapping from role to capability set.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionMatrix;

impl PermissionMatrix {
    /// Capabilities of `role`. Total over the closed role set.
    ///
    /// ```
    /// use vigil_auth::PermissionMatrix;
    /// use vigil_types::Role;
    ///
    /// let caps = PermissionMatrix::capabilities_for(Role::CentreInCharge);
    /// assert!(caps.can_acknowledge());
    /// assert!(!caps.can_terminate_attempts());
    /// ```
    #[must_use]
    pub const fn capabilities_for(role: Role) -> Capability {
        match role {
            Role::SuperAdmin => Capability::ALL,
            Role::DistrictInCharge => DISTRICT,
            Role::MandalInCharge => MANDAL,
            Role::CentreInCharge => CENTRE,
        }
    }

    /// Checks that `role` holds `required` for `operation`.
    ///
    /// # Errors
    ///
    /// [`AccessDenied::CapabilityDenied`] naming the operation and both sets.
    pub fn require(role: Role, required: Capability, operation: &str) -> Result<(), AccessDenied> {
        let available = Self::capabilities_for(role);
        if available.contains(required) {
            Ok(())
        } else {
            tracing::debug!(%role, operation, %required, "capability check refused");
            Err(AccessDenied::CapabilityDenied {
                operation: operation.to_string(),
                required,
                available,
            })
        }
    }
}
