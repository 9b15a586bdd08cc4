//! Authenticated identity.

use crate::IdentityId;
use serde::{Deserialize, Serialize};

/// The actor behind a session.
///
/// An `Identity` is who someone is, not what they may do: role and
/// assigned node are looked up separately after authentication, and
/// capabilities are derived from the role.
///
/// # Example
///
/// ```
/// use vigil_types::{Identity, IdentityId};
///
/// let ident = Identity::new(IdentityId::named("centre.c7"), "centre.c7")
///     .with_display_name("C7 Superintendent");
/// assert_eq!(ident.login, "centre.c7");
/// assert_eq!(ident.display_name.as_deref(), Some("C7 Superintendent"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier.
    pub id: IdentityId,
    /// Login name used to authenticate.
    pub login: String,
    /// Human-readable name, if the directory provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Identity {
    /// Creates an identity without a display name.
    #[must_use]
    pub fn new(id: IdentityId, login: impl Into<String>) -> Self {
        Self {
            id,
            login: login.into(),
            display_name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.login, self.id)
    }
}
