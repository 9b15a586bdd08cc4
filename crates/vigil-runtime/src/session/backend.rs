//! Backend contracts consumed by the session store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use vigil_types::{ErrorCode, Identity, IdentityId, NodeId, Role};

/// Login credentials. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    login: String,
    secret: String,
}

impl Credentials {
    /// Creates credentials.
    #[must_use]
    pub fn new(login: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            secret: secret.into(),
        }
    }

    /// Login name.
    #[must_use]
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Secret (password or token).
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Unknown login or wrong secret.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The authentication backend could not be reached.
    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::Unavailable(_) => "AUTH_UNAVAILABLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

/// Authentication API.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verifies credentials.
    ///
    /// # Errors
    ///
    /// [`AuthError`] if the credentials are rejected or the backend fails.
    async fn authenticate(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    /// Invalidates the backend credential for `identity`.
    ///
    /// # Errors
    ///
    /// [`AuthError::Unavailable`] if the backend could not be told.
    async fn invalidate(&self, identity: &Identity) -> Result<(), AuthError>;

    /// Push notifications of credentials invalidated by the backend.
    fn expirations(&self) -> broadcast::Receiver<IdentityId>;
}

/// Role and assigned node of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Assigned role.
    pub role: Role,
    /// Assigned node; `None` for unrestricted roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
}

impl Assignment {
    /// Creates an assignment.
    #[must_use]
    pub fn new(role: Role, node: Option<NodeId>) -> Self {
        Self { role, node }
    }
}

/// Identity lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// No assignment exists for the identity.
    #[error("no role assignment for identity {0}")]
    NotFound(IdentityId),

    /// The directory could not be reached.
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for DirectoryError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "DIRECTORY_NOT_FOUND",
            Self::Unavailable(_) => "DIRECTORY_UNAVAILABLE",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Identity to role/node lookup, used once per login.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Looks up the assignment for `identity`.
    ///
    /// # Errors
    ///
    /// [`DirectoryError`] if there is none or the directory fails.
    async fn lookup(&self, identity: &Identity) -> Result<Assignment, DirectoryError>;
}
