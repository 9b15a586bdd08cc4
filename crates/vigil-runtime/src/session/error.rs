//! Session error types.

use super::backend::{AuthError, DirectoryError};
use thiserror::Error;
use vigil_auth::ScopeError;
use vigil_types::ErrorCode;

/// Session transition failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Role lookup failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The assignment could not be turned into a scope.
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Another login or logout is in flight.
    #[error("session transition already in progress")]
    Busy,

    /// Login while a session is active.
    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// Logout with no active session.
    #[error("not authenticated")]
    NotAuthenticated,
}

impl ErrorCode for SessionError {
    fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "SESSION_AUTH",
            Self::Directory(_) => "SESSION_DIRECTORY",
            Self::Scope(_) => "SESSION_SCOPE",
            Self::Busy => "SESSION_BUSY",
            Self::AlreadyAuthenticated => "SESSION_ALREADY_AUTHENTICATED",
            Self::NotAuthenticated => "SESSION_NOT_AUTHENTICATED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Auth(_) | Self::Busy => true,
            Self::Directory(e) => e.is_recoverable(),
            Self::Scope(_) | Self::AlreadyAuthenticated | Self::NotAuthenticated => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_types::{assert_error_codes, IdentityId};

    #[test]
    fn all_codes_prefixed() {
        assert_error_codes(
            &[
                SessionError::Auth(AuthError::InvalidCredentials),
                SessionError::Directory(DirectoryError::NotFound(IdentityId::named("x"))),
                SessionError::Busy,
                SessionError::AlreadyAuthenticated,
                SessionError::NotAuthenticated,
            ],
            "SESSION_",
        );
    }

    #[test]
    fn recoverability() {
        assert!(SessionError::Busy.is_recoverable());
        assert!(SessionError::Auth(AuthError::InvalidCredentials).is_recoverable());
        assert!(SessionError::Directory(DirectoryError::Unavailable("x".into())).is_recoverable());
        let missing = DirectoryError::NotFound(IdentityId::named("x"));
        assert!(!SessionError::Directory(missing).is_recoverable());
        assert!(!SessionError::NotAuthenticated.is_recoverable());
    }

    #[test]
    fn auth_message_passes_through() {
        let err: SessionError = AuthError::InvalidCredentials.into();
        assert_eq!(err.to_string(), "invalid credentials");
    }
}
