//! Machine-readable error codes.
//!
//! Every error enum in the vigil crates implements [`ErrorCode`] so that
//! callers (UI shells, log pipelines, the CLI) can branch on a stable code
//! instead of on display strings.
//!
//! # Example
//!
//! ```
//! use vigil_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LookupError {
//!     UnknownNode(String),
//!     Unavailable,
//! }
//!
//! impl ErrorCode for LookupError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::UnknownNode(_) => "LOOKUP_UNKNOWN_NODE",
//!             Self::Unavailable => "LOOKUP_UNAVAILABLE",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Unavailable)
//!     }
//! }
//!
//! let err = LookupError::Unavailable;
//! assert_eq!(err.code(), "LOOKUP_UNAVAILABLE");
//! assert!(err.is_recoverable());
//! ```

/// Stable, machine-readable error classification.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**, e.g. `"SESSION_BUSY"`
/// - **Prefixed by layer**: `SCOPE_`, `ACCESS_`, `SESSION_`, `CHANNEL_`, `AUDIT_`, `CONFIG_`
/// - **Stable**: a published code is an API contract
///
/// # Recoverability
///
/// An error is recoverable when retrying, or a user action, may succeed:
/// bad credentials, a busy session, a dropped change-feed connection.
///
/// Misconfigured assignments and invariant violations are not recoverable;
/// they require an administrative or code change.
pub trait ErrorCode {
    /// Returns the machine-readable code.
    fn code(&self) -> &'static str;

    /// Returns whether a retry or user action may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code follows the naming conventions.
///
/// # Panics
///
/// Panics if the code is empty, lacks `expected_prefix`, or is not
/// UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use vigil_types::{assert_error_code, ErrorCode};
///
/// #[derive(Debug)]
/// enum FeedError { Dropped }
///
/// impl ErrorCode for FeedError {
///     fn code(&self) -> &'static str { "FEED_DROPPED" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&FeedError::Dropped, "FEED_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Asserts [`assert_error_code`] for every listed variant.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
