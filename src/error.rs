//! Error types for the Termsift library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`TermsiftError`] enum. The variants mirror the failure classes callers
//! have to tell apart:
//!
//! - malformed query text ([`TermsiftError::Syntax`]),
//! - a `{name}` placeholder with no bound value ([`TermsiftError::MissingParameter`]),
//! - a violated write precondition ([`TermsiftError::ConditionalCheckFailed`]),
//! - a store that could not serve the request ([`TermsiftError::StoreUnavailable`]).
//!
//! # Examples
//!
//! ```
//! use termsift::error::{Result, TermsiftError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(TermsiftError::invalid_argument("page size must be positive"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Termsift operations.
#[derive(Error, Debug)]
pub enum TermsiftError {
    /// Malformed query text.
    #[error("Syntax error at {position}: {message}")]
    Syntax {
        /// What the compiler expected or found.
        message: String,
        /// Character offset into the query text.
        position: usize,
    },

    /// A query referenced a parameter that was not supplied.
    #[error("Missing parameter: {{{0}}}")]
    MissingParameter(String),

    /// A write precondition did not hold.
    #[error("Conditional check failed: {0}")]
    ConditionalCheckFailed(String),

    /// The backing store could not serve the request.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Schema-related errors (unknown table or column, duplicate column).
    #[error("Schema error: {0}")]
    Schema(String),

    /// Errors raised by an index-term capability.
    #[error("Capability error: {0}")]
    Capability(String),

    /// Invalid argument or configuration.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with TermsiftError.
pub type Result<T> = std::result::Result<T, TermsiftError>;

impl TermsiftError {
    /// Create a new syntax error.
    pub fn syntax<S: Into<String>>(msg: S, position: usize) -> Self {
        TermsiftError::Syntax {
            message: msg.into(),
            position,
        }
    }

    /// Create a new missing parameter error.
    pub fn missing_parameter<S: Into<String>>(name: S) -> Self {
        TermsiftError::MissingParameter(name.into())
    }

    /// Create a new conditional check failure.
    pub fn conditional_check_failed<S: Into<String>>(msg: S) -> Self {
        TermsiftError::ConditionalCheckFailed(msg.into())
    }

    /// Create a new store unavailable error.
    pub fn store_unavailable<S: Into<String>>(msg: S) -> Self {
        TermsiftError::StoreUnavailable(msg.into())
    }

    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        TermsiftError::Schema(msg.into())
    }

    /// Create a new capability error.
    pub fn capability<S: Into<String>>(msg: S) -> Self {
        TermsiftError::Capability(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TermsiftError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TermsiftError::Other(msg.into())
    }

    /// Whether this error came from malformed query text.
    pub fn is_syntax(&self) -> bool {
        matches!(self, TermsiftError::Syntax { .. })
    }

    /// Whether this error is a failed write precondition.
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, TermsiftError::ConditionalCheckFailed(_))
    }

    /// Whether re-running the whole operation may succeed.
    ///
    /// Only transient store failures qualify. A failed precondition needs a
    /// fresh read by the caller before it is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TermsiftError::StoreUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TermsiftError::syntax("expected '='", 7);
        assert_eq!(error.to_string(), "Syntax error at 7: expected '='");

        let error = TermsiftError::missing_parameter("x");
        assert_eq!(error.to_string(), "Missing parameter: {x}");

        let error = TermsiftError::schema("unknown column 'age'");
        assert_eq!(error.to_string(), "Schema error: unknown column 'age'");
    }

    #[test]
    fn test_error_classification() {
        assert!(TermsiftError::syntax("bad", 0).is_syntax());
        assert!(TermsiftError::conditional_check_failed("exists").is_conditional_check_failed());
        assert!(TermsiftError::store_unavailable("timeout").is_retryable());
        assert!(!TermsiftError::conditional_check_failed("exists").is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = TermsiftError::from(io_error);

        match error {
            TermsiftError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
