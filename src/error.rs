//! Error types for infra.
//!
//! Every manager operation returns [`Result`]. Errors coming back from the
//! AWS SDK are folded into [`Error::Api`] together with a retryability flag so
//! that callers (and [`crate::retry::RetryPolicy`]) can decide whether the
//! operation is worth repeating.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for infra operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for infra.
#[derive(Error, Debug)]
pub enum Error {
    /// An AWS API call failed.
    #[error("API error: {message}")]
    Api {
        /// Error message, including the operation name
        message: String,
        /// Whether repeating the call may succeed
        retryable: bool,
    },

    /// A wait loop gave up before the resource reached the desired state.
    #[error("Poll error: {message}")]
    Poll {
        /// Error message
        message: String,
        /// True for timeouts, false when a failure state was observed
        retryable: bool,
    },

    /// User input was rejected before any API call was made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded.
    #[error("Failed to load configuration from '{path}': {message}")]
    Config {
        /// Path to the configuration file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Local filesystem failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// Path involved in the failed operation
        path: PathBuf,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    /// Generic error.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
        /// Whether repeating the operation may succeed
        retryable: bool,
    },
}

impl Error {
    /// Creates a new API error.
    pub fn api(message: impl Into<String>, retryable: bool) -> Self {
        Self::Api {
            message: message.into(),
            retryable,
        }
    }

    /// Creates a new I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new non-retryable generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if repeating the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api { retryable, .. }
            | Error::Poll { retryable, .. }
            | Error::Other { retryable, .. } => *retryable,
            Error::InvalidInput(_) | Error::Config { .. } | Error::Io { .. } => false,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Api { .. } => 2,
            Error::Poll { .. } => 3,
            Error::InvalidInput(_) => 4,
            Error::Config { .. } => 5,
            Error::Io { .. } => 6,
            Error::Other { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_flags() {
        assert!(Error::api("failed describe_instances", true).is_retryable());
        assert!(!Error::api("failed describe_instances", false).is_retryable());
        assert!(!Error::InvalidInput("bad tag".into()).is_retryable());
        assert!(Error::Poll {
            message: "timed out".into(),
            retryable: true
        }
        .is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::api("x", false).exit_code(), 2);
        assert_eq!(Error::InvalidInput("x".into()).exit_code(), 4);
        assert_eq!(Error::other("x").exit_code(), 1);
    }

    #[test]
    fn test_display() {
        let err = Error::io(
            "/tmp/key.pem",
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/key.pem"));
        assert!(msg.contains("exists"));
    }
}
