//! Storage error types and result alias.
//!
//! Every [`SecretSource`](crate::SecretSource) implementation maps its
//! internal failures to these standardized variants so that callers can
//! decide between serving stale data and failing hard.
//!
//! # Error Types
//!
//! - [`StorageError::NotFound`] - The secret does not exist in the source
//! - [`StorageError::InvalidId`] - The identifier cannot address a secret
//! - [`StorageError::Connection`] - Network or I/O failures reaching the source
//! - [`StorageError::Serialization`] - The secret blob could not be decoded
//! - [`StorageError::Internal`] - Backend-specific internal errors
//! - [`StorageError::Timeout`] - The read exceeded its time limit
//!
//! # Example
//!
//! ```
//! use attestor_storage::{StorageError, StorageResult};
//!
//! fn lookup(secret_id: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(secret_id))
//! }
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading from a secret source.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested secret was not found.
    ///
    /// This is a definitive answer from the source, not a transient failure.
    #[error("Secret not found: {secret_id}")]
    NotFound {
        /// The identifier that was not found.
        secret_id: String,
    },

    /// The identifier is not usable by the source.
    ///
    /// A misconfiguration: retrying with the same identifier cannot succeed.
    #[error("Invalid secret identifier {secret_id:?}: {reason}")]
    InvalidId {
        /// The rejected identifier.
        secret_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Connection, network or I/O error.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The secret payload could not be decoded.
    ///
    /// Typically indicates a corrupted blob or a schema mismatch.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused decoding to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// The read exceeded its configured time limit.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given secret identifier.
    #[must_use]
    pub fn not_found(secret_id: impl Into<String>) -> Self {
        Self::NotFound { secret_id: secret_id.into() }
    }

    /// Creates a new `InvalidId` error.
    #[must_use]
    pub fn invalid_id(secret_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidId { secret_id: secret_id.into(), reason: reason.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` if the source may succeed on a later attempt.
    ///
    /// Connection failures, timeouts and internal backend errors are
    /// transient. A missing secret, an unusable identifier or an undecodable
    /// blob is a definitive answer and will not change by retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout | Self::Internal { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use rstest::rstest;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            StorageError::not_found("attestation-keys").to_string(),
            "Secret not found: attestation-keys"
        );
        assert_eq!(
            StorageError::connection("refused").to_string(),
            "Connection error: refused"
        );
        assert_eq!(StorageError::timeout().to_string(), "Operation timeout");
        assert_eq!(
            StorageError::invalid_id("../keys", "contains a path separator").to_string(),
            "Invalid secret identifier \"../keys\": contains a path separator"
        );
    }

    #[rstest]
    #[case::connection(StorageError::connection("down"), true)]
    #[case::timeout(StorageError::timeout(), true)]
    #[case::internal(StorageError::internal("boom"), true)]
    #[case::not_found(StorageError::not_found("x"), false)]
    #[case::invalid_id(StorageError::invalid_id("../x", "path separator"), false)]
    #[case::serialization(StorageError::serialization("bad json"), false)]
    fn test_is_transient(#[case] error: StorageError, #[case] expected: bool) {
        assert_eq!(error.is_transient(), expected);
    }

    #[test]
    fn test_source_chain_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StorageError::connection_with_source("fetch failed", io);

        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "refused");
    }
}
