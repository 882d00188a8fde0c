//! Attestation error types.
//!
//! [`AttestError`] carries enough detail for logging; [`ErrorKind`] is the
//! coarse classification the request boundary maps to a status code and a
//! fixed client message. Internal details never reach the client.

use attestor_storage::StorageError;
use thiserror::Error;

/// Errors raised by the signing-key lifecycle manager.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum AttestError {
    /// The secret source could not be reached and no usable cached key set
    /// was available.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(
        /// The transient storage error that caused the failure.
        #[source]
        StorageError,
    ),

    /// No valid signing key could be resolved from the stored key set.
    ///
    /// Not retryable: an operator has to fix the secret.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
        /// The storage error behind the problem, if any.
        #[source]
        source: Option<StorageError>,
    },

    /// The request was missing its body or origin, or the body was not text.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The same request body was already seen within the dedup window.
    #[error("Duplicate request (seen {hits} times)")]
    DuplicateRequest {
        /// Number of duplicate sightings so far, excluding the first.
        hits: u64,
    },

    /// Producing the signature failed.
    #[error("Signature failure: {0}")]
    SignatureFailure(String),
}

impl AttestError {
    /// Creates an `UpstreamUnavailable` error.
    #[must_use]
    pub fn upstream_unavailable(source: StorageError) -> Self {
        Self::UpstreamUnavailable(source)
    }

    /// Creates a `Configuration` error with no storage source.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), source: None }
    }

    /// Creates a `Configuration` error caused by a definitive storage answer.
    #[must_use]
    pub fn configuration_with_source(message: impl Into<String>, source: StorageError) -> Self {
        Self::Configuration { message: message.into(), source: Some(source) }
    }

    /// Creates a `MalformedInput` error.
    #[must_use]
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::MalformedInput(message.into())
    }

    /// Creates a `DuplicateRequest` error.
    #[must_use]
    pub fn duplicate_request(hits: u64) -> Self {
        Self::DuplicateRequest { hits }
    }

    /// Creates a `SignatureFailure` error.
    #[must_use]
    pub fn signature_failure(message: impl Into<String>) -> Self {
        Self::SignatureFailure(message.into())
    }

    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::Configuration { .. } => ErrorKind::ConfigurationError,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::DuplicateRequest { .. } => ErrorKind::DuplicateRequest,
            Self::SignatureFailure(_) => ErrorKind::SignatureFailure,
        }
    }

    /// Returns `true` if retrying later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

impl From<StorageError> for AttestError {
    /// Transient failures become `UpstreamUnavailable`; definitive answers
    /// (missing secret, undecodable blob) are configuration problems.
    fn from(err: StorageError) -> Self {
        if err.is_transient() {
            Self::UpstreamUnavailable(err)
        } else {
            let message = match &err {
                StorageError::NotFound { .. } => "signing key secret not found",
                StorageError::InvalidId { .. } => "signing key secret identifier is invalid",
                StorageError::Serialization { .. } => "signing key secret is malformed",
                _ => "signing key secret unusable",
            };
            Self::configuration_with_source(message, err)
        }
    }
}

/// Error classification exposed at the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Secret source unreachable; retryable.
    UpstreamUnavailable,
    /// No valid current key; fatal.
    ConfigurationError,
    /// Missing or invalid request input.
    MalformedInput,
    /// Rejected by the deduplication guard.
    DuplicateRequest,
    /// Signing primitive failed.
    SignatureFailure,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    #[must_use]
    pub fn status_code(self) -> u16 {
        match self {
            Self::UpstreamUnavailable => 503,
            Self::ConfigurationError | Self::SignatureFailure => 500,
            Self::MalformedInput => 400,
            Self::DuplicateRequest => 429,
        }
    }

    /// Generic message safe to return to clients.
    #[must_use]
    pub fn client_message(self) -> &'static str {
        match self {
            Self::UpstreamUnavailable => "Service temporarily unavailable",
            Self::ConfigurationError | Self::SignatureFailure => "Internal Server Error",
            Self::MalformedInput => "Bad Request",
            Self::DuplicateRequest => "Duplicate request detected",
        }
    }

    /// Stable snake_case name for log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::ConfigurationError => "configuration_error",
            Self::MalformedInput => "malformed_input",
            Self::DuplicateRequest => "duplicate_request",
            Self::SignatureFailure => "signature_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A field failed validation.
    #[error("Invalid configuration for `{field}`: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("Configuration parse error: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Creates an `Invalid` error for `field`.
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Result type alias for attestation operations.
pub type Result<T> = std::result::Result<T, AttestError>;
