//! Common types shared by secret sources and their consumers.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};

/// Fixed identifier addressing one secret in a [`SecretSource`](crate::SecretSource).
///
/// The key set for a deployment lives under a single identifier (for
/// example `"attestation-signing-keys"`), and every read fetches the whole
/// blob stored there.
///
/// # Examples
///
/// ```
/// use attestor_storage::SecretId;
///
/// let id = SecretId::new("attestation-signing-keys");
/// assert_eq!(id.as_str(), "attestation-signing-keys");
/// assert_eq!(id.to_string(), "attestation-signing-keys");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretId(String);

impl SecretId {
    /// Creates a new secret identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that the identifier names a single secret.
    ///
    /// Identifiers must be non-empty, must not start with `.` and must not
    /// contain path separators or control characters.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidId`] describing the first violation.
    pub fn validate(&self) -> StorageResult<()> {
        let id = self.as_str();
        let reason = if id.is_empty() {
            "cannot be empty"
        } else if id.starts_with('.') {
            "cannot start with '.'"
        } else if id.contains(['/', '\\']) {
            "cannot contain a path separator"
        } else if id.chars().any(char::is_control) {
            "cannot contain control characters"
        } else {
            return Ok(());
        };
        Err(StorageError::invalid_id(id, reason))
    }
}

impl From<&str> for SecretId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One atomic read of a secret: the raw payload plus the version it came from.
///
/// The payload is wrapped in [`Zeroizing`] because it carries private key
/// material; it is scrubbed from memory when the value is dropped.
#[derive(Clone)]
pub struct SecretValue {
    /// Opaque version identifier assigned by the source.
    pub version_id: String,
    /// Raw secret payload (UTF-8 JSON for key sets).
    pub payload: Zeroizing<String>,
}

impl SecretValue {
    /// Creates a new secret value.
    #[must_use]
    pub fn new(version_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { version_id: version_id.into(), payload: Zeroizing::new(payload.into()) }
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValue")
            .field("version_id", &self.version_id)
            .field("payload", &format_args!("[REDACTED; {} bytes]", self.payload.len()))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_secret_id_serde_transparent() {
        let id = SecretId::new("keys");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"keys\"");

        let back: SecretId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[rstest]
    #[case::plain("attestation-signing-keys")]
    #[case::dotted_inside("keys.v2")]
    fn test_secret_id_validate_accepts(#[case] id: &str) {
        assert!(SecretId::new(id).validate().is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::traversal("../keys")]
    #[case::hidden(".keys")]
    #[case::slash("prod/keys")]
    #[case::backslash("a\\b")]
    #[case::control("keys\n")]
    fn test_secret_id_validate_rejects(#[case] id: &str) {
        let err = SecretId::new(id).validate().unwrap_err();
        assert!(matches!(err, StorageError::InvalidId { ref secret_id, .. } if secret_id == id));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_secret_value_debug_redacts_payload() {
        let value = SecretValue::new("v1", r#"{"keys":[{"privateKey":"c2VjcmV0"}]}"#);
        let debug = format!("{value:?}");

        assert!(debug.contains("v1"));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("c2VjcmV0"));
    }
}
