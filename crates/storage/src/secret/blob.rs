//! Wire schema of the signing key secret.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    error::{StorageError, StorageResult},
    types::SecretValue,
};

/// One signing key record as stored in the secret blob.
///
/// This is the persisted form only. Decoding the key material and deciding
/// whether the record is usable happens in the signing layer, which owns
/// the private half exclusively.
///
/// # Example
///
/// ```
/// use attestor_storage::StoredKeyRecord;
///
/// let record = StoredKeyRecord::builder()
///     .key_id("sig-1700000000000")
///     .private_key("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_owned())
///     .created_at(1_700_000_000_000)
///     .build();
///
/// assert!(record.public_key.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bon::Builder)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StoredKeyRecord {
    /// Key identifier, `sig-{creationEpochMillis}`.
    #[builder(into)]
    pub key_id: String,

    /// Ed25519 seed (32 bytes, base64url without padding).
    ///
    /// Wrapped in [`Zeroizing`] so the encoded secret is scrubbed on drop.
    #[builder(into)]
    pub private_key: Zeroizing<String>,

    /// Ed25519 public key (32 bytes, base64url without padding).
    ///
    /// Optional: derived from the seed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Creation time in epoch milliseconds.
    ///
    /// Optional: derived from `key_id` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// The full secret blob: every signing key record, read atomically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySetBlob {
    /// All stored key records, in storage order.
    #[serde(default)]
    pub keys: Vec<StoredKeyRecord>,
}

impl KeySetBlob {
    /// Creates a blob from a list of records.
    #[must_use]
    pub fn new(keys: Vec<StoredKeyRecord>) -> Self {
        Self { keys }
    }

    /// Decodes a blob from a secret payload.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the payload is not a valid
    /// key set document.
    pub fn from_json(payload: &str) -> StorageResult<Self> {
        serde_json::from_str(payload)
            .map_err(|e| StorageError::serialization_with_source("invalid key set blob", e))
    }

    /// Encodes the blob as a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if encoding fails.
    pub fn to_json(&self) -> StorageResult<Zeroizing<String>> {
        serde_json::to_string(self)
            .map(Zeroizing::new)
            .map_err(|e| StorageError::serialization_with_source("failed to encode key set blob", e))
    }
}

impl TryFrom<&SecretValue> for KeySetBlob {
    type Error = StorageError;

    fn try_from(value: &SecretValue) -> StorageResult<Self> {
        Self::from_json(&value.payload)
    }
}
