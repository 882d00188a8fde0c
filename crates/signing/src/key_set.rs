//! Parsed, validated key sets.
//!
//! A [`KeySet`] is built from one atomic secret read and never mutated
//! afterwards. Records that cannot be used safely are dropped at parse time
//! with a warning, so everything downstream only sees usable material:
//!
//! - private seed that does not decode to 32 bytes
//! - `publicKey` present but not matching the seed
//! - `createdAt` disagreeing with the timestamp in `keyId`
//! - a repeated `keyId` (the first occurrence wins)
//!
//! A record with a malformed `keyId` is kept so it can be reported, but
//! the registry always classifies it as expired.

use std::collections::HashSet;

use attestor_storage::{KeySetBlob, SecretValue, StoredKeyRecord};
use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose::URL_SAFE_NO_PAD},
};
use ed25519_dalek::{SECRET_KEY_LENGTH, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::{error::Result, policy::parse_key_id};

/// base64url decoder that accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// One usable signing key.
///
/// Private material never leaves this type: there is no accessor for the
/// seed and `Debug` redacts it.
#[derive(Clone)]
pub struct KeyRecord {
    key_id: String,
    created_at: Option<i64>,
    signing_key: SigningKey,
    public_key: String,
}

impl KeyRecord {
    /// Validates a stored record.
    ///
    /// Returns the reason on rejection; the reason never contains key
    /// material.
    fn from_stored(stored: &StoredKeyRecord) -> std::result::Result<Self, &'static str> {
        let seed: Zeroizing<Vec<u8>> = Zeroizing::new(
            URL_SAFE_LENIENT
                .decode(stored.private_key.as_bytes())
                .map_err(|_| "private key is not valid base64url")?,
        );
        let seed: Zeroizing<[u8; SECRET_KEY_LENGTH]> = Zeroizing::new(
            seed.as_slice().try_into().map_err(|_| "private key is not a 32-byte seed")?,
        );
        let signing_key = SigningKey::from_bytes(&seed);
        let public_key = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());

        if let Some(declared) = stored.public_key.as_deref() {
            let declared = URL_SAFE_LENIENT
                .decode(declared.as_bytes())
                .map_err(|_| "public key is not valid base64url")?;
            if declared.as_slice() != signing_key.verifying_key().as_bytes() {
                return Err("public key does not match private key");
            }
        }

        let id_timestamp = parse_key_id(&stored.key_id);
        let created_at = match (id_timestamp, stored.created_at) {
            (Some(from_id), Some(declared)) if from_id != declared => {
                return Err("createdAt does not match keyId");
            },
            (Some(from_id), _) => Some(from_id),
            (None, declared) => declared,
        };

        Ok(Self { key_id: stored.key_id.clone(), created_at, signing_key, public_key })
    }

    /// The key identifier, `sig-{created_at}` when well-formed.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Creation time in epoch milliseconds, if known.
    #[must_use]
    pub fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    /// Whether the key id has the `sig-{epoch_millis}` shape.
    #[must_use]
    pub fn has_valid_key_id(&self) -> bool {
        parse_key_id(&self.key_id).is_some()
    }

    /// Public key, base64url without padding.
    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Verification key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("key_id", &self.key_id)
            .field("created_at", &self.created_at)
            .field("public_key", &self.public_key)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// All usable records from one secret read.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    version_id: String,
    records: Vec<KeyRecord>,
}

impl KeySet {
    /// Parses and validates a secret read.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Configuration`](crate::AttestError::Configuration)
    /// if the payload is not a valid key set document. Individual bad
    /// records are dropped, not reported as errors.
    pub fn from_secret(value: &SecretValue) -> Result<Self> {
        let blob = KeySetBlob::try_from(value)?;
        Ok(Self::from_blob(value.version_id.clone(), &blob))
    }

    /// Validates an already-decoded blob.
    #[must_use]
    pub fn from_blob(version_id: impl Into<String>, blob: &KeySetBlob) -> Self {
        let version_id = version_id.into();
        let mut seen = HashSet::with_capacity(blob.keys.len());
        let mut records = Vec::with_capacity(blob.keys.len());

        for stored in &blob.keys {
            if !seen.insert(stored.key_id.as_str()) {
                tracing::warn!(key_id = %stored.key_id, %version_id, "duplicate key id in key set, ignoring");
                continue;
            }
            match KeyRecord::from_stored(stored) {
                Ok(record) => {
                    if !record.has_valid_key_id() {
                        tracing::warn!(key_id = %stored.key_id, "malformed key id, key will be treated as expired");
                    }
                    records.push(record);
                },
                Err(reason) => {
                    tracing::warn!(key_id = %stored.key_id, %version_id, reason, "dropping unusable key record");
                },
            }
        }

        Self { version_id, records }
    }

    /// Version identifier of the secret read this set came from.
    #[must_use]
    pub fn version_id(&self) -> &str {
        &self.version_id
    }

    /// Usable records, in blob order.
    #[must_use]
    pub fn records(&self) -> &[KeyRecord] {
        &self.records
    }

    /// Looks up a record by key id.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<&KeyRecord> {
        self.records.iter().find(|r| r.key_id == key_id)
    }

    /// Number of usable records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the set holds no usable records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use attestor_storage::testutil::{generate_key_record, key_set_blob};

    use super::*;
    use crate::error::{AttestError, ErrorKind};

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_parses_generated_blob() {
        let blob = key_set_blob(&[T0, T0 + 1]);
        let set = KeySet::from_blob("v1", &blob);

        assert_eq!(set.len(), 2);
        assert_eq!(set.version_id(), "v1");
        let record = set.get("sig-1700000000000").expect("record");
        assert_eq!(record.created_at(), Some(T0));
        assert_eq!(Some(record.public_key()), blob.keys[0].public_key.as_deref());
    }

    #[test]
    fn test_public_key_derived_when_absent() {
        let mut stored = generate_key_record(T0);
        let expected = stored.public_key.take().expect("generated public key");

        let set = KeySet::from_blob("v1", &KeySetBlob::new(vec![stored]));
        assert_eq!(set.records()[0].public_key(), expected);
    }

    #[test]
    fn test_created_at_derived_from_key_id() {
        let mut stored = generate_key_record(T0);
        stored.created_at = None;

        let set = KeySet::from_blob("v1", &KeySetBlob::new(vec![stored]));
        assert_eq!(set.records()[0].created_at(), Some(T0));
    }

    #[test]
    fn test_drops_mismatched_public_key() {
        let mut stored = generate_key_record(T0);
        stored.public_key = generate_key_record(T0).public_key;

        assert!(KeySet::from_blob("v1", &KeySetBlob::new(vec![stored])).is_empty());
    }

    #[test]
    fn test_drops_created_at_mismatch() {
        let mut stored = generate_key_record(T0);
        stored.created_at = Some(T0 + 1);

        assert!(KeySet::from_blob("v1", &KeySetBlob::new(vec![stored])).is_empty());
    }

    #[test]
    fn test_drops_short_seed() {
        let mut stored = generate_key_record(T0);
        stored.private_key = Zeroizing::new(URL_SAFE_NO_PAD.encode([7u8; 16]));

        assert!(KeySet::from_blob("v1", &KeySetBlob::new(vec![stored])).is_empty());
    }

    #[test]
    fn test_accepts_padded_seed() {
        let mut stored = generate_key_record(T0);
        let seed = URL_SAFE_NO_PAD.decode(stored.private_key.as_bytes()).expect("seed");
        stored.private_key = Zeroizing::new(base64::engine::general_purpose::URL_SAFE.encode(seed));

        assert_eq!(KeySet::from_blob("v1", &KeySetBlob::new(vec![stored])).len(), 1);
    }

    #[test]
    fn test_first_duplicate_wins() {
        let first = generate_key_record(T0);
        let second = generate_key_record(T0);
        let expected = first.public_key.clone().expect("public key");

        let set = KeySet::from_blob("v1", &KeySetBlob::new(vec![first, second]));
        assert_eq!(set.len(), 1);
        assert_eq!(set.records()[0].public_key(), expected);
    }

    #[test]
    fn test_keeps_malformed_key_id() {
        let mut stored = generate_key_record(T0);
        stored.key_id = "legacy-key".into();

        let set = KeySet::from_blob("v1", &KeySetBlob::new(vec![stored]));
        assert_eq!(set.len(), 1);
        assert!(!set.records()[0].has_valid_key_id());
        assert_eq!(set.records()[0].created_at(), Some(T0));
    }

    #[test]
    fn test_malformed_document_is_configuration_error() {
        let value = SecretValue::new("v1", "{not json");
        let err = KeySet::from_secret(&value).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert!(matches!(err, AttestError::Configuration { .. }));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let stored = generate_key_record(T0);
        let set = KeySet::from_blob("v1", &KeySetBlob::new(vec![stored.clone()]));

        let debug = format!("{:?}", set.records()[0]);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(stored.private_key.as_str()));
    }
}
