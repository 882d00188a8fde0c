//! Shared test utilities for secret source testing.
//!
//! Generates real Ed25519 key records in the stored blob format and
//! pre-populated sources. Feature-gated behind `testutil` to keep it out of
//! production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! attestor-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```ignore
//! // Requires the `testutil` feature to be enabled.
//! use attestor_storage::testutil::{generate_key_record, populated_source};
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey;
use rand_core::OsRng;
use zeroize::Zeroizing;

use crate::{
    secret::{KeySetBlob, MemorySecretSource, StoredKeyRecord},
    types::SecretId,
};

/// Secret identifier used by test fixtures.
pub const TEST_SECRET_ID: &str = "attestation-signing-keys";

/// Milliseconds in one day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Formats the key id for a creation timestamp.
#[must_use]
pub fn key_id_for(created_at_ms: i64) -> String {
    format!("sig-{created_at_ms}")
}

/// Generates a fresh key record created at `created_at_ms`.
///
/// Both the seed and the public key are populated, base64url without
/// padding, and `createdAt` matches the key id.
#[must_use]
pub fn generate_key_record(created_at_ms: i64) -> StoredKeyRecord {
    let signing_key = SigningKey::generate(&mut OsRng);
    let seed: Zeroizing<[u8; 32]> = Zeroizing::new(signing_key.to_bytes());

    StoredKeyRecord::builder()
        .key_id(key_id_for(created_at_ms))
        .private_key(URL_SAFE_NO_PAD.encode(seed.as_slice()))
        .public_key(URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes()))
        .created_at(created_at_ms)
        .build()
}

/// Builds a blob with one freshly generated record per timestamp.
#[must_use]
pub fn key_set_blob(created_at_ms: &[i64]) -> KeySetBlob {
    KeySetBlob::new(created_at_ms.iter().copied().map(generate_key_record).collect())
}

/// Creates a [`MemorySecretSource`] holding one version of a generated key
/// set under [`TEST_SECRET_ID`].
///
/// # Panics
///
/// Panics if the blob cannot be encoded (should not happen).
#[must_use]
pub fn populated_source(created_at_ms: &[i64]) -> (MemorySecretSource, SecretId, KeySetBlob) {
    let source = MemorySecretSource::new();
    let id = SecretId::new(TEST_SECRET_ID);
    let blob = key_set_blob(created_at_ms);
    source.put_key_set(&id, &blob).expect("encode generated key set");
    (source, id, blob)
}
