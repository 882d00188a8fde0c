//! Ed25519 signing with the current key.
//!
//! The payload is signed byte-for-byte; the signer never re-encodes it.
//! Signatures are returned as standard base64 with padding.

use std::sync::Arc;

use base64::{
    Engine,
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, Signature, Signer as _, Verifier as _, VerifyingKey};

use crate::{
    error::{AttestError, Result},
    key_set::KeyRecord,
    registry::{KeyRegistry, RegistrySnapshot},
};

/// A signature together with the id of the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// Standard base64 of the 64-byte signature.
    pub signature: String,
    /// Id of the signing key.
    pub key_id: String,
}

/// Signs `payload` with `record`.
///
/// # Errors
///
/// Returns [`AttestError::SignatureFailure`] if the primitive fails.
pub fn sign_with(record: &KeyRecord, payload: &[u8]) -> Result<SignedPayload> {
    let signature: Signature = record
        .signing_key()
        .try_sign(payload)
        .map_err(|e| AttestError::signature_failure(e.to_string()))?;

    Ok(SignedPayload {
        signature: STANDARD.encode(signature.to_bytes()),
        key_id: record.key_id().to_owned(),
    })
}

/// Verifies a signature produced by [`sign_with`].
///
/// `public_key` is base64url without padding, as published; `signature` is
/// standard base64. Any decoding problem counts as a failed verification.
#[must_use]
pub fn verify(public_key: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(key_bytes) = URL_SAFE_NO_PAD.decode(public_key.as_bytes()) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = STANDARD.decode(signature.as_bytes()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&sig_bytes) else {
        return false;
    };
    verifying_key.verify(payload, &signature).is_ok()
}

/// Signs payloads with the registry's current key.
#[derive(Debug, Clone)]
pub struct Signer {
    registry: Arc<KeyRegistry>,
}

impl Signer {
    /// Creates a signer over `registry`.
    #[must_use]
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self { registry }
    }

    /// Signs `payload` with the current key.
    ///
    /// Signature and key id come from the same snapshot.
    ///
    /// # Errors
    ///
    /// - Key cache errors ([`AttestError::UpstreamUnavailable`],
    ///   [`AttestError::Configuration`])
    /// - [`AttestError::Configuration`] if no key is currently valid
    /// - [`AttestError::SignatureFailure`] if the primitive fails
    #[tracing::instrument(skip(self, payload), fields(payload_len = payload.len()))]
    pub async fn sign(&self, payload: &[u8]) -> Result<SignedPayload> {
        let snapshot = self.registry.snapshot().await?;
        Self::sign_in(&snapshot, payload)
    }

    /// Signs `payload` with the current key of an existing snapshot.
    ///
    /// # Errors
    ///
    /// As [`sign`](Self::sign), minus key cache errors.
    pub fn sign_in(snapshot: &RegistrySnapshot, payload: &[u8]) -> Result<SignedPayload> {
        let current = snapshot.current_key()?;
        let signed = sign_with(current, payload)?;
        tracing::debug!(key_id = %signed.key_id, "payload signed");
        Ok(signed)
    }

    /// The backing registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }
}
