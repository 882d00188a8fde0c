//! Attestation envelope.
//!
//! The signed `target` is built as follows:
//!
//! 1. 32 random bytes, hex-encoded, as the nonce
//! 2. `ipAddressHash = hex(sha256(nonce || origin))`, so the origin is
//!    never stored or returned in the clear
//! 3. JSON envelope `{over_18, over_21, nonce, ipAddressHash, payload,
//!    timestamp}` in that field order, with the caller's body carried as an
//!    opaque string
//! 4. standard base64 of the JSON bytes
//!
//! The base64 string is what gets signed, byte-for-byte.

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AttestError, Result};

/// Nonce length in bytes (hex-encoded to twice this many characters).
pub const NONCE_LEN: usize = 32;

/// Attestation claims carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationFlags {
    /// Caller attested to be over 18.
    pub over_18: bool,
    /// Caller attested to be over 21.
    pub over_21: bool,
}

impl Default for AttestationFlags {
    fn default() -> Self {
        Self { over_18: true, over_21: true }
    }
}

/// The signed envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Over-18 claim.
    pub over_18: bool,
    /// Over-21 claim.
    pub over_21: bool,
    /// 64 lowercase hex characters.
    pub nonce: String,
    /// `hex(sha256(nonce || origin))`.
    #[serde(rename = "ipAddressHash")]
    pub ip_address_hash: String,
    /// The caller's body, untouched.
    pub payload: String,
    /// Capture time in epoch milliseconds.
    pub timestamp: i64,
}

impl Envelope {
    /// Builds an envelope with a fresh nonce.
    #[must_use]
    pub fn new(flags: AttestationFlags, payload: impl Into<String>, origin: &str, timestamp_ms: i64) -> Self {
        let nonce = generate_nonce();
        let ip_address_hash = hash_origin(&nonce, origin);
        Self {
            over_18: flags.over_18,
            over_21: flags.over_21,
            nonce,
            ip_address_hash,
            payload: payload.into(),
            timestamp: timestamp_ms,
        }
    }

    /// Encodes the envelope into the `target` string that gets signed.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::SignatureFailure`] if JSON encoding fails.
    pub fn to_target(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| AttestError::signature_failure(format!("envelope encoding: {e}")))?;
        Ok(STANDARD.encode(json))
    }

    /// Decodes a `target` back into its envelope.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::MalformedInput`] if the target is not base64
    /// of an envelope document.
    pub fn from_target(target: &str) -> Result<Self> {
        let json = STANDARD
            .decode(target.as_bytes())
            .map_err(|e| AttestError::malformed_input(format!("target is not base64: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| AttestError::malformed_input(format!("target is not an envelope: {e}")))
    }

    /// Whether `origin` is the one hashed into this envelope.
    #[must_use]
    pub fn matches_origin(&self, origin: &str) -> bool {
        hash_origin(&self.nonce, origin) == self.ip_address_hash
    }
}

/// Returns [`NONCE_LEN`] random bytes from the OS RNG as lowercase hex.
#[must_use]
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `hex(sha256(nonce || origin))`.
#[must_use]
pub fn hash_origin(nonce: &str, origin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(origin.as_bytes());
    hex::encode(hasher.finalize())
}

/// Successful sign response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// Base64 envelope that was signed.
    pub target: String,
    /// Standard base64 Ed25519 signature over `target`.
    pub signature: String,
    /// Id of the key that produced `signature`.
    pub key_id: String,
}

impl SignResponse {
    /// JSON body.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if encoding fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
