//! Secret source abstraction for signing key blobs.
//!
//! The signing layer reads its whole key set from one secret, addressed by a
//! fixed identifier, in a single atomic read. This module defines that
//! read-only contract and the blob schema stored behind it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐       ┌──────────────────┐       ┌──────────────┐
//! │ Provisioning │       │  Secret Source   │       │   Signing    │
//! │              │──────►│ (versioned blob, │◄──────│              │
//! │ writes keys  │       │  source of truth)│       │  reads keys  │
//! └──────────────┘       └──────────────────┘       └──────────────┘
//! ```
//!
//! # Blob Schema
//!
//! ```json
//! { "keys": [ { "keyId": "sig-1700000000000", "privateKey": "...",
//!               "publicKey": "...", "createdAt": 1700000000000 } ] }
//! ```
//!
//! # Examples
//!
//! ```
//! use attestor_storage::{KeySetBlob, MemorySecretSource, SecretId, SecretSource};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let source = MemorySecretSource::new();
//! let id = SecretId::new("attestation-signing-keys");
//! source.put_key_set(&id, &KeySetBlob::default()).unwrap();
//!
//! let value = source.fetch_secret(&id).await.unwrap();
//! let blob = KeySetBlob::try_from(&value).unwrap();
//! assert!(blob.keys.is_empty());
//! # });
//! ```

mod blob;
mod file;
mod instrumented;
mod metrics;
mod source;

pub use blob::{KeySetBlob, StoredKeyRecord};
pub use file::FileSecretSource;
pub use instrumented::InstrumentedSecretSource;
pub use metrics::{SecretSourceErrorKind, SecretSourceMetrics, SecretSourceMetricsSnapshot};
pub use source::{MemorySecretSource, SecretSource};
