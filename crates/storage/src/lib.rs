//! Secret storage abstraction for the attestor signing-key lifecycle manager.
//!
//! This crate provides the [`SecretSource`] trait and related types that the
//! signing layer uses to load its key set. The source is opaque and
//! versioned: every read returns the latest version of one secret blob.
//!
//! # Available Sources
//!
//! | Source | Use Case |
//! |--------|----------|
//! | [`MemorySecretSource`] | Testing, development |
//! | [`FileSecretSource`] | Secrets mounted into the filesystem |
//! | [`InstrumentedSecretSource`] | Metrics decorator over any source |
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. [`StorageError::is_transient`]
//! tells callers whether serving cached data is appropriate.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with helpers that
//!   generate real Ed25519 key records and populated sources.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod metrics;
pub mod secret;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

pub use error::{BoxError, StorageError, StorageResult};
pub use metrics::LatencyPercentiles;
pub use secret::{
    FileSecretSource, InstrumentedSecretSource, KeySetBlob, MemorySecretSource, SecretSource,
    SecretSourceErrorKind, SecretSourceMetrics, SecretSourceMetricsSnapshot, StoredKeyRecord,
};
pub use types::{SecretId, SecretValue};
pub use zeroize::Zeroizing;
