//! # Attestor Signing
//!
//! Signing-key lifecycle manager for the attestation service.
//!
//! This crate provides:
//! - **Key cache**: single-flight, TTL-bounded cache of the stored key set,
//!   with stale fallback during secret source outages
//! - **Rotation policy**: 90-day rotation, 30-day grace, `sig-{createdAt}`
//!   key ids
//! - **Signer**: Ed25519 signatures with the current key, key id and
//!   signature drawn from one snapshot
//! - **Publisher**: the list of verifiable public keys with cache headers
//! - **Dedup guard**: rejects repeated request bodies within a short window
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use attestor_signing::{AttestationService, AttestorConfig};
//! use attestor_storage::FileSecretSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AttestorConfig::from_json(r#"{"secret_id":"attestation-signing-keys"}"#)?;
//! let service = AttestationService::new(&config, Arc::new(FileSecretSource::new("/run/secrets")));
//! service.warm_up().await;
//!
//! match service.sign(Some(br#"{"order":1}"#), Some("203.0.113.9")).await {
//!     Ok(response) => println!("{}", response.to_json()?),
//!     Err(rejected) => println!("{} {}", rejected.status, rejected.to_json()?),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Attestation envelope and sign response.
pub mod attestation;
/// Service configuration.
pub mod config;
/// Request deduplication.
pub mod dedup;
/// Error types.
pub mod error;
/// Cached key set with single-flight refresh.
pub mod key_cache;
/// Parsed key records.
pub mod key_set;
/// Service counters.
pub mod metrics;
/// Key id format and rotation policy.
pub mod policy;
/// Public key publication.
pub mod publisher;
/// Key status classification.
pub mod registry;
/// Request-level service.
pub mod service;
/// Ed25519 signing.
pub mod signer;
/// Test helpers.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

// Re-export key types for convenience
pub use attestation::{AttestationFlags, Envelope, SignResponse};
pub use config::AttestorConfig;
pub use dedup::{DedupGuard, DuplicateDetector};
pub use error::{AttestError, ConfigError, ErrorKind, Result};
pub use key_cache::{CacheStats, DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT, KeyCache};
pub use key_set::{KeyRecord, KeySet};
pub use metrics::{ServiceMetrics, ServiceMetricsSnapshot};
pub use policy::{RotationPolicy, format_key_id, is_key_expired, parse_key_id};
pub use publisher::{PublicKeyDocument, PublicKeyInfo, PublicKeyPublisher, PublishedKeys};
pub use registry::{KeyRegistry, KeyStatus, RegistrySnapshot};
pub use service::{AttestationService, ErrorResponse};
pub use signer::{SignedPayload, Signer, verify};
