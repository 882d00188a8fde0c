//! Shared test utilities for the signing layer.
//!
//! Builds services and caches over generated key sets, with creation times
//! relative to the wall clock. Feature-gated behind `testutil`.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! attestor-signing = { path = "../signing", features = ["testutil"] }
//! ```
//!
//! ```ignore
//! // Requires the `testutil` feature to be enabled.
//! use attestor_signing::testutil::{days_ago, service_with_keys};
//! ```

use std::sync::Arc;

pub use attestor_storage::testutil::{DAY_MS, TEST_SECRET_ID, key_id_for, key_set_blob, populated_source};
use attestor_storage::{KeySetBlob, MemorySecretSource};
use chrono::Utc;

use crate::{config::AttestorConfig, service::AttestationService};

/// Epoch milliseconds `days` days before now.
#[must_use]
pub fn days_ago(days: i64) -> i64 {
    Utc::now().timestamp_millis() - days * DAY_MS
}

/// Default configuration over [`TEST_SECRET_ID`].
///
/// # Panics
///
/// Never in practice: the defaults are valid.
#[must_use]
pub fn test_config() -> AttestorConfig {
    AttestorConfig::builder().secret_id(TEST_SECRET_ID).build().expect("default config is valid")
}

/// A service over a source holding keys created `ages_days` days ago.
///
/// Returns the source too, for fetch counting and fault injection.
#[must_use]
pub fn service_with_keys(ages_days: &[i64]) -> (AttestationService, MemorySecretSource, KeySetBlob) {
    let created: Vec<i64> = ages_days.iter().copied().map(days_ago).collect();
    let (source, _, blob) = populated_source(&created);
    let service = AttestationService::new(&test_config(), Arc::new(source.clone()));
    (service, source, blob)
}

