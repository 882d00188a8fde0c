//! Read-only access to versioned secrets.
//!
//! This module provides the [`SecretSource`] trait that abstracts the
//! opaque, versioned store holding the signing key blob. The signing layer
//! only ever reads from it; writing and rotating secrets is the job of
//! provisioning tooling.
//!
//! # Usage
//!
//! ```no_run
//! use attestor_storage::{SecretId, SecretSource, StorageError, SecretValue};
//!
//! async fn load<S: SecretSource>(source: &S) -> Result<SecretValue, StorageError> {
//!     source.fetch_secret(&SecretId::new("attestation-signing-keys")).await
//! }
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    error::{StorageError, StorageResult},
    secret::blob::KeySetBlob,
    types::{SecretId, SecretValue},
};

/// Versioned store holding signing key blobs.
///
/// Each call returns the latest version of the secret in one atomic read.
/// Implementations must not return partially written payloads.
///
/// # Error Handling
///
/// - [`StorageError::NotFound`] when no secret exists under the identifier
/// - [`StorageError::Connection`] / [`StorageError::Timeout`] when the
///   store cannot be reached
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetches the latest version of a secret.
    ///
    /// # Arguments
    ///
    /// * `secret_id` - The fixed identifier of the secret
    ///
    /// # Errors
    ///
    /// Returns an error if the secret doesn't exist or the store is unavailable.
    async fn fetch_secret(&self, secret_id: &SecretId) -> StorageResult<SecretValue>;
}

#[async_trait]
impl<S: SecretSource + ?Sized> SecretSource for Arc<S> {
    async fn fetch_secret(&self, secret_id: &SecretId) -> StorageResult<SecretValue> {
        (**self).fetch_secret(secret_id).await
    }
}

/// In-memory implementation of [`SecretSource`] for tests and development.
///
/// Every [`put_secret`](Self::put_secret) appends a new version; reads
/// return the most recent one. The store can also be told to fail or to
/// respond slowly, which is how cache fallback and timeout behavior is
/// exercised.
///
/// # Thread Safety
///
/// Uses [`parking_lot::RwLock`] for concurrent access. Clones share state.
///
/// # Examples
///
/// ```
/// use attestor_storage::{MemorySecretSource, SecretId, SecretSource};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let source = MemorySecretSource::new();
/// let id = SecretId::new("keys");
///
/// source.put_secret(&id, r#"{"keys":[]}"#);
/// let value = source.fetch_secret(&id).await.unwrap();
///
/// assert_eq!(value.version_id, "v1");
/// assert_eq!(source.fetch_count(), 1);
/// # });
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemorySecretSource {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// All versions per secret, oldest first.
    versions: RwLock<HashMap<SecretId, Vec<SecretValue>>>,
    /// Failure returned by every fetch while set.
    failure: RwLock<Option<StorageError>>,
    /// Artificial delay applied before every fetch.
    latency: RwLock<Option<Duration>>,
    /// Number of fetch calls observed, successful or not.
    fetches: AtomicU64,
}

impl MemorySecretSource {
    /// Creates a new empty in-memory source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new version of a secret and returns its version id.
    pub fn put_secret(&self, secret_id: &SecretId, payload: impl Into<String>) -> String {
        let mut versions = self.inner.versions.write();
        let history = versions.entry(secret_id.clone()).or_default();
        let version_id = format!("v{}", history.len() + 1);
        history.push(SecretValue::new(version_id.clone(), payload));
        version_id
    }

    /// Encodes and stores a key set blob as a new version.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the blob cannot be encoded.
    pub fn put_key_set(&self, secret_id: &SecretId, blob: &KeySetBlob) -> StorageResult<String> {
        let payload = blob.to_json()?;
        Ok(self.put_secret(secret_id, payload.as_str()))
    }

    /// Makes every subsequent fetch fail with `error` (or succeed again with `None`).
    pub fn set_failure(&self, error: Option<StorageError>) {
        *self.inner.failure.write() = error;
    }

    /// Delays every subsequent fetch by `latency` (or removes the delay with `None`).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.write() = latency;
    }

    /// Returns the number of fetches served so far, including failed ones.
    #[must_use]
    pub fn fetch_count(&self) -> u64 {
        self.inner.fetches.load(Ordering::Relaxed)
    }

    /// Returns the number of stored versions for a secret.
    #[must_use]
    pub fn version_count(&self, secret_id: &SecretId) -> usize {
        self.inner.versions.read().get(secret_id).map_or(0, Vec::len)
    }
}

#[async_trait]
impl SecretSource for MemorySecretSource {
    #[tracing::instrument(skip(self), fields(secret_id = %secret_id))]
    async fn fetch_secret(&self, secret_id: &SecretId) -> StorageResult<SecretValue> {
        self.inner.fetches.fetch_add(1, Ordering::Relaxed);

        let latency = *self.inner.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.inner.failure.read().clone() {
            return Err(error);
        }

        self.inner
            .versions
            .read()
            .get(secret_id)
            .and_then(|history| history.last().cloned())
            .ok_or_else(|| StorageError::not_found(secret_id.as_str()))
    }
}
