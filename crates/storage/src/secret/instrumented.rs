//! Metrics-recording decorator for [`SecretSource`] implementations.

use std::time::Instant;

use async_trait::async_trait;

use super::{
    metrics::{SecretSourceErrorKind, SecretSourceMetrics},
    source::SecretSource,
};
use crate::{
    error::StorageResult,
    types::{SecretId, SecretValue},
};

/// Decorator that records fetch counts, latency and error kinds for any
/// [`SecretSource`], without modifying the underlying source.
///
/// # Usage
///
/// ```
/// use attestor_storage::{InstrumentedSecretSource, MemorySecretSource, SecretSourceMetrics};
///
/// let metrics = SecretSourceMetrics::new();
/// let source = InstrumentedSecretSource::new(MemorySecretSource::new(), metrics.clone());
/// assert_eq!(metrics.snapshot().fetch_count, 0);
/// ```
pub struct InstrumentedSecretSource<S> {
    inner: S,
    metrics: SecretSourceMetrics,
}

impl<S: SecretSource> InstrumentedSecretSource<S> {
    /// Wraps `inner`, recording into `metrics`.
    pub fn new(inner: S, metrics: SecretSourceMetrics) -> Self {
        Self { inner, metrics }
    }

    /// Returns a reference to the inner source.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns the metrics collector.
    pub fn metrics(&self) -> &SecretSourceMetrics {
        &self.metrics
    }
}

#[async_trait]
impl<S: SecretSource> SecretSource for InstrumentedSecretSource<S> {
    async fn fetch_secret(&self, secret_id: &SecretId) -> StorageResult<SecretValue> {
        let start = Instant::now();
        let result = self.inner.fetch_secret(secret_id).await;
        self.metrics.record_fetch(start.elapsed());

        if let Err(ref error) = result {
            self.metrics.record_error(SecretSourceErrorKind::from(error));
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{error::StorageError, secret::source::MemorySecretSource};

    #[tokio::test]
    async fn test_records_success_and_failure() {
        let memory = MemorySecretSource::new();
        let id = SecretId::new("keys");
        memory.put_secret(&id, "{}");

        let metrics = SecretSourceMetrics::new();
        let source = InstrumentedSecretSource::new(memory.clone(), metrics.clone());

        source.fetch_secret(&id).await.expect("first fetch");
        memory.set_failure(Some(StorageError::timeout()));
        let _ = source.fetch_secret(&id).await;
        let _ = source.fetch_secret(&SecretId::new("other")).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetch_count, 3);
        assert_eq!(snapshot.error_timeout, 2);
        assert_eq!(snapshot.error_not_found, 0, "injected failure applies to every id");
    }

    #[tokio::test]
    async fn test_not_found_is_categorized() {
        let metrics = SecretSourceMetrics::new();
        let source = InstrumentedSecretSource::new(MemorySecretSource::new(), metrics.clone());

        let _ = source.fetch_secret(&SecretId::new("missing")).await;

        assert_eq!(metrics.snapshot().error_not_found, 1);
        assert_eq!(source.inner().fetch_count(), 1);
    }
}
