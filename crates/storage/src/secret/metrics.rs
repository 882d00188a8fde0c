//! Metrics collection for secret source reads.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use attestor_storage::{SecretSourceErrorKind, SecretSourceMetrics};
//!
//! let metrics = SecretSourceMetrics::new();
//!
//! metrics.record_fetch(Duration::from_micros(150));
//! metrics.record_error(SecretSourceErrorKind::Timeout);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.fetch_count, 1);
//! assert_eq!(snapshot.fetch_percentiles.p50, 150);
//! assert_eq!(snapshot.error_timeout, 1);
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    error::StorageError,
    metrics::{DEFAULT_HISTOGRAM_WINDOW_SIZE, LatencyHistogram, LatencyPercentiles},
};

/// Error categories for secret source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSourceErrorKind {
    /// Secret not found.
    NotFound,
    /// Connection or I/O error.
    Connection,
    /// Payload could not be decoded.
    Serialization,
    /// Read exceeded its time limit.
    Timeout,
    /// Other/unknown error.
    Other,
}

impl From<&StorageError> for SecretSourceErrorKind {
    fn from(error: &StorageError) -> Self {
        match error {
            StorageError::NotFound { .. } => Self::NotFound,
            StorageError::Connection { .. } => Self::Connection,
            StorageError::Serialization { .. } => Self::Serialization,
            StorageError::Timeout => Self::Timeout,
            _ => Self::Other,
        }
    }
}

/// Snapshot of secret source metrics at a point in time.
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct SecretSourceMetricsSnapshot {
    /// Total fetch operations, successful or not.
    #[builder(default)]
    pub fetch_count: u64,
    /// Cumulative fetch latency in microseconds.
    #[builder(default)]
    pub fetch_latency_us: u64,
    /// Fetch latency percentiles in microseconds.
    #[builder(default)]
    pub fetch_percentiles: LatencyPercentiles,

    /// Not found errors.
    #[builder(default)]
    pub error_not_found: u64,
    /// Connection errors.
    #[builder(default)]
    pub error_connection: u64,
    /// Serialization errors.
    #[builder(default)]
    pub error_serialization: u64,
    /// Timeout errors.
    #[builder(default)]
    pub error_timeout: u64,
    /// Other errors.
    #[builder(default)]
    pub error_other: u64,
}

impl SecretSourceMetricsSnapshot {
    /// Returns the total number of errors.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.error_not_found
            + self.error_connection
            + self.error_serialization
            + self.error_timeout
            + self.error_other
    }

    /// Returns the error rate as a fraction (0.0 to 1.0).
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.fetch_count == 0 { 0.0 } else { self.total_errors() as f64 / self.fetch_count as f64 }
    }

    /// Returns the average fetch latency in microseconds.
    #[must_use]
    pub fn avg_fetch_latency_us(&self) -> f64 {
        if self.fetch_count == 0 {
            0.0
        } else {
            self.fetch_latency_us as f64 / self.fetch_count as f64
        }
    }
}

struct SecretSourceMetricsInner {
    fetch_count: AtomicU64,
    fetch_latency_us: AtomicU64,
    fetch_histogram: LatencyHistogram,
    error_not_found: AtomicU64,
    error_connection: AtomicU64,
    error_serialization: AtomicU64,
    error_timeout: AtomicU64,
    error_other: AtomicU64,
}

/// Metrics collector for secret source reads.
///
/// Lock-free atomic counters; clones share the same counters.
#[derive(Clone)]
pub struct SecretSourceMetrics {
    inner: Arc<SecretSourceMetricsInner>,
}

impl SecretSourceMetrics {
    /// Creates a new metrics collector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SecretSourceMetricsInner {
                fetch_count: AtomicU64::new(0),
                fetch_latency_us: AtomicU64::new(0),
                fetch_histogram: LatencyHistogram::new(DEFAULT_HISTOGRAM_WINDOW_SIZE),
                error_not_found: AtomicU64::new(0),
                error_connection: AtomicU64::new(0),
                error_serialization: AtomicU64::new(0),
                error_timeout: AtomicU64::new(0),
                error_other: AtomicU64::new(0),
            }),
        }
    }

    /// Records a fetch operation.
    pub fn record_fetch(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.inner.fetch_count.fetch_add(1, Ordering::Relaxed);
        self.inner.fetch_latency_us.fetch_add(us, Ordering::Relaxed);
        self.inner.fetch_histogram.record(us);
    }

    /// Records an error by category.
    pub fn record_error(&self, kind: SecretSourceErrorKind) {
        let counter = match kind {
            SecretSourceErrorKind::NotFound => &self.inner.error_not_found,
            SecretSourceErrorKind::Connection => &self.inner.error_connection,
            SecretSourceErrorKind::Serialization => &self.inner.error_serialization,
            SecretSourceErrorKind::Timeout => &self.inner.error_timeout,
            SecretSourceErrorKind::Other => &self.inner.error_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a snapshot of all counters, computing percentiles.
    #[must_use]
    pub fn snapshot(&self) -> SecretSourceMetricsSnapshot {
        let inner = &self.inner;
        SecretSourceMetricsSnapshot::builder()
            .fetch_count(inner.fetch_count.load(Ordering::Relaxed))
            .fetch_latency_us(inner.fetch_latency_us.load(Ordering::Relaxed))
            .fetch_percentiles(inner.fetch_histogram.percentiles())
            .error_not_found(inner.error_not_found.load(Ordering::Relaxed))
            .error_connection(inner.error_connection.load(Ordering::Relaxed))
            .error_serialization(inner.error_serialization.load(Ordering::Relaxed))
            .error_timeout(inner.error_timeout.load(Ordering::Relaxed))
            .error_other(inner.error_other.load(Ordering::Relaxed))
            .build()
    }

    /// Resets all counters and histograms to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.fetch_count,
            &inner.fetch_latency_us,
            &inner.error_not_found,
            &inner.error_connection,
            &inner.error_serialization,
            &inner.error_timeout,
            &inner.error_other,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        inner.fetch_histogram.reset();
    }
}

impl Default for SecretSourceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecretSourceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSourceMetrics").field("snapshot", &self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_from_storage_error() {
        assert_eq!(
            SecretSourceErrorKind::from(&StorageError::not_found("x")),
            SecretSourceErrorKind::NotFound
        );
        assert_eq!(
            SecretSourceErrorKind::from(&StorageError::timeout()),
            SecretSourceErrorKind::Timeout
        );
        assert_eq!(
            SecretSourceErrorKind::from(&StorageError::internal("x")),
            SecretSourceErrorKind::Other
        );
    }

    #[test]
    fn test_error_rate() {
        let metrics = SecretSourceMetrics::new();
        for _ in 0..4 {
            metrics.record_fetch(Duration::from_micros(10));
        }
        metrics.record_error(SecretSourceErrorKind::Connection);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_errors(), 1);
        assert!((snapshot.error_rate() - 0.25).abs() < f64::EPSILON);
        assert!((snapshot.avg_fetch_latency_us() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = SecretSourceMetrics::new();
        metrics.record_fetch(Duration::from_millis(1));
        metrics.record_error(SecretSourceErrorKind::Other);

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.fetch_count, 0);
        assert_eq!(snapshot.total_errors(), 0);
        assert_eq!(snapshot.fetch_percentiles, LatencyPercentiles::default());
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = SecretSourceMetrics::new();
        let clone = metrics.clone();
        clone.record_fetch(Duration::from_micros(1));
        assert_eq!(metrics.snapshot().fetch_count, 1);
    }
}
