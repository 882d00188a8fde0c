//! Request counters for the attestation service.
//!
//! # Examples
//!
//! ```
//! use attestor_signing::{ErrorKind, ServiceMetrics};
//!
//! let metrics = ServiceMetrics::new();
//! metrics.record_signature();
//! metrics.record_sign_error(ErrorKind::DuplicateRequest);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.signatures_created, 1);
//! assert_eq!(snapshot.duplicate_requests, 1);
//! assert_eq!(snapshot.signature_errors, 0);
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::error::ErrorKind;

/// Snapshot of service counters at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
pub struct ServiceMetricsSnapshot {
    /// Successful sign requests.
    #[builder(default)]
    pub signatures_created: u64,
    /// Failed sign requests, excluding duplicates and malformed input.
    #[builder(default)]
    pub signature_errors: u64,
    /// Sign requests rejected as duplicates.
    #[builder(default)]
    pub duplicate_requests: u64,
    /// Sign requests rejected for missing or invalid input.
    #[builder(default)]
    pub malformed_requests: u64,
    /// Successful list-keys requests.
    #[builder(default)]
    pub public_keys_served: u64,
    /// Failed list-keys requests.
    #[builder(default)]
    pub public_key_errors: u64,
    /// Requests that failed because the secret source was unreachable.
    #[builder(default)]
    pub upstream_errors: u64,
    /// Requests that failed because no valid key was configured.
    #[builder(default)]
    pub configuration_errors: u64,
}

struct ServiceMetricsInner {
    signatures_created: AtomicU64,
    signature_errors: AtomicU64,
    duplicate_requests: AtomicU64,
    malformed_requests: AtomicU64,
    public_keys_served: AtomicU64,
    public_key_errors: AtomicU64,
    upstream_errors: AtomicU64,
    configuration_errors: AtomicU64,
}

/// Lock-free service counters; clones share the same counters.
#[derive(Clone)]
pub struct ServiceMetrics {
    inner: Arc<ServiceMetricsInner>,
}

impl ServiceMetrics {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ServiceMetricsInner {
                signatures_created: AtomicU64::new(0),
                signature_errors: AtomicU64::new(0),
                duplicate_requests: AtomicU64::new(0),
                malformed_requests: AtomicU64::new(0),
                public_keys_served: AtomicU64::new(0),
                public_key_errors: AtomicU64::new(0),
                upstream_errors: AtomicU64::new(0),
                configuration_errors: AtomicU64::new(0),
            }),
        }
    }

    /// Records a successful signature.
    pub fn record_signature(&self) {
        self.inner.signatures_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed sign request.
    pub fn record_sign_error(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::DuplicateRequest => &self.inner.duplicate_requests,
            ErrorKind::MalformedInput => &self.inner.malformed_requests,
            _ => &self.inner.signature_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.record_cause(kind);
    }

    /// Records a successful list-keys request.
    pub fn record_public_keys_served(&self) {
        self.inner.public_keys_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed list-keys request.
    pub fn record_public_key_error(&self, kind: ErrorKind) {
        self.inner.public_key_errors.fetch_add(1, Ordering::Relaxed);
        self.record_cause(kind);
    }

    fn record_cause(&self, kind: ErrorKind) {
        match kind {
            ErrorKind::UpstreamUnavailable => {
                self.inner.upstream_errors.fetch_add(1, Ordering::Relaxed);
            },
            ErrorKind::ConfigurationError => {
                self.inner.configuration_errors.fetch_add(1, Ordering::Relaxed);
            },
            _ => {},
        }
    }

    /// Takes a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        let inner = &self.inner;
        ServiceMetricsSnapshot::builder()
            .signatures_created(inner.signatures_created.load(Ordering::Relaxed))
            .signature_errors(inner.signature_errors.load(Ordering::Relaxed))
            .duplicate_requests(inner.duplicate_requests.load(Ordering::Relaxed))
            .malformed_requests(inner.malformed_requests.load(Ordering::Relaxed))
            .public_keys_served(inner.public_keys_served.load(Ordering::Relaxed))
            .public_key_errors(inner.public_key_errors.load(Ordering::Relaxed))
            .upstream_errors(inner.upstream_errors.load(Ordering::Relaxed))
            .configuration_errors(inner.configuration_errors.load(Ordering::Relaxed))
            .build()
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.signatures_created,
            &inner.signature_errors,
            &inner.duplicate_requests,
            &inner.malformed_requests,
            &inner.public_keys_served,
            &inner.public_key_errors,
            &inner.upstream_errors,
            &inner.configuration_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMetrics").field("snapshot", &self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_errors_by_kind() {
        let metrics = ServiceMetrics::new();
        metrics.record_sign_error(ErrorKind::UpstreamUnavailable);
        metrics.record_sign_error(ErrorKind::ConfigurationError);
        metrics.record_sign_error(ErrorKind::MalformedInput);
        metrics.record_sign_error(ErrorKind::SignatureFailure);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.signature_errors, 3);
        assert_eq!(snapshot.malformed_requests, 1);
        assert_eq!(snapshot.upstream_errors, 1);
        assert_eq!(snapshot.configuration_errors, 1);
    }

    #[test]
    fn test_public_key_counters() {
        let metrics = ServiceMetrics::new();
        metrics.record_public_keys_served();
        metrics.record_public_key_error(ErrorKind::UpstreamUnavailable);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.public_keys_served, 1);
        assert_eq!(snapshot.public_key_errors, 1);
        assert_eq!(snapshot.upstream_errors, 1);
    }

    #[test]
    fn test_reset_and_shared_clones() {
        let metrics = ServiceMetrics::new();
        metrics.clone().record_signature();
        assert_eq!(metrics.snapshot().signatures_created, 1);

        metrics.reset();
        assert_eq!(metrics.snapshot(), ServiceMetricsSnapshot::default());
    }
}
