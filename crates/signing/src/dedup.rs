//! Request deduplication.
//!
//! Rejects a sign request whose body was already seen within a short
//! window, protecting the signing path from replays and floods.
//!
//! The fingerprint is the first `fingerprint_len` bytes of the body. That
//! is an approximation: two bodies sharing a long prefix collide. It is
//! cheap and needs no hashing, and the window is short.
//!
//! # Design
//!
//! - **Sliding expiry**: each fingerprint lives `window` from its latest
//!   sighting. Every duplicate restarts the window, so a body re-sent more
//!   often than once per `window` is never let through.
//! - **Capacity-bounded**: at most `max_entries` fingerprints, evicting the
//!   least recently used.
//! - **Abuse signal**: every `report_every`-th duplicate of a fingerprint
//!   emits a warning. The rejection itself is unchanged.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use moka::{future::Cache, policy::EvictionPolicy};

use crate::error::{AttestError, Result};

/// Default dedup window (30 seconds).
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(30);

/// Default maximum tracked fingerprints.
pub const DEFAULT_DEDUP_MAX_ENTRIES: u64 = 1_000;

/// Default fingerprint length in bytes.
pub const DEFAULT_FINGERPRINT_LEN: usize = 256;

/// Default interval between abuse reports, in duplicates.
pub const DEFAULT_REPORT_EVERY: u64 = 10;

/// Bytes of the fingerprint included in abuse reports.
const REPORT_PREFIX_LEN: usize = 50;

/// Duplicate request detection.
#[async_trait]
pub trait DuplicateDetector: Send + Sync {
    /// Records `body` and rejects it if it was already seen in the window.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::DuplicateRequest`] for a duplicate.
    async fn check(&self, body: &[u8]) -> Result<()>;

    /// Forgets every fingerprint.
    async fn clear(&self);
}

/// In-memory deduplication guard backed by a [`moka::future::Cache`].
///
/// Safe under concurrent first arrivals: of several identical bodies
/// arriving together, exactly one is allowed.
pub struct DedupGuard {
    /// Fingerprint → duplicate hit counter.
    seen: Cache<Vec<u8>, Arc<AtomicU64>>,
    fingerprint_len: usize,
    report_every: u64,
}

#[bon::bon]
impl DedupGuard {
    /// Creates a guard.
    ///
    /// ```
    /// use std::time::Duration;
    /// use attestor_signing::DedupGuard;
    ///
    /// let guard = DedupGuard::builder().window(Duration::from_secs(30)).max_entries(1_000).build();
    /// ```
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_DEDUP_WINDOW)] window: Duration,
        #[builder(default = DEFAULT_DEDUP_MAX_ENTRIES)] max_entries: u64,
        #[builder(default = DEFAULT_FINGERPRINT_LEN)] fingerprint_len: usize,
        #[builder(default = DEFAULT_REPORT_EVERY)] report_every: u64,
    ) -> Self {
        let seen = Cache::builder()
            .max_capacity(max_entries)
            .eviction_policy(EvictionPolicy::lru())
            .time_to_live(window)
            .build();
        Self { seen, fingerprint_len: fingerprint_len.max(1), report_every: report_every.max(1) }
    }
}

impl DedupGuard {
    /// The fingerprint of `body`: its first `fingerprint_len` bytes.
    #[must_use]
    pub fn fingerprint<'a>(&self, body: &'a [u8]) -> &'a [u8] {
        &body[..body.len().min(self.fingerprint_len)]
    }

    /// Approximate number of tracked fingerprints.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.seen.entry_count()
    }

    /// Processes pending evictions and expirations.
    pub async fn run_pending_tasks(&self) {
        self.seen.run_pending_tasks().await;
    }
}

#[async_trait]
impl DuplicateDetector for DedupGuard {
    async fn check(&self, body: &[u8]) -> Result<()> {
        let fingerprint = self.fingerprint(body);
        let entry = self
            .seen
            .entry(fingerprint.to_vec())
            .or_insert_with(async { Arc::new(AtomicU64::new(0)) })
            .await;

        if entry.is_fresh() {
            return Ok(());
        }

        let counter = entry.into_value();
        let hits = counter.fetch_add(1, Ordering::Relaxed) + 1;
        // Re-inserting restarts the entry's time-to-live.
        self.seen.insert(fingerprint.to_vec(), counter).await;

        if hits % self.report_every == 0 {
            let prefix = &fingerprint[..fingerprint.len().min(REPORT_PREFIX_LEN)];
            tracing::warn!(
                hit_count = hits,
                fingerprint_prefix = %String::from_utf8_lossy(prefix),
                "repeated duplicate requests detected"
            );
        }
        Err(AttestError::duplicate_request(hits))
    }

    async fn clear(&self) {
        self.seen.invalidate_all();
        self.seen.run_pending_tasks().await;
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for DedupGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupGuard")
            .field("entries", &self.seen.entry_count())
            .field("fingerprint_len", &self.fingerprint_len)
            .field("report_every", &self.report_every)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_sighting_allowed() {
        let guard = DedupGuard::default();
        assert!(guard.check(b"{\"order\":1}").await.is_ok());
    }

    #[tokio::test]
    async fn test_second_sighting_rejected() {
        let guard = DedupGuard::default();
        guard.check(b"same body").await.unwrap();

        let err = guard.check(b"same body").await.unwrap_err();
        assert!(matches!(err, AttestError::DuplicateRequest { hits: 1 }));

        let err = guard.check(b"same body").await.unwrap_err();
        assert!(matches!(err, AttestError::DuplicateRequest { hits: 2 }));
    }

    #[tokio::test]
    async fn test_different_bodies_allowed() {
        let guard = DedupGuard::default();
        guard.check(b"body-a").await.unwrap();
        assert!(guard.check(b"body-b").await.is_ok());
    }

    #[tokio::test]
    async fn test_shared_prefix_collides() {
        let guard = DedupGuard::builder().fingerprint_len(4).build();
        guard.check(b"abcd-one").await.unwrap();
        assert!(guard.check(b"abcd-two").await.is_err());
    }

    #[tokio::test]
    async fn test_allowed_again_after_window() {
        let guard = DedupGuard::builder().window(Duration::from_millis(50)).build();
        guard.check(b"short-lived").await.unwrap();
        assert!(guard.check(b"short-lived").await.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        guard.run_pending_tasks().await;

        assert!(guard.check(b"short-lived").await.is_ok());
    }

    #[tokio::test]
    async fn test_continuous_duplicates_stay_rejected() {
        let guard = DedupGuard::builder().window(Duration::from_millis(100)).build();
        guard.check(b"steady").await.unwrap();

        // Re-sent every 35ms for well over two windows.
        for step in 1..=8 {
            tokio::time::sleep(Duration::from_millis(35)).await;
            guard.run_pending_tasks().await;
            let err = guard.check(b"steady").await.unwrap_err();
            assert!(
                matches!(err, AttestError::DuplicateRequest { hits } if hits == step),
                "step {step}: {err:?}"
            );
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        guard.run_pending_tasks().await;
        assert!(guard.check(b"steady").await.is_ok(), "allowed once the flood stops for a window");
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let guard = DedupGuard::builder().max_entries(2).build();

        guard.check(b"fp-1").await.unwrap();
        guard.check(b"fp-2").await.unwrap();
        guard.check(b"fp-3").await.unwrap();
        guard.run_pending_tasks().await;

        assert!(guard.entry_count() <= 2);
        assert!(guard.check(b"fp-1").await.is_ok(), "least recently used entry was evicted");
    }

    #[tokio::test]
    async fn test_clear_forgets_everything() {
        let guard = DedupGuard::default();
        guard.check(b"before clear").await.unwrap();

        guard.clear().await;

        assert!(guard.check(b"before clear").await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_first_arrivals_allow_exactly_one() {
        let guard = Arc::new(DedupGuard::default());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let guard = Arc::clone(&guard);
                tokio::spawn(async move { guard.check(b"racing body").await.is_ok() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.expect("task") {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 1);
    }

    #[test]
    fn test_fingerprint_truncates() {
        let guard = DedupGuard::default();
        let body = vec![b'x'; 1_000];
        assert_eq!(guard.fingerprint(&body).len(), DEFAULT_FINGERPRINT_LEN);
        assert_eq!(guard.fingerprint(b"short"), b"short");
    }
}
