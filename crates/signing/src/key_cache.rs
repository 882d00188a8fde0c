//! Time-bounded cache of the parsed signing key set.
//!
//! [`KeyCache`] wraps a [`SecretSource`] so that the signing path reads the
//! key set from memory and only reaches the source once per TTL window.
//!
//! # Architecture
//!
//! ```text
//! get_key_set()
//!   → fresh snapshot?            → return it (read lock, Arc clone)
//!   → acquire fill lock          (single-flight: one fetch in flight)
//!   → another fetch finished?    → share its outcome
//!   → fetch from source          (bounded by fetch_timeout)
//!       ok   → install snapshot  (unless clear() ran meanwhile)
//!       err  → transient and last snapshot within stale ceiling?
//!                → serve stale
//!              otherwise → propagate
//! ```
//!
//! # Cache Strategy
//!
//! - **TTL**: Default 15 minutes ([`DEFAULT_CACHE_TTL`])
//! - **Stale ceiling**: Default 2× TTL; a snapshot older than this is never
//!   served, even during an outage
//! - **Invalidation**: TTL expiry, [`KeyCache::clear`], or a forced
//!   [`KeyCache::refresh`]
//!
//! The snapshot is replaced wholesale, never mutated, so a reader holding
//! an `Arc<KeySet>` always sees one consistent key set.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use attestor_storage::{SecretId, SecretSource, StorageError};
use fail::fail_point;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AttestError, Result},
    key_set::KeySet,
};

/// Default cache TTL (15 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default upper bound on a single source fetch (5 seconds).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One installed snapshot.
struct CacheEntry {
    key_set: Arc<KeySet>,
    fetched_at: Instant,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Whether the most recent read was answered from memory (fresh or stale).
    pub is_cached: bool,
    /// Age of the installed snapshot, if any.
    pub age: Option<Duration>,
    /// Version id of the installed snapshot, if any.
    pub version_id: Option<String>,
    /// Configured TTL.
    pub ttl: Duration,
    /// Source fetches attempted.
    pub fetch_count: u64,
    /// Source fetches that failed.
    pub fetch_errors: u64,
    /// Reads answered with a stale snapshot during an outage.
    pub stale_serves: u64,
}

/// Cache for the signing key set.
///
/// Share it behind an `Arc`; every method takes `&self`.
///
/// # Graceful Degradation
///
/// When the source fails transiently (connection, timeout, internal), the
/// last installed snapshot is served as long as it is no older than the
/// stale ceiling. Definitive failures (secret missing, blob malformed) are
/// never masked by stale data.
pub struct KeyCache {
    source: Arc<dyn SecretSource>,
    secret_id: SecretId,
    ttl: Duration,
    stale_ceiling: Duration,
    fetch_timeout: Duration,
    /// Installed snapshot. Held only for an `Arc` clone or swap.
    entry: RwLock<Option<Arc<CacheEntry>>>,
    /// Serializes fetch-and-swap.
    fill_lock: tokio::sync::Mutex<()>,
    /// Bumped by every completed fetch attempt, so callers that waited on
    /// the fill lock can tell that a fetch finished while they waited.
    fill_epoch: AtomicU64,
    /// Outcome of the most recent failed fetch, cleared on success.
    last_error: Mutex<Option<AttestError>>,
    /// Bumped by [`clear`](Self::clear); a fetch that started under an
    /// older generation is returned but not installed.
    invalidation_gen: AtomicU64,
    last_read_cached: AtomicBool,
    fetch_count: AtomicU64,
    fetch_errors: AtomicU64,
    stale_serves: AtomicU64,
    refresh_count: AtomicU64,
    cancel_token: CancellationToken,
    refresh_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

#[bon::bon]
impl KeyCache {
    /// Creates a new key cache.
    ///
    /// # Arguments
    ///
    /// * `source` - Secret source holding the key set blob
    /// * `secret_id` - Identifier of the blob
    /// * `ttl` - Snapshot lifetime (default [`DEFAULT_CACHE_TTL`])
    /// * `stale_ceiling` - Maximum age of a snapshot served during an outage
    ///   (default 2× `ttl`)
    /// * `fetch_timeout` - Upper bound on one fetch (default
    ///   [`DEFAULT_FETCH_TIMEOUT`])
    ///
    /// # Examples
    ///
    /// ```
    /// use std::{sync::Arc, time::Duration};
    /// use attestor_signing::KeyCache;
    /// use attestor_storage::MemorySecretSource;
    ///
    /// let cache = KeyCache::builder()
    ///     .source(Arc::new(MemorySecretSource::new()))
    ///     .secret_id("attestation-signing-keys")
    ///     .ttl(Duration::from_secs(60))
    ///     .build();
    /// assert_eq!(cache.ttl(), Duration::from_secs(60));
    /// ```
    #[builder]
    pub fn new(
        source: Arc<dyn SecretSource>,
        #[builder(into)] secret_id: SecretId,
        #[builder(default = DEFAULT_CACHE_TTL)] ttl: Duration,
        stale_ceiling: Option<Duration>,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] fetch_timeout: Duration,
    ) -> Self {
        Self {
            source,
            secret_id,
            ttl,
            stale_ceiling: stale_ceiling.unwrap_or(ttl.saturating_mul(2)),
            fetch_timeout,
            entry: RwLock::new(None),
            fill_lock: tokio::sync::Mutex::new(()),
            fill_epoch: AtomicU64::new(0),
            last_error: Mutex::new(None),
            invalidation_gen: AtomicU64::new(0),
            last_read_cached: AtomicBool::new(false),
            fetch_count: AtomicU64::new(0),
            fetch_errors: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
            refresh_count: AtomicU64::new(0),
            cancel_token: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
        }
    }
}

impl KeyCache {
    /// Returns the current key set.
    ///
    /// Never waits for more than one source fetch. Concurrent callers on a
    /// cold or expired cache share a single fetch.
    ///
    /// # Errors
    ///
    /// - [`AttestError::UpstreamUnavailable`] if the source failed
    ///   transiently and no snapshot within the stale ceiling exists
    /// - [`AttestError::Configuration`] if the secret is missing or malformed
    #[tracing::instrument(skip(self), fields(secret_id = %self.secret_id))]
    pub async fn get_key_set(&self) -> Result<Arc<KeySet>> {
        if let Some(key_set) = self.fresh() {
            tracing::debug!(cache = "snapshot", "cache hit");
            return Ok(key_set);
        }
        tracing::debug!(cache = "snapshot", "cache miss");

        let epoch_before = self.fill_epoch.load(Ordering::Acquire);
        let _fill = self.fill_lock.lock().await;

        if self.fill_epoch.load(Ordering::Acquire) != epoch_before {
            if let Some(key_set) = self.fresh() {
                tracing::debug!(cache = "snapshot", "filled while waiting");
                return Ok(key_set);
            }
            let shared_error = self.last_error.lock().clone();
            if let Some(err) = shared_error {
                return self.serve_stale(err);
            }
        } else if let Some(key_set) = self.fresh() {
            return Ok(key_set);
        }

        self.fetch_and_install().await
    }

    /// Fetches from the source and swaps the snapshot regardless of TTL.
    ///
    /// Still single-flight with respect to [`get_key_set`](Self::get_key_set).
    ///
    /// # Errors
    ///
    /// Same as [`get_key_set`](Self::get_key_set), including stale serving.
    #[tracing::instrument(skip(self), fields(secret_id = %self.secret_id))]
    pub async fn refresh(&self) -> Result<Arc<KeySet>> {
        let _fill = self.fill_lock.lock().await;
        self.fetch_and_install().await
    }

    /// Drops the installed snapshot.
    ///
    /// Bumps the invalidation generation so that a fetch already in flight
    /// returns its result to its callers without installing it. An audit
    /// event is emitted at INFO level.
    #[tracing::instrument(skip(self), fields(secret_id = %self.secret_id))]
    pub fn clear(&self) {
        self.invalidation_gen.fetch_add(1, Ordering::Release);
        let evicted = self.entry.write().take().is_some();
        *self.last_error.lock() = None;
        self.last_read_cached.store(false, Ordering::Relaxed);
        tracing::info!(
            audit.action = "clear_key_cache",
            audit.resource = %self.secret_id,
            audit.result = "success",
            audit.evicted = evicted,
            "audit_event"
        );
    }

    /// Returns point-in-time statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entry = self.entry.read().clone();
        CacheStats {
            is_cached: self.last_read_cached.load(Ordering::Relaxed),
            age: entry.as_ref().map(|e| e.fetched_at.elapsed()),
            version_id: entry.as_ref().map(|e| e.key_set.version_id().to_owned()),
            ttl: self.ttl,
            fetch_count: self.fetch_count.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            stale_serves: self.stale_serves.load(Ordering::Relaxed),
        }
    }

    /// Configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Configured stale ceiling.
    #[must_use]
    pub fn stale_ceiling(&self) -> Duration {
        self.stale_ceiling
    }

    /// Identifier of the cached secret.
    #[must_use]
    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }

    /// Enables background refresh at the given interval.
    ///
    /// A spawned task calls [`refresh`](Self::refresh) every `interval`, so
    /// the request path rarely waits on the source. The task holds only a
    /// weak reference and stops on [`shutdown`](Self::shutdown), on
    /// cancellation of [`cancel_token`](Self::cancel_token), or when the
    /// last `Arc` is dropped.
    ///
    /// `interval` should be shorter than the TTL.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_refresh_interval(self: Arc<Self>, interval: Duration) -> Arc<Self> {
        let weak: Weak<Self> = Arc::downgrade(&self);
        let token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("key cache refresh task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(cache) = weak.upgrade() else { break };
                        match cache.refresh().await {
                            Ok(key_set) => tracing::debug!(
                                version_id = key_set.version_id(),
                                keys = key_set.len(),
                                "background refresh complete"
                            ),
                            Err(err) => tracing::warn!(error = %err, "background refresh failed"),
                        }
                        cache.refresh_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });

        *self.refresh_handle.lock() = Some(handle);
        self
    }

    /// Number of completed background refresh cycles.
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::Relaxed)
    }

    /// Cancellation token for the background refresh task.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Stops background refresh and drops the snapshot.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.refresh_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "key cache refresh task panicked");
        }
        self.clear();
    }

    /// Returns the installed snapshot if it is within its TTL.
    fn fresh(&self) -> Option<Arc<KeySet>> {
        let entry = self.entry.read().clone()?;
        if entry.fetched_at.elapsed() < self.ttl {
            self.last_read_cached.store(true, Ordering::Relaxed);
            Some(Arc::clone(&entry.key_set))
        } else {
            None
        }
    }

    /// Fetches, then installs unless an invalidation intervened. Callers
    /// must hold the fill lock.
    async fn fetch_and_install(&self) -> Result<Arc<KeySet>> {
        let gen_before = self.invalidation_gen.load(Ordering::Acquire);
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        let result = self.fetch().await;
        let outcome = match result {
            Ok(key_set) => {
                let key_set = Arc::new(key_set);
                *self.last_error.lock() = None;
                self.last_read_cached.store(false, Ordering::Relaxed);

                if self.invalidation_gen.load(Ordering::Acquire) == gen_before {
                    *self.entry.write() = Some(Arc::new(CacheEntry {
                        key_set: Arc::clone(&key_set),
                        fetched_at: Instant::now(),
                    }));
                    tracing::debug!(
                        version_id = key_set.version_id(),
                        keys = key_set.len(),
                        "installed key set"
                    );
                } else {
                    tracing::debug!("discarding fetched key set: cache cleared during fetch");
                }
                Ok(key_set)
            },
            Err(err) => {
                self.fetch_errors.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = Some(err.clone());
                self.serve_stale(err)
            },
        };

        self.fill_epoch.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn fetch(&self) -> Result<KeySet> {
        fail_point!("key-cache-before-fetch", |_| {
            Err(AttestError::upstream_unavailable(StorageError::internal(
                "injected failure before fetch",
            )))
        });

        let value =
            tokio::time::timeout(self.fetch_timeout, self.source.fetch_secret(&self.secret_id))
                .await
                .map_err(|_| StorageError::timeout())??;

        KeySet::from_secret(&value)
    }

    /// Falls back to the installed snapshot for transient failures within
    /// the stale ceiling; otherwise returns `err`.
    fn serve_stale(&self, err: AttestError) -> Result<Arc<KeySet>> {
        if !err.is_retryable() {
            tracing::error!(error = %err, "key set fetch failed");
            self.last_read_cached.store(false, Ordering::Relaxed);
            return Err(err);
        }

        let entry = self.entry.read().clone();
        match entry {
            Some(entry) if entry.fetched_at.elapsed() <= self.stale_ceiling => {
                let age = entry.fetched_at.elapsed();
                self.stale_serves.fetch_add(1, Ordering::Relaxed);
                self.last_read_cached.store(true, Ordering::Relaxed);
                tracing::warn!(
                    cache = "stale",
                    stale_age_secs = age.as_secs(),
                    error = %err,
                    "serving stale key set, secret source unavailable"
                );
                Ok(Arc::clone(&entry.key_set))
            },
            _ => {
                self.last_read_cached.store(false, Ordering::Relaxed);
                tracing::error!(error = %err, "key set unavailable and no usable stale snapshot");
                Err(err)
            },
        }
    }
}

impl Drop for KeyCache {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("secret_id", &self.secret_id)
            .field("ttl", &self.ttl)
            .field("stale_ceiling", &self.stale_ceiling)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
