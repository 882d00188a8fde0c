//! The attestation service.
//!
//! [`AttestationService`] wires the key cache, registry, publisher and
//! dedup guard together behind the two request operations (sign and list
//! public keys) plus lifecycle hooks (warm-up and shutdown).
//!
//! Request errors leave the service as an [`ErrorResponse`]: a status code
//! and a fixed client message. The detailed [`AttestError`] is logged
//! and never returned.
//!
//! # Sign request flow
//!
//! 1. reject a missing or empty body or origin
//! 2. reject a body that is not UTF-8
//! 3. dedup check on the body fingerprint
//! 4. one registry snapshot supplies both the signing key and the key id
//! 5. build the envelope, encode the target, sign it

use std::sync::Arc;

use attestor_storage::SecretSource;
use serde::Serialize;

use crate::{
    attestation::{AttestationFlags, Envelope, SignResponse},
    config::AttestorConfig,
    dedup::{DedupGuard, DuplicateDetector},
    error::{AttestError, ErrorKind, Result},
    key_cache::KeyCache,
    metrics::ServiceMetrics,
    publisher::{PublicKeyPublisher, PublishedKeys},
    registry::KeyRegistry,
    signer::Signer,
};

/// Client-facing failure: status code plus a generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// HTTP status code.
    #[serde(skip)]
    pub status: u16,
    /// Message safe to show the caller.
    pub message: &'static str,
    /// Classification, for logs.
    #[serde(skip)]
    pub kind: ErrorKind,
}

impl ErrorResponse {
    /// JSON body (`{"message":"..."}`).
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if encoding fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<ErrorKind> for ErrorResponse {
    fn from(kind: ErrorKind) -> Self {
        Self { status: kind.status_code(), message: kind.client_message(), kind }
    }
}

impl From<&AttestError> for ErrorResponse {
    fn from(err: &AttestError) -> Self {
        err.kind().into()
    }
}

/// Signing-key lifecycle manager behind the two request operations.
pub struct AttestationService {
    registry: Arc<KeyRegistry>,
    publisher: PublicKeyPublisher,
    dedup: Arc<dyn DuplicateDetector>,
    flags: AttestationFlags,
    metrics: ServiceMetrics,
}

impl AttestationService {
    /// Builds the service from configuration and a secret source.
    ///
    /// # Panics
    ///
    /// When `config` enables background refresh, must be called within a
    /// Tokio runtime context.
    #[must_use]
    pub fn new(config: &AttestorConfig, source: Arc<dyn SecretSource>) -> Self {
        let cache = Arc::new(
            KeyCache::builder()
                .source(source)
                .secret_id(config.secret_id().clone())
                .ttl(config.cache_ttl())
                .stale_ceiling(config.stale_ceiling())
                .fetch_timeout(config.fetch_timeout())
                .build(),
        );
        let cache = match config.refresh_interval() {
            Some(interval) => cache.with_refresh_interval(interval),
            None => cache,
        };

        let dedup = DedupGuard::builder()
            .window(config.dedup_window())
            .max_entries(config.dedup_max_entries())
            .fingerprint_len(config.dedup_fingerprint_len())
            .report_every(config.dedup_report_every())
            .build();

        let registry = Arc::new(KeyRegistry::new(cache, config.rotation_policy()));

        tracing::info!(
            secret_id = %config.secret_id(),
            cache_ttl = ?config.cache_ttl(),
            refresh_interval = ?config.refresh_interval(),
            rotation_days = config.rotation_policy().rotation_days,
            grace_days = config.rotation_policy().grace_days,
            "attestation service configured"
        );

        Self {
            publisher: PublicKeyPublisher::new(Arc::clone(&registry)),
            registry,
            dedup: Arc::new(dedup),
            flags: config.attestation_flags(),
            metrics: ServiceMetrics::new(),
        }
    }

    /// Replaces the duplicate detector.
    #[must_use]
    pub fn with_duplicate_detector(mut self, detector: Arc<dyn DuplicateDetector>) -> Self {
        self.dedup = detector;
        self
    }

    /// Signs an attestation for `body` received from `origin`.
    ///
    /// # Errors
    ///
    /// | Status | Cause |
    /// |--------|-------|
    /// | 400 | body or origin missing or empty, body not UTF-8 |
    /// | 429 | body seen within the dedup window |
    /// | 503 | secret source unreachable, no usable cached key set |
    /// | 500 | no valid signing key, or signing failed |
    ///
    /// The body is recorded by the duplicate detector before the key set is
    /// read. A client retrying the same body after a 503 is therefore
    /// rejected with 429 until the dedup window has passed; retries must
    /// change the body (for example a fresh client nonce).
    #[tracing::instrument(skip_all, fields(body_len = body.map_or(0, <[u8]>::len)))]
    pub async fn sign(
        &self,
        body: Option<&[u8]>,
        origin: Option<&str>,
    ) -> std::result::Result<SignResponse, ErrorResponse> {
        match self.try_sign(body, origin).await {
            Ok(response) => {
                self.metrics.record_signature();
                Ok(response)
            },
            Err(err) => {
                self.metrics.record_sign_error(err.kind());
                Err(reject("sign", &err))
            },
        }
    }

    async fn try_sign(&self, body: Option<&[u8]>, origin: Option<&str>) -> Result<SignResponse> {
        let body = body
            .filter(|b| !b.is_empty())
            .ok_or_else(|| AttestError::malformed_input("request body is required"))?;
        let origin = origin
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| AttestError::malformed_input("request origin is required"))?;
        let payload = std::str::from_utf8(body)
            .map_err(|e| AttestError::malformed_input(format!("request body is not UTF-8: {e}")))?;

        self.dedup.check(body).await?;

        let snapshot = self.registry.snapshot().await?;
        let envelope = Envelope::new(self.flags, payload, origin, snapshot.now_ms());
        let target = envelope.to_target()?;
        let signed = Signer::sign_in(&snapshot, target.as_bytes())?;

        tracing::info!(
            ip_address_hash = %envelope.ip_address_hash,
            key_id = %signed.key_id,
            payload_len = payload.len(),
            "attestation signed"
        );

        Ok(SignResponse { target, signature: signed.signature, key_id: signed.key_id })
    }

    /// Lists the verifiable public keys.
    ///
    /// # Errors
    ///
    /// 503 when the secret source is unreachable with no usable cached key
    /// set, 500 when the stored key set is unusable.
    #[tracing::instrument(skip(self))]
    pub async fn list_public_keys(&self) -> std::result::Result<PublishedKeys, ErrorResponse> {
        match self.publisher.list_public_keys().await {
            Ok(published) => {
                self.metrics.record_public_keys_served();
                Ok(published)
            },
            Err(err) => {
                self.metrics.record_public_key_error(err.kind());
                Err(reject("list_public_keys", &err))
            },
        }
    }

    /// Drops any cached key set and fetches a fresh one.
    ///
    /// Failures are logged and swallowed; the first request retries the
    /// fetch.
    #[tracing::instrument(skip(self))]
    pub async fn warm_up(&self) {
        let cache = self.registry.cache();
        cache.clear();
        match cache.get_key_set().await {
            Ok(key_set) => tracing::info!(
                version_id = key_set.version_id(),
                keys = key_set.len(),
                "key cache warmed"
            ),
            Err(err) => tracing::error!(
                error = %err,
                kind = %err.kind(),
                "key cache warm-up failed; first request will retry"
            ),
        }
    }

    /// Stops background refresh and drops cached key material.
    pub async fn shutdown(&self) {
        self.registry.cache().shutdown().await;
        self.dedup.clear().await;
        tracing::info!("attestation service shut down");
    }

    /// The key registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    /// The key cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<KeyCache> {
        self.registry.cache()
    }

    /// Request counters.
    #[must_use]
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for AttestationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationService")
            .field("registry", &self.registry)
            .field("flags", &self.flags)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

fn reject(operation: &'static str, err: &AttestError) -> ErrorResponse {
    let response = ErrorResponse::from(err);
    match response.kind {
        ErrorKind::MalformedInput | ErrorKind::DuplicateRequest => {
            tracing::warn!(operation, kind = %response.kind, error = %err, "request rejected");
        },
        ErrorKind::UpstreamUnavailable => {
            tracing::warn!(operation, kind = %response.kind, error = %err, "key source unavailable");
        },
        _ => {
            tracing::error!(operation, kind = %response.kind, error = %err, "request failed");
        },
    }
    response
}
