//! Configuration for the attestation service.
//!
//! [`AttestorConfig`] deserializes from JSON (durations in humantime form,
//! e.g. `"15m"`) or is built in code with [`AttestorConfig::builder`]. Both
//! paths go through the same validation.
//!
//! ```
//! use std::time::Duration;
//! use attestor_signing::AttestorConfig;
//!
//! let config = AttestorConfig::builder()
//!     .secret_id("attestation-signing-keys")
//!     .cache_ttl(Duration::from_secs(600))
//!     .build()?;
//! assert_eq!(config.stale_ceiling(), Duration::from_secs(1200));
//! # Ok::<(), attestor_signing::ConfigError>(())
//! ```

use std::time::Duration;

use attestor_storage::{SecretId, StorageError};
use serde::{Deserialize, Serialize};

use crate::{
    attestation::AttestationFlags,
    dedup::{DEFAULT_DEDUP_MAX_ENTRIES, DEFAULT_DEDUP_WINDOW, DEFAULT_FINGERPRINT_LEN, DEFAULT_REPORT_EVERY},
    error::ConfigError,
    key_cache::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT},
    policy::{DEFAULT_GRACE_DAYS, DEFAULT_ROTATION_DAYS, RotationPolicy},
};

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttestorConfig {
    /// Identifier of the key set secret.
    secret_id: SecretId,

    /// Key cache TTL.
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    cache_ttl: Duration,

    /// Oldest key set served during an outage (default 2× `cache_ttl`).
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    stale_ceiling: Option<Duration>,

    /// Upper bound on one secret fetch.
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    fetch_timeout: Duration,

    /// Background refresh interval; disabled when absent.
    #[serde(with = "humantime_serde", default, skip_serializing_if = "Option::is_none")]
    refresh_interval: Option<Duration>,

    /// Dedup window.
    #[serde(with = "humantime_serde", default = "default_dedup_window")]
    dedup_window: Duration,

    /// Maximum tracked fingerprints.
    #[serde(default = "default_dedup_max_entries")]
    dedup_max_entries: u64,

    /// Fingerprint length in bytes.
    #[serde(default = "default_fingerprint_len")]
    dedup_fingerprint_len: usize,

    /// Duplicates between abuse reports.
    #[serde(default = "default_report_every")]
    dedup_report_every: u64,

    /// Rotation period in days.
    #[serde(default = "default_rotation_days")]
    rotation_days: u32,

    /// Grace period in days.
    #[serde(default = "default_grace_days")]
    grace_days: u32,

    /// Over-18 claim stamped into envelopes.
    #[serde(default = "default_true")]
    attest_over_18: bool,

    /// Over-21 claim stamped into envelopes.
    #[serde(default = "default_true")]
    attest_over_21: bool,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_fetch_timeout() -> Duration {
    DEFAULT_FETCH_TIMEOUT
}

fn default_dedup_window() -> Duration {
    DEFAULT_DEDUP_WINDOW
}

fn default_dedup_max_entries() -> u64 {
    DEFAULT_DEDUP_MAX_ENTRIES
}

fn default_fingerprint_len() -> usize {
    DEFAULT_FINGERPRINT_LEN
}

fn default_report_every() -> u64 {
    DEFAULT_REPORT_EVERY
}

fn default_rotation_days() -> u32 {
    DEFAULT_ROTATION_DAYS
}

fn default_grace_days() -> u32 {
    DEFAULT_GRACE_DAYS
}

fn default_true() -> bool {
    true
}

#[bon::bon]
impl AttestorConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if:
    /// - `secret_id` is empty or could not name a single secret (see
    ///   [`SecretId::validate`])
    /// - any duration, capacity, fingerprint length or report interval is zero
    /// - `stale_ceiling` is shorter than `cache_ttl`
    /// - `rotation_days` is zero
    #[builder]
    pub fn new(
        #[builder(into)] secret_id: SecretId,
        #[builder(default = DEFAULT_CACHE_TTL)] cache_ttl: Duration,
        stale_ceiling: Option<Duration>,
        #[builder(default = DEFAULT_FETCH_TIMEOUT)] fetch_timeout: Duration,
        refresh_interval: Option<Duration>,
        #[builder(default = DEFAULT_DEDUP_WINDOW)] dedup_window: Duration,
        #[builder(default = DEFAULT_DEDUP_MAX_ENTRIES)] dedup_max_entries: u64,
        #[builder(default = DEFAULT_FINGERPRINT_LEN)] dedup_fingerprint_len: usize,
        #[builder(default = DEFAULT_REPORT_EVERY)] dedup_report_every: u64,
        #[builder(default = DEFAULT_ROTATION_DAYS)] rotation_days: u32,
        #[builder(default = DEFAULT_GRACE_DAYS)] grace_days: u32,
        #[builder(default = true)] attest_over_18: bool,
        #[builder(default = true)] attest_over_21: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            secret_id,
            cache_ttl,
            stale_ceiling,
            fetch_timeout,
            refresh_interval,
            dedup_window,
            dedup_max_entries,
            dedup_fingerprint_len,
            dedup_report_every,
            rotation_days,
            grace_days,
            attest_over_18,
            attest_over_21,
        };
        config.validate()?;
        Ok(config)
    }
}

impl AttestorConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields,
    /// and [`ConfigError::Invalid`] for values that fail validation.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// See [`AttestorConfig::new`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(StorageError::InvalidId { reason, .. }) = self.secret_id.validate() {
            return Err(ConfigError::invalid("secret_id", reason));
        }
        for (field, value) in [
            ("cache_ttl", self.cache_ttl),
            ("fetch_timeout", self.fetch_timeout),
            ("dedup_window", self.dedup_window),
        ] {
            if value.is_zero() {
                return Err(ConfigError::invalid(field, "must be non-zero"));
            }
        }
        if self.refresh_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::invalid("refresh_interval", "must be non-zero"));
        }
        if self.dedup_max_entries == 0 {
            return Err(ConfigError::invalid("dedup_max_entries", "must be non-zero"));
        }
        if self.dedup_fingerprint_len == 0 {
            return Err(ConfigError::invalid("dedup_fingerprint_len", "must be non-zero"));
        }
        if self.dedup_report_every == 0 {
            return Err(ConfigError::invalid("dedup_report_every", "must be non-zero"));
        }
        if let Some(ceiling) = self.stale_ceiling
            && ceiling < self.cache_ttl
        {
            return Err(ConfigError::invalid(
                "stale_ceiling",
                format!("{ceiling:?} is shorter than cache_ttl {:?}", self.cache_ttl),
            ));
        }
        if self.rotation_days == 0 {
            return Err(ConfigError::invalid("rotation_days", "must be at least 1"));
        }
        Ok(())
    }

    /// Identifier of the key set secret.
    #[must_use]
    pub fn secret_id(&self) -> &SecretId {
        &self.secret_id
    }

    /// Key cache TTL.
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Stale ceiling, defaulting to twice the TTL.
    #[must_use]
    pub fn stale_ceiling(&self) -> Duration {
        self.stale_ceiling.unwrap_or(self.cache_ttl.saturating_mul(2))
    }

    /// Fetch timeout.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Background refresh interval, if enabled.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }

    /// Dedup window.
    #[must_use]
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Maximum tracked fingerprints.
    #[must_use]
    pub fn dedup_max_entries(&self) -> u64 {
        self.dedup_max_entries
    }

    /// Fingerprint length in bytes.
    #[must_use]
    pub fn dedup_fingerprint_len(&self) -> usize {
        self.dedup_fingerprint_len
    }

    /// Duplicates between abuse reports.
    #[must_use]
    pub fn dedup_report_every(&self) -> u64 {
        self.dedup_report_every
    }

    /// Rotation policy.
    #[must_use]
    pub fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy::new(self.rotation_days, self.grace_days)
    }

    /// Envelope claims.
    #[must_use]
    pub fn attestation_flags(&self) -> AttestationFlags {
        AttestationFlags { over_18: self.attest_over_18, over_21: self.attest_over_21 }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AttestorConfig::builder().secret_id("keys").build().unwrap();

        assert_eq!(config.cache_ttl(), Duration::from_secs(900));
        assert_eq!(config.stale_ceiling(), Duration::from_secs(1800));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.dedup_window(), Duration::from_secs(30));
        assert_eq!(config.dedup_max_entries(), 1_000);
        assert_eq!(config.dedup_fingerprint_len(), 256);
        assert_eq!(config.dedup_report_every(), 10);
        assert_eq!(config.rotation_policy(), RotationPolicy::new(90, 30));
        assert_eq!(config.attestation_flags(), AttestationFlags::default());
        assert!(config.refresh_interval().is_none());
    }

    #[test]
    fn test_from_json_with_humantime() {
        let config = AttestorConfig::from_json(
            r#"{
                "secret_id": "attestation-signing-keys",
                "cache_ttl": "10m",
                "dedup_window": "45s",
                "refresh_interval": "5m",
                "grace_days": 14,
                "attest_over_21": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.dedup_window(), Duration::from_secs(45));
        assert_eq!(config.refresh_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.rotation_policy().grace_days, 14);
        assert!(!config.attestation_flags().over_21);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let err = AttestorConfig::from_json(r#"{"secret_id":"k","cache_tll":"1m"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_json_validates() {
        let err = AttestorConfig::from_json(r#"{"secret_id":""}"#).unwrap_err();
        assert_eq!(err, ConfigError::invalid("secret_id", "cannot be empty"));
    }

    #[rstest]
    #[case::traversal("../keys")]
    #[case::nested("prod/keys")]
    #[case::hidden(".keys")]
    fn test_rejects_secret_id_outside_one_secret(#[case] id: &str) {
        let err = AttestorConfig::builder().secret_id(id).build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "secret_id", .. }), "{err:?}");
    }

    #[rstest]
    #[case::zero_ttl(AttestorConfig::builder().secret_id("k").cache_ttl(Duration::ZERO).build(), "cache_ttl")]
    #[case::zero_timeout(AttestorConfig::builder().secret_id("k").fetch_timeout(Duration::ZERO).build(), "fetch_timeout")]
    #[case::zero_window(AttestorConfig::builder().secret_id("k").dedup_window(Duration::ZERO).build(), "dedup_window")]
    #[case::zero_capacity(AttestorConfig::builder().secret_id("k").dedup_max_entries(0).build(), "dedup_max_entries")]
    #[case::zero_fingerprint(AttestorConfig::builder().secret_id("k").dedup_fingerprint_len(0).build(), "dedup_fingerprint_len")]
    #[case::zero_report(AttestorConfig::builder().secret_id("k").dedup_report_every(0).build(), "dedup_report_every")]
    #[case::zero_rotation(AttestorConfig::builder().secret_id("k").rotation_days(0).build(), "rotation_days")]
    #[case::short_ceiling(
        AttestorConfig::builder().secret_id("k").cache_ttl(Duration::from_secs(60)).stale_ceiling(Duration::from_secs(30)).build(),
        "stale_ceiling"
    )]
    fn test_validation(#[case] result: Result<AttestorConfig, ConfigError>, #[case] field: &str) {
        match result {
            Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected invalid {field}, got {other:?}"),
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let config = AttestorConfig::builder()
            .secret_id("keys")
            .stale_ceiling(Duration::from_secs(3600))
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();

        assert!(json.contains("\"cache_ttl\":\"15m\""));
        assert_eq!(AttestorConfig::from_json(&json).unwrap(), config);
    }
}
