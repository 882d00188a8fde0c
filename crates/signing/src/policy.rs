//! Rotation and grace-period policy.
//!
//! A key is rotated out of signing once a newer key exists, and stays
//! verifiable for `rotation_days + grace_days` after its creation. Key ids
//! carry their creation time as `sig-{epoch_millis}`, so expiry can be
//! decided from the id alone.

use serde::{Deserialize, Serialize};

/// Prefix of every signing key id.
pub const KEY_ID_PREFIX: &str = "sig-";

/// Default rotation period in days.
pub const DEFAULT_ROTATION_DAYS: u32 = 90;

/// Default grace period in days.
pub const DEFAULT_GRACE_DAYS: u32 = 30;

/// Allowed clock skew for future-dated keys, in milliseconds (5 minutes).
pub const CLOCK_SKEW_MS: i64 = 5 * 60 * 1000;

/// Milliseconds in a day.
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Formats the key id for a creation timestamp.
///
/// ```
/// assert_eq!(attestor_signing::policy::format_key_id(1_700_000_000_000), "sig-1700000000000");
/// ```
#[must_use]
pub fn format_key_id(created_at_ms: i64) -> String {
    format!("{KEY_ID_PREFIX}{created_at_ms}")
}

/// Extracts the creation timestamp from a key id.
///
/// Returns `None` unless the id is exactly `sig-` followed by one or more
/// ASCII digits that fit in an `i64`.
///
/// ```
/// use attestor_signing::policy::parse_key_id;
///
/// assert_eq!(parse_key_id("sig-42"), Some(42));
/// assert_eq!(parse_key_id("sig-42abc"), None);
/// assert_eq!(parse_key_id("key-42"), None);
/// ```
#[must_use]
pub fn parse_key_id(key_id: &str) -> Option<i64> {
    let digits = key_id.strip_prefix(KEY_ID_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Returns `true` if the key named by `key_id` is older than `max_age_ms`
/// at `now_ms`.
///
/// A malformed id is always expired.
#[must_use]
pub fn is_key_expired(key_id: &str, max_age_ms: i64, now_ms: i64) -> bool {
    match parse_key_id(key_id) {
        Some(created_at) => now_ms.saturating_sub(created_at) > max_age_ms,
        None => true,
    }
}

/// Rotation and grace periods, in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationPolicy {
    /// Days a key is expected to be the signing key.
    pub rotation_days: u32,
    /// Extra days a rotated-out key stays verifiable.
    pub grace_days: u32,
}

impl RotationPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(rotation_days: u32, grace_days: u32) -> Self {
        Self { rotation_days, grace_days }
    }

    /// Rotation period in milliseconds.
    #[must_use]
    pub fn rotation_ms(&self) -> i64 {
        i64::from(self.rotation_days) * DAY_MS
    }

    /// Verification window (`rotation + grace`) in milliseconds.
    #[must_use]
    pub fn max_age_ms(&self) -> i64 {
        (i64::from(self.rotation_days) + i64::from(self.grace_days)) * DAY_MS
    }

    /// Whether a key created at `created_at_ms` is past its verification
    /// window at `now_ms`.
    #[must_use]
    pub fn is_expired_at(&self, created_at_ms: i64, now_ms: i64) -> bool {
        now_ms.saturating_sub(created_at_ms) > self.max_age_ms()
    }

    /// Whether a key created at `created_at_ms` has outlived its rotation
    /// period at `now_ms`.
    #[must_use]
    pub fn is_rotation_due(&self, created_at_ms: i64, now_ms: i64) -> bool {
        now_ms.saturating_sub(created_at_ms) > self.rotation_ms()
    }

    /// Whether `created_at_ms` lies further in the future than the allowed
    /// clock skew.
    #[must_use]
    pub fn is_not_yet_valid(created_at_ms: i64, now_ms: i64) -> bool {
        created_at_ms.saturating_sub(now_ms) > CLOCK_SKEW_MS
    }
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ROTATION_DAYS, DEFAULT_GRACE_DAYS)
    }
}
