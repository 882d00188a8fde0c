//! Key registry: which key signs, which keys verify.
//!
//! The registry evaluates the rotation policy against one cached key set.
//! Every query goes through a [`RegistrySnapshot`], which pins both the key
//! set and the evaluation time, so a signing decision and the key id
//! reported alongside it can never come from different key sets.
//!
//! # Status rules
//!
//! For a record created at `c`, evaluated at `now`:
//!
//! | Condition | Status |
//! |-----------|--------|
//! | malformed key id, or `now - c > rotation + grace` | `expired` |
//! | `c - now > 5 minutes` | `not_yet_valid` |
//! | newest remaining record | `current` |
//! | any other remaining record | `previous` |

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AttestError, Result},
    key_cache::KeyCache,
    key_set::{KeyRecord, KeySet},
    policy::RotationPolicy,
};

/// Derived status of a key record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// The signing key.
    Current,
    /// Rotated out, still valid for verification.
    Previous,
    /// Past its verification window, or unidentifiable.
    Expired,
    /// Created further in the future than the allowed clock skew.
    NotYetValid,
}

impl KeyStatus {
    /// Whether keys with this status are published for verification.
    #[must_use]
    pub fn is_verifiable(self) -> bool {
        matches!(self, Self::Current | Self::Previous)
    }

    /// Lowercase name as published.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verification-eligible record with its status.
#[derive(Debug, Clone, Copy)]
pub struct VerifiableKey<'a> {
    /// The record.
    pub record: &'a KeyRecord,
    /// `Current` or `Previous`.
    pub status: KeyStatus,
}

/// Policy evaluation over one key set at one instant.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    key_set: Arc<KeySet>,
    policy: RotationPolicy,
    now_ms: i64,
    /// Indices into `key_set.records()` of eligible records, newest first.
    eligible: Vec<usize>,
}

impl RegistrySnapshot {
    /// Evaluates `policy` over `key_set` at `now_ms`.
    #[must_use]
    pub fn new(key_set: Arc<KeySet>, policy: RotationPolicy, now_ms: i64) -> Self {
        let records = key_set.records();
        let mut eligible: Vec<usize> = (0..records.len())
            .filter(|&i| Self::is_eligible(&policy, &records[i], now_ms))
            .collect();
        // created_at is always Some for eligible records.
        eligible.sort_by(|&a, &b| {
            let (a, b) = (&records[a], &records[b]);
            b.created_at().cmp(&a.created_at()).then_with(|| a.key_id().cmp(b.key_id()))
        });

        Self { key_set, policy, now_ms, eligible }
    }

    fn is_eligible(policy: &RotationPolicy, record: &KeyRecord, now_ms: i64) -> bool {
        if !record.has_valid_key_id() {
            return false;
        }
        let Some(created_at) = record.created_at() else {
            return false;
        };
        !policy.is_expired_at(created_at, now_ms)
            && !RotationPolicy::is_not_yet_valid(created_at, now_ms)
    }

    /// The signing key: the newest non-expired record.
    ///
    /// # Errors
    ///
    /// Returns [`AttestError::Configuration`] if no record is eligible. An
    /// expired key is never picked as a fallback.
    pub fn current_key(&self) -> Result<&KeyRecord> {
        self.eligible.first().map(|&i| &self.key_set.records()[i]).ok_or_else(|| {
            AttestError::configuration(format!(
                "no valid signing key in key set version {} ({} records)",
                self.key_set.version_id(),
                self.key_set.len()
            ))
        })
    }

    /// All verification-eligible records, newest first, ties broken by key
    /// id. The first entry, if any, is `Current`.
    #[must_use]
    pub fn verifiable_keys(&self) -> Vec<VerifiableKey<'_>> {
        self.eligible
            .iter()
            .enumerate()
            .map(|(rank, &i)| VerifiableKey {
                record: &self.key_set.records()[i],
                status: if rank == 0 { KeyStatus::Current } else { KeyStatus::Previous },
            })
            .collect()
    }

    /// Derived status of any record in the snapshot's key set.
    #[must_use]
    pub fn status_of(&self, record: &KeyRecord) -> KeyStatus {
        let Some(created_at) = record.created_at().filter(|_| record.has_valid_key_id()) else {
            return KeyStatus::Expired;
        };
        if self.policy.is_expired_at(created_at, self.now_ms) {
            return KeyStatus::Expired;
        }
        if RotationPolicy::is_not_yet_valid(created_at, self.now_ms) {
            return KeyStatus::NotYetValid;
        }
        match self.current_key() {
            Ok(current) if current.key_id() == record.key_id() => KeyStatus::Current,
            _ => KeyStatus::Previous,
        }
    }

    /// Whether the current key has outlived its rotation period.
    #[must_use]
    pub fn is_rotation_overdue(&self) -> bool {
        self.current_key()
            .ok()
            .and_then(KeyRecord::created_at)
            .is_some_and(|created_at| self.policy.is_rotation_due(created_at, self.now_ms))
    }

    /// The key set this snapshot evaluates.
    #[must_use]
    pub fn key_set(&self) -> &Arc<KeySet> {
        &self.key_set
    }

    /// Evaluation time in epoch milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }
}

/// Applies the rotation policy to the cached key set.
pub struct KeyRegistry {
    cache: Arc<KeyCache>,
    policy: RotationPolicy,
    /// Key id last reported as overdue, so the warning fires once per key.
    overdue_reported: Mutex<Option<String>>,
}

impl KeyRegistry {
    /// Creates a registry over `cache`.
    #[must_use]
    pub fn new(cache: Arc<KeyCache>, policy: RotationPolicy) -> Self {
        Self { cache, policy, overdue_reported: Mutex::new(None) }
    }

    /// Snapshot evaluated at the wall clock.
    ///
    /// # Errors
    ///
    /// Propagates key cache errors.
    pub async fn snapshot(&self) -> Result<RegistrySnapshot> {
        self.snapshot_at(Utc::now().timestamp_millis()).await
    }

    /// Snapshot evaluated at `now_ms`.
    ///
    /// # Errors
    ///
    /// Propagates key cache errors.
    pub async fn snapshot_at(&self, now_ms: i64) -> Result<RegistrySnapshot> {
        let key_set = self.cache.get_key_set().await?;
        let snapshot = RegistrySnapshot::new(key_set, self.policy, now_ms);
        self.report_overdue(&snapshot);
        Ok(snapshot)
    }

    /// Id of the current signing key at the wall clock.
    ///
    /// # Errors
    ///
    /// Key cache errors, or [`AttestError::Configuration`] if no key is valid.
    pub async fn current_key_id(&self) -> Result<String> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.current_key()?.key_id().to_owned())
    }

    /// The rotation policy.
    #[must_use]
    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    /// The backing cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<KeyCache> {
        &self.cache
    }

    fn report_overdue(&self, snapshot: &RegistrySnapshot) {
        if !snapshot.is_rotation_overdue() {
            return;
        }
        let Ok(current) = snapshot.current_key() else {
            return;
        };
        let mut reported = self.overdue_reported.lock();
        if reported.as_deref() != Some(current.key_id()) {
            tracing::warn!(
                key_id = current.key_id(),
                rotation_days = self.policy.rotation_days,
                "signing key rotation overdue, still signing with the newest key"
            );
            *reported = Some(current.key_id().to_owned());
        }
    }
}

impl std::fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRegistry").field("policy", &self.policy).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use attestor_storage::{
        KeySetBlob,
        testutil::{DAY_MS, generate_key_record, key_set_blob},
    };
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::{error::ErrorKind, policy::CLOCK_SKEW_MS};

    const T0: i64 = 1_700_000_000_000;

    fn snapshot(created: &[i64], now: i64) -> RegistrySnapshot {
        let set = KeySet::from_blob("v1", &key_set_blob(created));
        RegistrySnapshot::new(Arc::new(set), RotationPolicy::default(), now)
    }

    fn ids(snapshot: &RegistrySnapshot) -> Vec<(String, KeyStatus)> {
        snapshot
            .verifiable_keys()
            .iter()
            .map(|k| (k.record.key_id().to_owned(), k.status))
            .collect()
    }

    #[test]
    fn test_current_is_newest_non_expired() {
        let snap = snapshot(&[T0, T0 + 30 * DAY_MS, T0 + 60 * DAY_MS], T0 + 61 * DAY_MS);
        assert_eq!(snap.current_key().expect("current").created_at(), Some(T0 + 60 * DAY_MS));
    }

    #[rstest]
    #[case::previous_at_91_days(T0 + 91 * DAY_MS, Some(KeyStatus::Previous))]
    #[case::previous_at_120_days(T0 + 120 * DAY_MS, Some(KeyStatus::Previous))]
    #[case::absent_at_121_days(T0 + 121 * DAY_MS, None)]
    fn test_rotated_key_lifecycle(#[case] now: i64, #[case] expected: Option<KeyStatus>) {
        let snap = snapshot(&[T0, T0 + 90 * DAY_MS], now);
        let status = ids(&snap).into_iter().find(|(id, _)| id == "sig-1700000000000").map(|(_, s)| s);
        assert_eq!(status, expected);
    }

    #[test]
    fn test_all_expired_is_configuration_error() {
        let snap = snapshot(&[T0, T0 + DAY_MS], T0 + 200 * DAY_MS);

        let err = snap.current_key().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
        assert!(snap.verifiable_keys().is_empty());
    }

    #[test]
    fn test_empty_set_is_configuration_error() {
        let snap = snapshot(&[], T0);
        assert!(snap.current_key().is_err());
    }

    #[test]
    fn test_overdue_key_stays_current() {
        let snap = snapshot(&[T0], T0 + 100 * DAY_MS);
        assert_eq!(snap.current_key().expect("current").created_at(), Some(T0));
        assert!(snap.is_rotation_overdue());
    }

    #[test]
    fn test_future_key_excluded() {
        let snap = snapshot(&[T0, T0 + CLOCK_SKEW_MS + 1], T0);

        assert_eq!(snap.current_key().expect("current").created_at(), Some(T0));
        let record = snap.key_set().get("sig-1700000300001").expect("record");
        assert_eq!(snap.status_of(record), KeyStatus::NotYetValid);
        assert_eq!(snap.verifiable_keys().len(), 1);
    }

    #[test]
    fn test_key_within_skew_is_current() {
        let snap = snapshot(&[T0, T0 + CLOCK_SKEW_MS], T0);
        assert_eq!(snap.current_key().expect("current").created_at(), Some(T0 + CLOCK_SKEW_MS));
    }

    #[test]
    fn test_malformed_key_id_is_expired_and_never_current() {
        let mut legacy = generate_key_record(T0 + DAY_MS);
        legacy.key_id = "legacy".into();
        let blob = KeySetBlob::new(vec![generate_key_record(T0), legacy]);
        let snap = RegistrySnapshot::new(
            Arc::new(KeySet::from_blob("v1", &blob)),
            RotationPolicy::default(),
            T0 + 2 * DAY_MS,
        );

        assert_eq!(snap.current_key().expect("current").key_id(), "sig-1700000000000");
        let record = snap.key_set().get("legacy").expect("record kept");
        assert_eq!(snap.status_of(record), KeyStatus::Expired);
    }

    #[test]
    fn test_status_of_each_record() {
        let snap = snapshot(&[T0, T0 + 90 * DAY_MS, T0 - 200 * DAY_MS], T0 + 91 * DAY_MS);
        let set = Arc::clone(snap.key_set());
        let statuses: Vec<_> = set.records().iter().map(|r| snap.status_of(r)).collect();

        assert_eq!(statuses, vec![KeyStatus::Previous, KeyStatus::Current, KeyStatus::Expired]);
    }

    #[test]
    fn test_verifiable_order_is_descending() {
        let snap = snapshot(&[T0, T0 + 2 * DAY_MS, T0 + DAY_MS], T0 + 3 * DAY_MS);
        let order: Vec<_> = ids(&snap).into_iter().map(|(id, _)| id).collect();

        assert_eq!(order, vec!["sig-1700172800000", "sig-1700086400000", "sig-1700000000000"]);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&KeyStatus::Current).expect("json"), "\"current\"");
        assert_eq!(serde_json::to_string(&KeyStatus::Previous).expect("json"), "\"previous\"");
    }

    proptest! {
        #[test]
        fn prop_current_is_max_non_expired(
            offsets in proptest::collection::vec(0i64..(300 * DAY_MS), 1..6),
            now_offset in 0i64..(400 * DAY_MS),
        ) {
            let created: Vec<i64> = offsets.iter().map(|o| T0 + o).collect();
            let now = T0 + now_offset;
            let snap = snapshot(&created, now);
            let policy = RotationPolicy::default();

            let expected = created
                .iter()
                .copied()
                .filter(|&c| !policy.is_expired_at(c, now) && !RotationPolicy::is_not_yet_valid(c, now))
                .max();

            match expected {
                Some(max) => {
                    let current = snap.current_key().expect("current exists");
                    prop_assert_eq!(current.created_at(), Some(max));
                    let verifiable = snap.verifiable_keys();
                    prop_assert_eq!(verifiable[0].status, KeyStatus::Current);
                    prop_assert!(verifiable.iter().skip(1).all(|k| k.status == KeyStatus::Previous));
                },
                None => prop_assert!(snap.current_key().is_err()),
            }
        }
    }
}
