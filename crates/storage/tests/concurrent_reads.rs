//! Concurrent access tests for the secret sources.
//!
//! Readers racing a writer that keeps publishing new key set versions must
//! always observe a complete, parseable blob and never go back in version.

#![allow(clippy::expect_used, clippy::panic)]

use std::{collections::HashSet, sync::Arc};

use attestor_storage::{
    FileSecretSource, KeySetBlob, MemorySecretSource, SecretId, SecretSource, StoredKeyRecord,
};
use tokio::task::JoinSet;

/// Number of concurrent reader tasks.
const CONCURRENCY: usize = 16;

/// Versions published by the writer.
const VERSIONS: usize = 50;

/// Reads each reader performs.
const READS_PER_TASK: usize = 100;

const T0: i64 = 1_700_000_000_000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Blob with placeholder key material; the sources never inspect it.
fn key_set_blob(created_at_ms: &[i64]) -> KeySetBlob {
    KeySetBlob::new(
        created_at_ms
            .iter()
            .map(|&created| {
                StoredKeyRecord::builder()
                    .key_id(format!("sig-{created}"))
                    .private_key(format!("seed-{created}"))
                    .created_at(created)
                    .build()
            })
            .collect(),
    )
}

fn version_number(version_id: &str) -> u64 {
    version_id.trim_start_matches('v').parse().expect("memory versions are v{n}")
}

#[tokio::test]
async fn readers_see_complete_monotonic_versions() {
    let source = MemorySecretSource::new();
    let id = SecretId::new("attestation-signing-keys");
    source.put_key_set(&id, &key_set_blob(&[T0])).expect("put should succeed");

    let mut set = JoinSet::new();
    for _ in 0..CONCURRENCY {
        let source = source.clone();
        let id = id.clone();
        set.spawn(async move {
            let mut last = 0;
            for _ in 0..READS_PER_TASK {
                let value = source.fetch_secret(&id).await.expect("fetch should succeed");
                let version = version_number(&value.version_id);
                assert!(version >= last, "version went backwards: {last} -> {version}");
                last = version;

                let blob = KeySetBlob::try_from(&value).expect("every version is a complete blob");
                assert!(!blob.keys.is_empty());
                tokio::task::yield_now().await;
            }
        });
    }

    let writer = {
        let source = source.clone();
        let id = id.clone();
        tokio::spawn(async move {
            for i in 1..=VERSIONS {
                let created = T0 + i as i64 * DAY_MS;
                source.put_key_set(&id, &key_set_blob(&[T0, created])).expect("put should succeed");
                tokio::task::yield_now().await;
            }
        })
    };

    while let Some(result) = set.join_next().await {
        result.expect("reader task panicked");
    }
    writer.await.expect("writer task panicked");

    assert_eq!(source.version_count(&id), VERSIONS + 1);
}

#[tokio::test]
async fn parallel_puts_assign_unique_versions() {
    let source = MemorySecretSource::new();
    let id = SecretId::new("keys");

    let mut set = JoinSet::new();
    for task in 0..CONCURRENCY {
        let source = source.clone();
        let id = id.clone();
        set.spawn(async move { source.put_secret(&id, format!("{{\"keys\":[],\"task\":{task}}}")) });
    }

    let mut versions = HashSet::new();
    while let Some(result) = set.join_next().await {
        assert!(versions.insert(result.expect("task panicked")), "duplicate version id");
    }
    assert_eq!(versions.len(), CONCURRENCY);
}

#[tokio::test]
async fn file_source_concurrent_reads_agree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let id = SecretId::new("attestation-signing-keys");
    let blob = key_set_blob(&[T0, T0 + 90 * DAY_MS]);
    std::fs::write(dir.path().join("attestation-signing-keys.json"), blob.to_json().expect("encode").as_str())
        .expect("write secret file");

    let source = Arc::new(FileSecretSource::new(dir.path()));
    let mut set = JoinSet::new();
    for _ in 0..CONCURRENCY {
        let source = Arc::clone(&source);
        let id = id.clone();
        set.spawn(async move { source.fetch_secret(&id).await.expect("fetch should succeed") });
    }

    let mut versions = HashSet::new();
    while let Some(result) = set.join_next().await {
        let value = result.expect("task panicked");
        let parsed = KeySetBlob::try_from(&value).expect("parse");
        assert_eq!(parsed, blob);
        versions.insert(value.version_id);
    }
    assert_eq!(versions.len(), 1, "unchanged file keeps its version");
}
