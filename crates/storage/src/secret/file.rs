//! File-backed secret source.
//!
//! Reads `{root}/{secret_id}.json`. Intended for deployments where the
//! secret is mounted into the filesystem by the orchestrator (Kubernetes
//! secrets, systemd credentials, and similar). The file is expected to be
//! replaced atomically by whatever writes it.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use async_trait::async_trait;

use crate::{
    error::{StorageError, StorageResult},
    secret::source::SecretSource,
    types::{SecretId, SecretValue},
};

/// [`SecretSource`] that reads secrets from JSON files in a directory.
///
/// The version id of a read is the file's modification time in epoch
/// milliseconds, so a replaced file shows up as a new version.
///
/// # Examples
///
/// ```no_run
/// use attestor_storage::{FileSecretSource, SecretId, SecretSource};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = FileSecretSource::new("/run/secrets");
/// let value = source.fetch_secret(&SecretId::new("attestation-signing-keys")).await?;
/// println!("loaded version {}", value.version_id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    root: PathBuf,
}

impl FileSecretSource {
    /// Creates a source rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory secrets are read from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file path backing a secret.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidId`] if the identifier could escape the
    /// root directory.
    pub fn path_for(&self, secret_id: &SecretId) -> StorageResult<PathBuf> {
        secret_id.validate()?;
        Ok(self.root.join(format!("{secret_id}.json")))
    }
}

#[async_trait]
impl SecretSource for FileSecretSource {
    #[tracing::instrument(skip(self), fields(secret_id = %secret_id))]
    async fn fetch_secret(&self, secret_id: &SecretId) -> StorageResult<SecretValue> {
        let path = self.path_for(secret_id)?;

        let metadata = tokio::fs::metadata(&path).await.map_err(|e| map_io(secret_id, e))?;
        let payload = tokio::fs::read_to_string(&path).await.map_err(|e| map_io(secret_id, e))?;

        let version_id = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
            .map_or_else(|| "unknown".to_owned(), |since| since.as_millis().to_string());

        tracing::debug!(version_id, bytes = payload.len(), "secret file read");
        Ok(SecretValue::new(version_id, payload))
    }
}

fn map_io(secret_id: &SecretId, error: std::io::Error) -> StorageError {
    match error.kind() {
        ErrorKind::NotFound => StorageError::not_found(secret_id.as_str()),
        ErrorKind::InvalidData => {
            StorageError::serialization_with_source("secret file is not valid UTF-8", error)
        },
        _ => StorageError::connection_with_source("failed to read secret file", error),
    }
}
