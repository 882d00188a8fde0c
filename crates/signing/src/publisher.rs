//! Public key publication.
//!
//! Builds the list-keys response from the registry's verifiable keys. Only
//! public material is ever copied out of a [`KeyRecord`](crate::KeyRecord).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    registry::{KeyRegistry, KeyStatus, RegistrySnapshot},
};

/// Freshness hint for published keys.
pub const CACHE_CONTROL: &str = "public, max-age=3600";

/// Content type of the published document.
pub const CONTENT_TYPE: &str = "application/json";

/// Header reporting whether the key set came from the in-process cache.
pub const KEY_CACHE_HIT_HEADER: &str = "X-Key-Cache-Hit";

/// One published public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    /// Key id, `sig-{created_at}`.
    pub key_id: String,
    /// Ed25519 public key, base64url without padding.
    pub public_key: String,
    /// `current` or `previous`.
    pub status: KeyStatus,
    /// Creation time in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Body of the list-keys response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyDocument {
    /// Verifiable keys, newest first.
    pub keys: Vec<PublicKeyInfo>,
}

impl PublicKeyDocument {
    /// Builds the document from a registry snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &RegistrySnapshot) -> Self {
        let keys = snapshot
            .verifiable_keys()
            .into_iter()
            .map(|key| PublicKeyInfo {
                key_id: key.record.key_id().to_owned(),
                public_key: key.record.public_key().to_owned(),
                status: key.status,
                created_at: key.record.created_at(),
            })
            .collect();
        Self { keys }
    }

    /// Id of the key marked `current`, if any.
    #[must_use]
    pub fn current_key_id(&self) -> Option<&str> {
        self.keys.iter().find(|k| k.status == KeyStatus::Current).map(|k| k.key_id.as_str())
    }

    /// Looks up a key by id.
    #[must_use]
    pub fn get(&self, key_id: &str) -> Option<&PublicKeyInfo> {
        self.keys.iter().find(|k| k.key_id == key_id)
    }
}

/// The list-keys response: document plus response directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedKeys {
    /// The key document.
    pub document: PublicKeyDocument,
    /// Whether the key set was served from the in-process cache.
    pub cache_hit: bool,
}

impl PublishedKeys {
    /// Response headers, in a stable order.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", CONTENT_TYPE.to_owned()),
            ("Cache-Control", CACHE_CONTROL.to_owned()),
            (KEY_CACHE_HIT_HEADER, self.cache_hit.to_string()),
        ]
    }

    /// JSON body (`{"keys":[...]}`).
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if encoding fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.document)
    }
}

/// Produces the published key list from the registry.
#[derive(Debug, Clone)]
pub struct PublicKeyPublisher {
    registry: Arc<KeyRegistry>,
}

impl PublicKeyPublisher {
    /// Creates a publisher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<KeyRegistry>) -> Self {
        Self { registry }
    }

    /// Lists verifiable public keys at the wall clock.
    ///
    /// Uses the same cached key set as signing, so within one cache window
    /// the published `current` key is the key signatures are made with.
    ///
    /// # Errors
    ///
    /// Propagates key cache errors.
    #[tracing::instrument(skip(self))]
    pub async fn list_public_keys(&self) -> Result<PublishedKeys> {
        let snapshot = self.registry.snapshot().await?;
        Ok(self.publish(&snapshot))
    }

    /// Builds the response for an existing snapshot.
    #[must_use]
    pub fn publish(&self, snapshot: &RegistrySnapshot) -> PublishedKeys {
        let document = PublicKeyDocument::from_snapshot(snapshot);
        let cache_hit = self.registry.cache().stats().is_cached;
        tracing::info!(
            keys = document.keys.len(),
            current_key_id = document.current_key_id().unwrap_or("none"),
            cache_hit,
            "public keys published"
        );
        PublishedKeys { document, cache_hit }
    }
}
