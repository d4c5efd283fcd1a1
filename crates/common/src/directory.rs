//! Public key exchange through the shared database.
//!
//! Every user owns one record at `users/{uid}/e2ee`:
//!
//! ```text
//! { "v": 1, "x25519": <base64url public key>, "updatedAt": <server ms> }
//! ```
//!
//! The record is overwritten in place when the owner's key changes, so a
//! reader always sees the latest key or nothing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::{KeyError, PublicKey};
use crate::encoding::from_base64url;
use crate::store::{server_timestamp, KeyValueStore, StoreError};

/// Current published record version
pub const DIRECTORY_RECORD_VERSION: u32 = 1;

/// Path of the directory record of `uid`
pub fn directory_path(uid: &str) -> String {
    format!("users/{}/e2ee", uid)
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The shared directory could not be read or written
    #[error("key directory unavailable: {0}")]
    Unavailable(#[from] StoreError),
    /// A published key that cannot be decoded
    #[error("published key for '{uid}' is invalid: {source}")]
    InvalidKey {
        uid: String,
        #[source]
        source: KeyError,
    },
}

/// A user's record in the key directory, as read back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedPublicKey {
    pub v: u32,
    pub x25519: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// The directory already holds this key; nothing was written
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct KeyDirectory<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> KeyDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Make our public key visible to peers
    ///
    /// Writes only when the published key differs from `public_key`, so
    /// repeated setups (every app start, every device) do not generate
    /// update traffic.
    pub async fn publish_public_key(
        &self,
        uid: &str,
        public_key: &PublicKey,
    ) -> Result<PublishOutcome, DirectoryError> {
        let path = directory_path(uid);
        let encoded = public_key.to_base64url();

        let existing = self.store.get(&path).await?;
        let current = existing
            .as_ref()
            .and_then(|record| record.get("x25519"))
            .and_then(Value::as_str);

        if current == Some(encoded.as_str()) {
            tracing::debug!("E2EE public key for {} already published", uid);
            return Ok(PublishOutcome::Unchanged);
        }

        let mut record = serde_json::Map::new();
        record.insert("v".to_string(), Value::from(DIRECTORY_RECORD_VERSION));
        record.insert("x25519".to_string(), Value::from(encoded));
        record.insert("updatedAt".to_string(), server_timestamp());
        self.store.set(&path, Value::Object(record)).await?;

        tracing::info!(
            "published E2EE public key for {} ({})",
            uid,
            public_key.fingerprint()
        );
        Ok(PublishOutcome::Published)
    }

    /// Read the full directory record of `uid`
    pub async fn fetch_record(&self, uid: &str) -> Result<Option<PublishedPublicKey>, DirectoryError> {
        let Some(value) = self.store.get(&directory_path(uid)).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| DirectoryError::Unavailable(StoreError::Json(e)))
    }

    /// Look up a peer's public key bytes
    ///
    /// # Returns
    /// * `Ok(None)` - The peer has never published a key. This is the normal
    ///   state for anyone who has not run E2EE setup yet.
    /// * `Ok(Some(bytes))` - The decoded key; its length is checked when a
    ///   shared secret is derived from it
    pub async fn fetch_peer_public_key(&self, uid: &str) -> Result<Option<Vec<u8>>, DirectoryError> {
        let path = format!("{}/x25519", directory_path(uid));
        let Some(value) = self.store.get(&path).await? else {
            return Ok(None);
        };

        let invalid = |source: KeyError| DirectoryError::InvalidKey {
            uid: uid.to_string(),
            source,
        };
        let text = value
            .as_str()
            .ok_or_else(|| invalid(KeyError::InvalidKey("published key is not a string".to_string())))?;
        let bytes = from_base64url(text).map_err(|e| invalid(KeyError::Encoding(e)))?;
        Ok(Some(bytes))
    }
}
