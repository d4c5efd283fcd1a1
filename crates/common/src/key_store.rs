//! Persistence of the local identity's key pair.
//!
//! Only the private key is stored, as base64url text under
//! `e2ee_priv_{uid}` in [`LocalStorage`]. The public key is always recomputed
//! from it.
//!
//! A stored key that cannot be parsed is reported as
//! [`KeyStoreError::KeyLoad`] and left in place. Replacing it would make every
//! earlier conversation undecryptable, so that only happens through an
//! explicit [`KeyStore::reset_identity`].

use std::sync::Arc;

use crate::crypto::{KeyError, KeyPair, SecretKey};
use crate::store::{LocalStorage, StoreError};

const PRIVATE_KEY_PREFIX: &str = "e2ee_priv_";

/// Local storage key holding the private key of `uid`
pub fn private_key_item(uid: &str) -> String {
    format!("{}{}", PRIVATE_KEY_PREFIX, uid)
}

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    /// The stored key material is corrupt
    #[error("stored key for '{uid}' could not be loaded: {source}")]
    KeyLoad {
        uid: String,
        #[source]
        source: KeyError,
    },
    #[error("failed to generate key pair: {0}")]
    Generate(#[source] KeyError),
    #[error("local storage error: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct KeyStore<L> {
    storage: Arc<L>,
}

impl<L: LocalStorage> KeyStore<L> {
    pub fn new(storage: Arc<L>) -> Self {
        Self { storage }
    }

    /// Load the key pair for `uid`, generating and persisting one on first use
    pub async fn load_or_create_identity(&self, uid: &str) -> Result<KeyPair, KeyStoreError> {
        let item = private_key_item(uid);

        if let Some(stored) = self.storage.get_item(&item).await? {
            let secret = SecretKey::from_base64url(&stored).map_err(|source| {
                tracing::error!("stored E2EE key for {} is corrupt: {}", uid, source);
                KeyStoreError::KeyLoad {
                    uid: uid.to_string(),
                    source,
                }
            })?;
            let pair = KeyPair::from(secret);
            tracing::debug!(
                "loaded E2EE identity for {} ({})",
                uid,
                pair.public().fingerprint()
            );
            return Ok(pair);
        }

        self.generate(uid).await
    }

    /// Throw away the key pair for `uid` and start over
    ///
    /// Every message encrypted under the old key becomes undecryptable.
    pub async fn reset_identity(&self, uid: &str) -> Result<KeyPair, KeyStoreError> {
        self.storage.remove_item(&private_key_item(uid)).await?;
        tracing::warn!("E2EE identity for {} was reset", uid);
        self.generate(uid).await
    }

    async fn generate(&self, uid: &str) -> Result<KeyPair, KeyStoreError> {
        let pair = KeyPair::generate().map_err(KeyStoreError::Generate)?;
        self.storage
            .set_item(&private_key_item(uid), &pair.secret().to_base64url())
            .await?;
        tracing::info!(
            "generated E2EE identity for {} ({})",
            uid,
            pair.public().fingerprint()
        );
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLocalStorage;

    fn key_store() -> (KeyStore<MemoryLocalStorage>, MemoryLocalStorage) {
        let storage = MemoryLocalStorage::new();
        (KeyStore::new(Arc::new(storage.clone())), storage)
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let (keys, storage) = key_store();
        let first = keys.load_or_create_identity("u1").await.unwrap();
        let second = keys.load_or_create_identity("u1").await.unwrap();

        assert_eq!(first.public(), second.public());
        assert_eq!(*first.secret().to_bytes(), *second.secret().to_bytes());
        assert_eq!(storage.items().len(), 1);
    }

    #[tokio::test]
    async fn test_identities_are_per_user() {
        let (keys, storage) = key_store();
        let a = keys.load_or_create_identity("u1").await.unwrap();
        let b = keys.load_or_create_identity("u2").await.unwrap();
        assert_ne!(a.public(), b.public());
        assert!(storage.items().contains_key("e2ee_priv_u1"));
        assert!(storage.items().contains_key("e2ee_priv_u2"));
    }

    #[tokio::test]
    async fn test_public_key_is_recomputed_from_private() {
        let (keys, storage) = key_store();
        let pair = KeyPair::generate().unwrap();
        storage
            .set_item("e2ee_priv_u1", &pair.secret().to_base64url())
            .await
            .unwrap();

        let loaded = keys.load_or_create_identity("u1").await.unwrap();
        assert_eq!(loaded.public(), pair.public());
    }

    #[tokio::test]
    async fn test_corrupt_key_is_not_replaced() {
        let (keys, storage) = key_store();
        storage.set_item("e2ee_priv_u1", "c2hvcnQ").await.unwrap();

        let result = keys.load_or_create_identity("u1").await;
        assert!(matches!(result, Err(KeyStoreError::KeyLoad { .. })));

        let result = keys.load_or_create_identity("u1").await;
        assert!(matches!(result, Err(KeyStoreError::KeyLoad { .. })));
        assert_eq!(
            storage.get_item("e2ee_priv_u1").await.unwrap().as_deref(),
            Some("c2hvcnQ")
        );
    }

    #[tokio::test]
    async fn test_reset_replaces_key() {
        let (keys, storage) = key_store();
        storage.set_item("e2ee_priv_u1", "!!not base64!!").await.unwrap();
        assert!(keys.load_or_create_identity("u1").await.is_err());

        let fresh = keys.reset_identity("u1").await.unwrap();
        let loaded = keys.load_or_create_identity("u1").await.unwrap();
        assert_eq!(fresh.public(), loaded.public());

        let again = keys.reset_identity("u1").await.unwrap();
        assert_ne!(again.public(), fresh.public());
    }
}
