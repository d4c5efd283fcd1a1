//! Collaborator interfaces for persistence.
//!
//! The E2EE core never talks to a database directly. It consumes two seams:
//!
//! - [`KeyValueStore`]: the shared realtime JSON database (key directory,
//!   message mailboxes, saved chats). Paths are `/`-separated, values are
//!   JSON, and a path can be subscribed to for live updates.
//! - [`LocalStorage`]: per-device string storage that holds the private key.
//!
//! [`MemoryStore`] and [`MemoryLocalStorage`] are in-process implementations
//! used by tests and as the engine behind file-backed stores.

mod memory;
mod subscription;
mod tree;

use async_trait::async_trait;
use serde_json::Value;

pub use memory::{MemoryLocalStorage, MemoryStore};
pub use subscription::Subscription;
pub use tree::{is_related, parse_path, resolve_server_values, server_timestamp, JsonTree};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path '{0}': {1}")]
    InvalidPath(String, String),
    /// The backend could not serve the request (offline, permission, ...)
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read the value at `path`
    ///
    /// # Returns
    /// * `Ok(None)` - Nothing is stored at the path
    /// * `Ok(Some(value))` - The subtree rooted at the path
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the subtree at `path`. Writing `Value::Null` removes it.
    ///
    /// Server timestamp sentinels (see [`server_timestamp`]) inside `value`
    ///  are resolved by the store.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Apply several writes atomically
    ///
    /// # Arguments
    /// * `updates` - `(path, value)` pairs, each applied as by [`Self::set`]
    ///
    /// Subscribers observe either none or all of the writes.
    async fn update(&self, updates: Vec<(String, Value)>) -> Result<(), StoreError>;

    /// Remove the subtree at `path`
    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, Value::Null).await
    }

    /// Subscribe to the value at `path`
    ///
    /// The current value is delivered immediately, then again after every
    ///  write that touches the path or anything below it. Dropping the
    ///  returned [`Subscription`] detaches it.
    fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;
}

#[async_trait]
pub trait LocalStorage: Send + Sync + std::fmt::Debug {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}
