//! JSON-file backed stores for running the client on one machine.
//!
//! [`FileStore`] keeps the whole "shared" database in `db.json` and
//! [`FileLocalStorage`] keeps device-local items (private keys) in
//! `local.json`. Each wraps the in-memory engine from `common::store` and
//! rewrites its file after every successful write. Several processes may use
//! the same files; the last writer wins, and subscriptions only see writes
//! made through the same process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use common::store::{
    KeyValueStore, LocalStorage, MemoryLocalStorage, MemoryStore, StoreError, Subscription,
};

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Create a fresh, empty temporary file next to `path`
///
/// A `private` file is owner-only (0600 on unix) from the moment it exists.
async fn create_tmp(path: &Path, private: bool) -> Result<(PathBuf, File), StoreError> {
    let tmp = tmp_path(path);
    // A leftover from an interrupted write may carry other permissions
    match tokio::fs::remove_file(&tmp).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let file = options.open(&tmp).await?;
    Ok((tmp, file))
}

/// Replace `path` with `contents` without leaving a half-written file behind
async fn write_atomic(path: &Path, contents: &[u8], private: bool) -> Result<(), StoreError> {
    let (tmp, mut file) = create_tmp(path, private).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Serializes file rewrites
    persist: Mutex<()>,
}

impl FileStore {
    /// Load the database at `path`; a missing file is an empty database
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let root = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Null,
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("opened database {}", path.display());

        Ok(Self {
            path,
            inner: MemoryStore::from_value(root),
            persist: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist.lock().await;
        let contents = serde_json::to_vec_pretty(&self.inner.snapshot())?;
        write_atomic(&self.path, &contents, false).await
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(path, value).await?;
        self.persist().await
    }

    async fn update(&self, updates: Vec<(String, Value)>) -> Result<(), StoreError> {
        self.inner.update(updates).await?;
        self.persist().await
    }

    fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(path)
    }
}

#[derive(Debug)]
pub struct FileLocalStorage {
    path: PathBuf,
    inner: MemoryLocalStorage,
    persist: Mutex<()>,
}

impl FileLocalStorage {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let items: HashMap<String, String> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            inner: MemoryLocalStorage::from_items(items),
            persist: Mutex::new(()),
        })
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist.lock().await;
        let contents = serde_json::to_vec_pretty(&self.inner.items())?;
        // Holds private keys
        write_atomic(&self.path, &contents, true).await
    }
}

#[async_trait]
impl LocalStorage for FileLocalStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set_item(key, value).await?;
        self.persist().await
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove_item(key).await?;
        self.persist().await
    }
}
