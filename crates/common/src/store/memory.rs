use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::subscription::Subscription;
use super::tree::{is_related, parse_path, resolve_server_values, JsonTree};
use super::{KeyValueStore, LocalStorage, StoreError};

/// In-memory realtime store over a single JSON tree
///
/// Cloning shares the underlying tree, so several clients in one process can
/// talk to "the same database". Besides the store contract it offers a few
/// knobs for exercising failure paths: an offline switch, artificial read
/// latency, and a write counter.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    tree: JsonTree,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    /// Number of successful `set` / `update` calls
    writes: u64,
    offline: bool,
    latency: Option<Duration>,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    path: Vec<String>,
    tx: flume::Sender<Option<Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document
    pub fn from_value(root: Value) -> Self {
        let store = Self::default();
        store.inner.lock().tree = JsonTree::new(root);
        store
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> Value {
        self.inner.lock().tree.root().clone()
    }

    pub fn write_count(&self) -> u64 {
        self.inner.lock().writes
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Make every subsequent call fail with `StoreError::Backend`
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Delay every read by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.inner.lock().latency = latency;
    }

    async fn before_call(&self) -> Result<(), StoreError> {
        let (offline, latency) = {
            let inner = self.inner.lock();
            (inner.offline, inner.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(StoreError::Backend("store is offline".to_string()));
        }
        Ok(())
    }

    fn apply(&self, writes: Vec<(Vec<String>, Value)>) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut inner = self.inner.lock();

        for (path, value) in &writes {
            let value = resolve_server_values(value.clone(), now_ms);
            inner.tree.set(path, value);
        }
        inner.writes += 1;

        let MemoryStoreInner {
            tree, subscribers, ..
        } = &mut *inner;
        subscribers.retain(|subscriber| {
            let touched = writes
                .iter()
                .any(|(path, _)| is_related(path, &subscriber.path));
            if !touched {
                return true;
            }
            subscriber
                .tx
                .send(tree.get(&subscriber.path).cloned())
                .is_ok()
        });
    }
}

fn detach(inner: Weak<Mutex<MemoryStoreInner>>, id: u64) {
    if let Some(inner) = inner.upgrade() {
        inner.lock().subscribers.retain(|s| s.id != id);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = parse_path(path)?;
        self.before_call().await?;
        Ok(self.inner.lock().tree.get(&path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = parse_path(path)?;
        self.before_call().await?;
        self.apply(vec![(path, value)]);
        Ok(())
    }

    async fn update(&self, updates: Vec<(String, Value)>) -> Result<(), StoreError> {
        let writes = updates
            .into_iter()
            .map(|(path, value)| Ok((parse_path(&path)?, value)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.before_call().await?;
        self.apply(writes);
        Ok(())
    }

    fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let segments = parse_path(path)?;
        let (tx, rx) = flume::unbounded();

        let mut inner = self.inner.lock();
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;

        // Deliver the current value right away
        let _ = tx.send(inner.tree.get(&segments).cloned());
        inner.subscribers.push(Subscriber {
            id,
            path: segments,
            tx,
        });

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(path, rx, move || detach(weak, id)))
    }
}

/// In-memory [`LocalStorage`]
#[derive(Debug, Clone, Default)]
pub struct MemoryLocalStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryLocalStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: HashMap<String, String>) -> Self {
        Self {
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// Copy of every stored item
    pub fn items(&self) -> HashMap<String, String> {
        self.items.read().clone()
    }
}

#[async_trait]
impl LocalStorage for MemoryLocalStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        self.items.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::server_timestamp;

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = MemoryStore::new();
        assert!(store.get("users/u1/e2ee").await.unwrap().is_none());

        store
            .set("users/u1/e2ee", json!({ "v": 1, "x25519": "key" }))
            .await
            .unwrap();
        assert_eq!(
            store.get("users/u1/e2ee/x25519").await.unwrap(),
            Some(json!("key"))
        );

        store.remove("users/u1/e2ee").await.unwrap();
        assert!(store.get("users/u1").await.unwrap().is_none());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_server_timestamp_is_resolved() {
        let store = MemoryStore::new();
        store
            .set("a", json!({ "at": server_timestamp() }))
            .await
            .unwrap();
        let at = store.get("a/at").await.unwrap().unwrap();
        assert!(at.as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_update_is_atomic_for_subscribers() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("messages/u1").unwrap();
        assert_eq!(sub.next().await, Some(None));

        store
            .update(vec![
                ("messages/u1/bob/m1".to_string(), json!({ "text": "hi" })),
                ("messages/u2/alice/m1".to_string(), json!({ "text": "hi" })),
                ("savedChats/u1/bob/lastMessageText".to_string(), json!("hi")),
            ])
            .await
            .unwrap();

        // One notification carrying the finished write
        let value = sub.next().await.unwrap().unwrap();
        assert_eq!(value, json!({ "bob": { "m1": { "text": "hi" } } }));
        assert!(sub.try_next().is_none());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_writes_do_not_notify() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("messages/u1/bob").unwrap();
        sub.next().await;

        store.set("messages/u1/carol/m1", json!(1)).await.unwrap();
        assert!(sub.try_next().is_none());

        store.set("messages", Value::Null).await.unwrap();
        assert_eq!(sub.try_next(), Some(None));
    }

    #[tokio::test]
    async fn test_drop_detaches() {
        let store = MemoryStore::new();
        let first = store.subscribe("a").unwrap();
        let second = store.subscribe("b").unwrap();
        assert_eq!(store.subscriber_count(), 2);

        drop(first);
        assert_eq!(store.subscriber_count(), 1);
        second.unsubscribe();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.get("a").await,
            Err(StoreError::Backend(_))
        ));
        assert!(matches!(
            store.set("a", json!(1)).await,
            Err(StoreError::Backend(_))
        ));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_path_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.get("users/a.b").await,
            Err(StoreError::InvalidPath(_, _))
        ));
        assert!(store.subscribe("x//y").is_err());
    }

    #[tokio::test]
    async fn test_local_storage() {
        let storage = MemoryLocalStorage::new();
        assert!(storage.get_item("e2ee_priv_u1").await.unwrap().is_none());
        storage.set_item("e2ee_priv_u1", "secret").await.unwrap();
        assert_eq!(
            storage.get_item("e2ee_priv_u1").await.unwrap().as_deref(),
            Some("secret")
        );
        storage.remove_item("e2ee_priv_u1").await.unwrap();
        assert!(storage.items().is_empty());
    }
}
