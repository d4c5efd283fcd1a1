//! Shared test utilities: several users talking through one in-memory store
#![allow(dead_code)]

use std::sync::Arc;

use ::common::prelude::*;
use ::common::store::{MemoryLocalStorage, MemoryStore};

pub type TestE2ee = E2ee<MemoryStore, MemoryLocalStorage>;
pub type TestController = ChatController<MemoryStore, MemoryLocalStorage>;

/// One user of the shared store, with their own device storage
pub struct Peer {
    pub uid: String,
    pub login: String,
    pub local: MemoryLocalStorage,
    pub e2ee: Arc<TestE2ee>,
}

impl Peer {
    /// A user whose identity is not set up yet
    pub fn new(store: &MemoryStore, uid: &str, login: &str) -> Self {
        Self::with_config(store, uid, login, E2eeConfig::default())
    }

    pub fn with_config(store: &MemoryStore, uid: &str, login: &str, config: E2eeConfig) -> Self {
        let local = MemoryLocalStorage::new();
        let e2ee = Arc::new(E2ee::new(
            Arc::new(store.clone()),
            Arc::new(local.clone()),
            config,
        ));
        Self {
            uid: uid.to_string(),
            login: login.to_string(),
            local,
            e2ee,
        }
    }

    /// A user who has run E2EE setup
    pub async fn ready(store: &MemoryStore, uid: &str, login: &str) -> Self {
        let peer = Self::new(store, uid, login);
        peer.e2ee.setup(uid).await.unwrap();
        peer
    }

    /// A registered chat client for this user
    pub async fn controller(&self, store: &MemoryStore) -> TestController {
        let me = LocalUser {
            uid: self.uid.clone(),
            login: self.login.clone(),
        };
        let controller =
            ChatController::new(Arc::new(store.clone()), self.e2ee.clone(), me, Arc::new(NoopNotifier));
        controller.register().await.unwrap();
        controller
    }
}

/// Read back one mailbox record as stored
pub fn record(store: &MemoryStore, owner_uid: &str, peer_login: &str, id: &str) -> serde_json::Value {
    store.snapshot()["messages"][owner_uid][peer_login][id].clone()
}
