use std::fmt;

use serde_json::Value;

type Detach = Box<dyn FnOnce() + Send + Sync>;

/// A live view of one path in a [`super::KeyValueStore`]
///
/// Each item is the full value at the path after a change, `None` when the
/// path is empty. The subscription is detached from the store when dropped.
pub struct Subscription {
    path: String,
    rx: flume::Receiver<Option<Value>>,
    detach: Option<Detach>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl Subscription {
    /// Build a subscription over a channel the store writes snapshots into
    ///
    /// `detach` runs exactly once, when the subscription is dropped.
    pub fn new(
        path: impl Into<String>,
        rx: flume::Receiver<Option<Value>>,
        detach: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into(),
            rx,
            detach: Some(Box::new(detach)),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wait for the next snapshot
    ///
    /// Returns `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.rx.recv_async().await.ok()
    }

    /// Take a snapshot that is already queued, without waiting
    pub fn try_next(&mut self) -> Option<Option<Value>> {
        self.rx.try_recv().ok()
    }

    /// Skip to the most recent queued snapshot, if any
    pub fn latest(&mut self) -> Option<Option<Value>> {
        self.rx.try_iter().last()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}
