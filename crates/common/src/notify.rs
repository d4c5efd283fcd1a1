//! Presence notifications pushed to a peer through an external relay.
//!
//! Delivery is best effort. Callers fire the request and log failures; a
//! notification never blocks or fails a chat operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Body of a "user came online" notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub to_uid: String,
    pub from_uid: String,
    pub from_login: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("relay rejected notification with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync + std::fmt::Debug {
    async fn notify_online(&self, request: NotifyRequest) -> Result<(), NotifyError>;
}

/// Drops every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_online(&self, request: NotifyRequest) -> Result<(), NotifyError> {
        tracing::trace!("dropping online notification for {}", request.to_uid);
        Ok(())
    }
}
