//! The chat client: one open conversation at a time.
//!
//! [`ChatController`] owns the single active chat, meaning the peer, its
//! encryption session and the live subscription on our mailbox for that
//! peer. Switching chats replaces all three together. The old subscription
//! is detached before the new one is attached, so snapshots from a previous
//! chat can never be rendered under the new one.
//!
//! Database layout used here:
//!
//! ```text
//! usernames/{login lowercase}          -> uid
//! users/{uid}/login                    -> login
//! messages/{ownerUid}/{peerLogin}/{id} -> message record
//! savedChats/{uid}/{peerLogin}         -> { lastMessageText, lastMessageAt }
//! ```

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::message::{parse_mailbox, Direction, RenderedMessage};
use crate::notify::{Notifier, NotifyRequest};
use crate::session::{ConversationSession, SessionError, E2ee};
use crate::store::{server_timestamp, KeyValueStore, LocalStorage, StoreError, Subscription};

pub fn username_path(login: &str) -> String {
    format!("usernames/{}", login.to_lowercase())
}

pub fn mailbox_path(owner_uid: &str, peer_login: &str) -> String {
    format!("messages/{}/{}", owner_uid, peer_login)
}

pub fn saved_chats_path(uid: &str) -> String {
    format!("savedChats/{}", uid)
}

/// Fresh message id; ids sort in creation order
pub fn new_message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("'{0}' is not using GitMit yet")]
    UnknownUser(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub uid: String,
    pub login: String,
}

/// Entry of the conversation list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedChat {
    pub login: String,
    pub last_message_text: Option<String>,
    pub last_message_at: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedChatRecord {
    #[serde(default)]
    last_message_text: Option<String>,
    #[serde(default)]
    last_message_at: Option<i64>,
}

/// The conversation currently on screen
#[derive(Debug)]
pub struct ActiveChat {
    login: String,
    uid: String,
    session: Arc<ConversationSession>,
    subscription: Subscription,
}

impl ActiveChat {
    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }
}

pub struct ChatController<S, L> {
    store: Arc<S>,
    e2ee: Arc<E2ee<S, L>>,
    me: LocalUser,
    notifier: Arc<dyn Notifier>,
    active: Option<ActiveChat>,
}

impl<S, L> std::fmt::Debug for ChatController<S, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("me", &self.me)
            .field("active", &self.active.as_ref().map(|chat| &chat.login))
            .finish()
    }
}

impl<S: KeyValueStore, L: LocalStorage> ChatController<S, L> {
    pub fn new(
        store: Arc<S>,
        e2ee: Arc<E2ee<S, L>>,
        me: LocalUser,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            e2ee,
            me,
            notifier,
            active: None,
        }
    }

    pub fn me(&self) -> &LocalUser {
        &self.me
    }

    pub fn e2ee(&self) -> &E2ee<S, L> {
        &self.e2ee
    }

    pub fn active_chat(&self) -> Option<&ActiveChat> {
        self.active.as_ref()
    }

    /// Make the local user discoverable by login
    pub async fn register(&self) -> Result<(), ChatError> {
        self.store
            .update(vec![
                (username_path(&self.me.login), Value::from(self.me.uid.as_str())),
                (
                    format!("users/{}/login", self.me.uid),
                    Value::from(self.me.login.as_str()),
                ),
            ])
            .await?;
        tracing::info!("registered {} as {}", self.me.login, self.me.uid);
        Ok(())
    }

    /// Look up the uid behind a GitHub login
    pub async fn resolve_login(&self, login: &str) -> Result<Option<String>, ChatError> {
        let value = self.store.get(&username_path(login)).await?;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Open a chat with a user known only by login
    pub async fn start_chat_with_login(
        &mut self,
        login: &str,
    ) -> Result<Arc<ConversationSession>, ChatError> {
        let Some(uid) = self.resolve_login(login).await? else {
            tracing::warn!("{} not found in usernames", login);
            return Err(ChatError::UnknownUser(login.to_string()));
        };
        self.select_chat(login, &uid).await
    }

    /// Make the chat with `login` / `uid` the active one
    ///
    /// The previous chat is closed first: its listener is detached and its
    /// session key dropped.
    pub async fn select_chat(
        &mut self,
        login: &str,
        uid: &str,
    ) -> Result<Arc<ConversationSession>, ChatError> {
        self.close_chat();

        let session = self.e2ee.open_conversation(uid).await;
        tracing::info!("chat with {}: {}", login, session.status());

        let subscription = self.store.subscribe(&mailbox_path(&self.me.uid, login))?;
        self.active = Some(ActiveChat {
            login: login.to_string(),
            uid: uid.to_string(),
            session: session.clone(),
            subscription,
        });
        Ok(session)
    }

    /// Leave the active chat, detaching its listener and forgetting its key
    pub fn close_chat(&mut self) {
        if let Some(chat) = self.active.take() {
            self.e2ee.close_conversation(&chat.uid);
            tracing::debug!("closing chat with {}", chat.login);
        }
    }

    /// Send `text` to the active chat
    ///
    /// Blank text, or no active chat, is ignored and returns `Ok(None)`.
    /// Both mailboxes and both conversation list entries are written in one
    /// atomic update.
    pub async fn send_message(&self, text: &str) -> Result<Option<String>, ChatError> {
        let text = text.trim();
        let Some(chat) = &self.active else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }

        let outgoing = chat.session.seal(text)?;
        let record = outgoing.to_record(&self.me.uid);
        let preview = Value::from(outgoing.preview());
        let id = new_message_id();

        let ours = format!("{}/{}", saved_chats_path(&self.me.uid), chat.login);
        let theirs = format!("{}/{}", saved_chats_path(&chat.uid), self.me.login);
        let updates = vec![
            (
                format!("{}/{}", mailbox_path(&self.me.uid, &chat.login), id),
                record.clone(),
            ),
            (
                format!("{}/{}", mailbox_path(&chat.uid, &self.me.login), id),
                record,
            ),
            (format!("{}/lastMessageText", ours), preview.clone()),
            (format!("{}/lastMessageAt", ours), server_timestamp()),
            (format!("{}/lastMessageText", theirs), preview),
            (format!("{}/lastMessageAt", theirs), server_timestamp()),
        ];

        self.store.update(updates).await?;
        tracing::debug!(
            "sent message {} to {} (encrypted: {})",
            id,
            chat.login,
            outgoing.is_encrypted()
        );
        Ok(Some(id))
    }

    /// Wait for the next state of the active mailbox and render it
    ///
    /// Returns `None` when there is no active chat or its subscription ended.
    pub async fn next_messages(&mut self) -> Option<Vec<RenderedMessage>> {
        let chat = self.active.as_mut()?;
        let snapshot = chat.subscription.next().await?;
        Some(self.render_snapshot(snapshot.as_ref()))
    }

    /// Render a mailbox snapshot under the active session
    pub fn render_snapshot(&self, snapshot: Option<&Value>) -> Vec<RenderedMessage> {
        let Some(chat) = &self.active else {
            return Vec::new();
        };

        parse_mailbox(snapshot)
            .into_iter()
            .map(|(id, message)| {
                let direction = if message.from_uid == self.me.uid {
                    Direction::Sent
                } else {
                    Direction::Received
                };
                RenderedMessage {
                    id,
                    direction,
                    body: chat.session.open(&message),
                    created_at: message.created_at,
                }
            })
            .collect()
    }

    /// The conversation list, most recent first
    pub async fn saved_chats(&self) -> Result<Vec<SavedChat>, ChatError> {
        let Some(Value::Object(entries)) = self.store.get(&saved_chats_path(&self.me.uid)).await?
        else {
            return Ok(Vec::new());
        };

        let mut chats: Vec<SavedChat> = entries
            .into_iter()
            .map(|(login, value)| {
                let record: SavedChatRecord = serde_json::from_value(value).unwrap_or_default();
                SavedChat {
                    login,
                    last_message_text: record.last_message_text,
                    last_message_at: record.last_message_at,
                }
            })
            .collect();
        chats.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(chats)
    }

    /// Tell everyone in the conversation list that we are online
    ///
    /// Best effort: failed lookups and failed notifications are logged and
    /// skipped. Returns how many notifications were accepted.
    pub async fn announce_presence(&self) -> Result<usize, ChatError> {
        let mut delivered = 0;
        for chat in self.saved_chats().await? {
            let to_uid = match self.resolve_login(&chat.login).await {
                Ok(Some(uid)) => uid,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("cannot resolve {}: {}", chat.login, e);
                    continue;
                }
            };

            let request = NotifyRequest {
                to_uid,
                from_uid: self.me.uid.clone(),
                from_login: self.me.login.clone(),
            };
            match self.notifier.notify_online(request).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!("presence notification to {} failed: {}", chat.login, e),
            }
        }
        Ok(delivered)
    }
}
