use std::sync::Arc;

use common::chat::{username_path, ChatController, ChatError, LocalUser};
use common::crypto::PublicKey;
use common::notify::{NoopNotifier, Notifier};
use common::session::{E2ee, SessionError};
use common::store::{KeyValueStore, StoreError};

use crate::notifier::HttpNotifier;
use crate::op::OpContext;
use crate::state::{AppState, StateError};
use crate::store::{FileLocalStorage, FileStore};

pub type AppE2ee = E2ee<FileStore, FileLocalStorage>;
pub type AppChat = ChatController<FileStore, FileLocalStorage>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("no login given. Pass --as <login> or run 'gitmit register' first")]
    NoLogin,
    #[error("'{0}' is not registered. Run 'gitmit register' first")]
    UnknownLogin(String),
    #[error("invalid relay URL: {0}")]
    RelayUrl(#[from] url::ParseError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Everything an operation needs to act as one local user
pub struct Client {
    pub state: AppState,
    pub e2ee: Arc<AppE2ee>,
    pub chat: AppChat,
}

impl Client {
    /// Open the state directory and both stores, without picking a user
    pub async fn open_stores(
        ctx: &OpContext,
    ) -> Result<(AppState, Arc<FileStore>, Arc<FileLocalStorage>), ClientError> {
        let state = AppState::load(ctx.config_path.clone())?;
        let store = Arc::new(FileStore::open(&state.db_path).await?);
        let local = Arc::new(FileLocalStorage::open(&state.local_path).await?);
        Ok((state, store, local))
    }

    /// Open a client for the user selected by `--as` or the configured default
    pub async fn open(ctx: &OpContext) -> Result<Self, ClientError> {
        let (state, store, local) = Self::open_stores(ctx).await?;

        let login = ctx
            .as_login
            .clone()
            .or_else(|| state.config.default_login.clone())
            .ok_or(ClientError::NoLogin)?;
        let uid = store
            .get(&username_path(&login))
            .await?
            .and_then(|value| value.as_str().map(str::to_string))
            .ok_or_else(|| ClientError::UnknownLogin(login.clone()))?;

        let me = LocalUser { uid, login };
        Self::build(state, store, local, me)
    }

    /// Assemble a client for a known user
    pub fn build(
        state: AppState,
        store: Arc<FileStore>,
        local: Arc<FileLocalStorage>,
        me: LocalUser,
    ) -> Result<Self, ClientError> {
        let e2ee: Arc<AppE2ee> = Arc::new(E2ee::new(
            store.clone(),
            local,
            state.config.e2ee.clone(),
        ));
        let notifier = notifier(&state)?;
        let chat = ChatController::new(store, e2ee.clone(), me, notifier);

        Ok(Self {
            state,
            e2ee,
            chat,
        })
    }

    pub fn me(&self) -> &LocalUser {
        self.chat.me()
    }

    /// Load the identity and publish it
    ///
    /// A failed publish is logged and tolerated; the identity is usable
    /// locally either way. A corrupt stored key is returned as an error.
    pub async fn setup(&self) -> Result<PublicKey, ClientError> {
        match self.e2ee.setup(&self.me().uid).await {
            Ok(public_key) => Ok(public_key),
            Err(SessionError::Directory(e)) => {
                tracing::warn!("could not publish public key: {}", e);
                self.e2ee
                    .identity()
                    .map(|identity| *identity.key_pair.public())
                    .ok_or(ClientError::Session(SessionError::Directory(e)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn notifier(state: &AppState) -> Result<Arc<dyn Notifier>, ClientError> {
    Ok(match &state.config.relay_url {
        Some(url) => Arc::new(HttpNotifier::new(
            url,
            state.config.relay_api_key.clone(),
        )?),
        None => Arc::new(NoopNotifier),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::op::Op;
    use crate::ops::chat::read::ReadMessages;
    use crate::ops::chat::send::SendMessage;
    use crate::ops::identity::reset::{Reset, ResetError};
    use crate::ops::{Chats, Init, Register};

    fn ctx(dir: &Path, login: Option<&str>) -> OpContext {
        OpContext::new(Some(dir.to_path_buf()), login.map(str::to_string))
    }

    async fn register(dir: &Path, uid: &str, login: &str) {
        Register {
            uid: uid.to_string(),
            login: login.to_string(),
        }
        .execute(&ctx(dir, None))
        .await
        .unwrap();
    }

    async fn init(dir: &Path) {
        Init {
            relay_url: None,
            relay_api_key: None,
            no_plaintext: false,
        }
        .execute(&ctx(dir, None))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_two_users_on_one_machine() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path();
        init(dir).await;
        register(dir, "u1", "alice").await;
        register(dir, "u2", "bob").await;

        // First registered login becomes the default
        let client = Client::open(&ctx(dir, None)).await.unwrap();
        assert_eq!(client.me().login, "alice");

        let sent = SendMessage {
            login: "bob".to_string(),
            text: vec!["hello".to_string(), "bob".to_string()],
        }
        .execute(&ctx(dir, None))
        .await
        .unwrap();
        assert!(sent.contains("Encrypted (E2EE)"));

        let read = ReadMessages {
            login: "alice".to_string(),
            limit: None,
        }
        .execute(&ctx(dir, Some("bob")))
        .await
        .unwrap();
        assert!(read.contains("< hello bob"));

        let chats = Chats {}.execute(&ctx(dir, Some("bob"))).await.unwrap();
        assert_eq!(chats, "alice: hello bob");

        // Ciphertext is on disk next to the retained plaintext
        let db: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("db.json")).unwrap()).unwrap();
        let mailbox = db["messages"]["u2"]["alice"].as_object().unwrap();
        let record = mailbox.values().next().unwrap();
        assert!(record["ciphertext"].is_string());
        assert_eq!(record["text"], "hello bob");
    }

    #[tokio::test]
    async fn test_unknown_login() {
        let temp = tempfile::TempDir::new().unwrap();
        init(temp.path()).await;

        assert!(matches!(
            Client::open(&ctx(temp.path(), None)).await,
            Err(ClientError::NoLogin)
        ));
        assert!(matches!(
            Client::open(&ctx(temp.path(), Some("ghost"))).await,
            Err(ClientError::UnknownLogin(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_requires_confirmation() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path();
        init(dir).await;
        register(dir, "u1", "alice").await;
        let before = Client::open(&ctx(dir, None)).await.unwrap().setup().await.unwrap();

        assert!(matches!(
            Reset { yes: false }.execute(&ctx(dir, None)).await,
            Err(ResetError::NotConfirmed)
        ));
        Reset { yes: true }.execute(&ctx(dir, None)).await.unwrap();

        let after = Client::open(&ctx(dir, None)).await.unwrap().setup().await.unwrap();
        assert_ne!(before, after);
    }
}
