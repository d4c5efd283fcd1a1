//! Per-conversation encryption sessions.
//!
//! [`E2ee`] ties the key store, the key directory and the cipher together.
//! Once [`E2ee::setup`] has loaded (or created) the local identity and
//! published its public key, [`E2ee::open_conversation`] resolves the peer's
//! key and hands out a [`ConversationSession`] that seals outgoing and opens
//! incoming messages.
//!
//! A conversation whose peer has no usable key falls back to plaintext for
//! outgoing messages and shows [`UNDECRYPTABLE_PLACEHOLDER`] for incoming
//! ciphertext. Nothing on the message path returns a crypto error to the
//! caller.
//!
//! [`UNDECRYPTABLE_PLACEHOLDER`]: crate::message::UNDECRYPTABLE_PLACEHOLDER

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::E2eeConfig;
use crate::crypto::{EncryptionError, KeyPair, PublicKey, SharedSecret};
use crate::directory::{DirectoryError, KeyDirectory, PublishOutcome};
use crate::key_store::{KeyStore, KeyStoreError};
use crate::message::{ChatMessage, MessageBody, OutgoingMessage};
use crate::store::{KeyValueStore, LocalStorage};

pub const STATUS_SECURED: &str = "🔒 Encrypted (E2EE)";
pub const STATUS_UNSECURED: &str = "⚠️ Not encrypted (key missing)";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("failed to encrypt message: {0}")]
    Encryption(#[from] EncryptionError),
}

/// Why a conversation has no session key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Local identity was not set up in time
    IdentityNotReady,
    /// Peer never published a public key
    PeerKeyMissing,
    /// Peer's published key is not a usable X25519 key
    InvalidPeerKey,
    /// Directory read failed or timed out
    DirectoryUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    KeyUnavailable(UnavailableReason),
    Secured,
}

/// The local identity in use, as published to readiness waiters
#[derive(Debug)]
pub struct Identity {
    pub uid: String,
    pub key_pair: Arc<KeyPair>,
    /// Bumped whenever the key pair changes; sessions derived under an older
    /// epoch are stale
    pub epoch: u64,
}

/// Encryption state of one conversation
#[derive(Debug)]
pub struct ConversationSession {
    peer_uid: String,
    state: SessionState,
    secret: Option<SharedSecret>,
    epoch: u64,
    retain_plaintext: bool,
}

impl ConversationSession {
    /// A conversation that has not been opened yet
    pub fn uninitialized(peer_uid: impl Into<String>) -> Self {
        Self {
            peer_uid: peer_uid.into(),
            state: SessionState::Uninitialized,
            secret: None,
            epoch: 0,
            retain_plaintext: true,
        }
    }

    fn unavailable(peer_uid: &str, reason: UnavailableReason, config: &E2eeConfig) -> Self {
        Self {
            peer_uid: peer_uid.to_string(),
            state: SessionState::KeyUnavailable(reason),
            secret: None,
            epoch: 0,
            retain_plaintext: config.retain_plaintext,
        }
    }

    fn secured(peer_uid: &str, secret: SharedSecret, epoch: u64, config: &E2eeConfig) -> Self {
        Self {
            peer_uid: peer_uid.to_string(),
            state: SessionState::Secured,
            secret: Some(secret),
            epoch,
            retain_plaintext: config.retain_plaintext,
        }
    }

    pub fn peer_uid(&self) -> &str {
        &self.peer_uid
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_secured(&self) -> bool {
        self.state == SessionState::Secured
    }

    /// The session key, present only when secured
    pub fn shared_secret(&self) -> Option<&SharedSecret> {
        self.secret.as_ref()
    }

    /// Status line shown above the conversation
    pub fn status(&self) -> &'static str {
        if self.is_secured() {
            STATUS_SECURED
        } else {
            STATUS_UNSECURED
        }
    }

    /// Prepare an outgoing message
    ///
    /// Without a session key the message goes out as plaintext.
    pub fn seal(&self, text: &str) -> Result<OutgoingMessage, SessionError> {
        let Some(secret) = &self.secret else {
            tracing::debug!("no session key for {}, sending plaintext", self.peer_uid);
            return Ok(OutgoingMessage::plaintext(text));
        };

        let envelope = secret.encrypt(text)?;
        Ok(OutgoingMessage {
            text: self.retain_plaintext.then(|| text.to_string()),
            envelope: Some(envelope),
        })
    }

    /// Work out what to display for a received record
    ///
    /// Fails closed: ciphertext that cannot be authenticated under the
    /// session key is never shown, even if the record also carries `text`.
    pub fn open(&self, message: &ChatMessage) -> MessageBody {
        if !message.is_encrypted() {
            return MessageBody::Text(message.text.clone().unwrap_or_default());
        }

        let Some(secret) = &self.secret else {
            tracing::debug!(
                "encrypted message from {} but no session key",
                message.from_uid
            );
            return MessageBody::Undecryptable;
        };

        match message.envelope().and_then(|envelope| secret.decrypt(&envelope)) {
            Ok(text) => MessageBody::Text(text),
            Err(e) => {
                tracing::warn!("failed to decrypt message from {}: {}", message.from_uid, e);
                MessageBody::Undecryptable
            }
        }
    }
}

/// Encryption session manager for the local user
#[derive(Debug)]
pub struct E2ee<S, L> {
    key_store: KeyStore<L>,
    directory: KeyDirectory<S>,
    config: E2eeConfig,
    identity: watch::Sender<Option<Arc<Identity>>>,
    sessions: Mutex<HashMap<String, Arc<ConversationSession>>>,
}

impl<S: KeyValueStore, L: LocalStorage> E2ee<S, L> {
    pub fn new(store: Arc<S>, local_storage: Arc<L>, config: E2eeConfig) -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            key_store: KeyStore::new(local_storage),
            directory: KeyDirectory::new(store),
            config,
            identity,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &E2eeConfig {
        &self.config
    }

    pub fn directory(&self) -> &KeyDirectory<S> {
        &self.directory
    }

    /// The identity in use right now, without waiting
    pub fn identity(&self) -> Option<Arc<Identity>> {
        self.identity.borrow().clone()
    }

    /// Number of cached secured sessions
    pub fn cached_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Load (or create) the identity of `uid` and publish its public key
    ///
    /// The identity is marked ready before publishing, so a failed publish
    /// still leaves local decryption working. The publish error is returned.
    pub async fn setup(&self, uid: &str) -> Result<PublicKey, SessionError> {
        let key_pair = self.key_store.load_or_create_identity(uid).await?;
        let public_key = *key_pair.public();

        let changed = match self.identity() {
            Some(current) => current.uid != uid || current.key_pair.public() != &public_key,
            None => true,
        };
        if changed {
            self.install_identity(uid, key_pair);
        }

        if self.directory.publish_public_key(uid, &public_key).await? == PublishOutcome::Published {
            tracing::info!("E2EE ready for {}", uid);
        }
        Ok(public_key)
    }

    /// Discard the key pair of `uid` and start over with a fresh one
    ///
    /// Also the way out of a corrupt stored key. Every cached session is
    /// dropped and messages sealed under the old key can no longer be opened.
    pub async fn reset_identity(&self, uid: &str) -> Result<PublicKey, SessionError> {
        let key_pair = self.key_store.reset_identity(uid).await?;
        let public_key = *key_pair.public();
        self.install_identity(uid, key_pair);

        self.directory.publish_public_key(uid, &public_key).await?;
        Ok(public_key)
    }

    fn install_identity(&self, uid: &str, key_pair: KeyPair) {
        self.identity.send_modify(|current| {
            let epoch = current.as_ref().map(|i| i.epoch + 1).unwrap_or(1);
            *current = Some(Arc::new(Identity {
                uid: uid.to_string(),
                key_pair: Arc::new(key_pair),
                epoch,
            }));
        });
        self.sessions.lock().clear();
    }

    /// Wait until an identity is set up, for at most the directory timeout
    pub async fn ready(&self) -> Option<Arc<Identity>> {
        let mut rx = self.identity.subscribe();
        let wait = rx.wait_for(Option::is_some);
        let identity = match tokio::time::timeout(self.config.directory_timeout(), wait).await {
            Ok(Ok(identity)) => identity.clone(),
            _ => None,
        };
        identity
    }

    /// Resolve the encryption session for a conversation with `peer_uid`
    ///
    /// Secured sessions are cached until the conversation is closed or the
    /// identity is reset. Unavailable ones are not, so reopening retries the
    /// directory.
    pub async fn open_conversation(&self, peer_uid: &str) -> Arc<ConversationSession> {
        let Some(identity) = self.ready().await else {
            tracing::warn!("E2EE identity not ready, {} stays unencrypted", peer_uid);
            return Arc::new(ConversationSession::unavailable(
                peer_uid,
                UnavailableReason::IdentityNotReady,
                &self.config,
            ));
        };

        let cached = self.sessions.lock().get(peer_uid).cloned();
        if let Some(session) = cached {
            if session.epoch == identity.epoch {
                tracing::debug!("reusing E2EE session for {}", peer_uid);
                return session;
            }
        }

        let reason = match self.derive_session(&identity, peer_uid).await {
            Ok(session) => return session,
            Err(reason) => reason,
        };
        tracing::warn!("E2EE unavailable for {}: {:?}", peer_uid, reason);
        Arc::new(ConversationSession::unavailable(peer_uid, reason, &self.config))
    }

    async fn derive_session(
        &self,
        identity: &Identity,
        peer_uid: &str,
    ) -> Result<Arc<ConversationSession>, UnavailableReason> {
        let fetch = self.directory.fetch_peer_public_key(peer_uid);
        let peer_key = match tokio::time::timeout(self.config.directory_timeout(), fetch).await {
            Err(_) => {
                tracing::warn!("key directory lookup for {} timed out", peer_uid);
                return Err(UnavailableReason::DirectoryUnavailable);
            }
            Ok(Err(DirectoryError::Unavailable(e))) => {
                tracing::warn!("key directory lookup for {} failed: {}", peer_uid, e);
                return Err(UnavailableReason::DirectoryUnavailable);
            }
            Ok(Err(DirectoryError::InvalidKey { .. })) => {
                return Err(UnavailableReason::InvalidPeerKey)
            }
            Ok(Ok(None)) => return Err(UnavailableReason::PeerKeyMissing),
            Ok(Ok(Some(bytes))) => bytes,
        };

        let secret = SharedSecret::derive(identity.key_pair.secret(), &peer_key).map_err(|e| {
            tracing::warn!("cannot derive session key for {}: {}", peer_uid, e);
            UnavailableReason::InvalidPeerKey
        })?;
        let session = Arc::new(ConversationSession::secured(
            peer_uid,
            secret,
            identity.epoch,
            &self.config,
        ));

        // Skip caching if the identity was reset while we were fetching
        let current_epoch = self.identity().map(|i| i.epoch);
        if current_epoch == Some(identity.epoch) {
            self.sessions
                .lock()
                .insert(peer_uid.to_string(), session.clone());
        }
        tracing::debug!("E2EE session established with {}", peer_uid);
        Ok(session)
    }

    /// Forget the cached session key for `peer_uid`
    pub fn close_conversation(&self, peer_uid: &str) -> bool {
        self.sessions.lock().remove(peer_uid).is_some()
    }
}
