/**
 * Chat client built on the E2EE core.
 *  One active conversation, message fan-out,
 *  conversation list and presence.
 */
pub mod chat;
pub mod config;
/**
 * Cryptographic types and operations.
 *  - X25519 identity keys
 *  - Per-peer shared secrets
 *  - ChaCha20-Poly1305 message envelopes
 */
pub mod crypto;
/**
 * Public key exchange through the shared
 *  database (`users/{uid}/e2ee`).
 */
pub mod directory;
pub mod encoding;
/**
 * Local persistence of the identity key pair.
 */
pub mod key_store;
pub mod message;
pub mod notify;
/**
 * Per-conversation encryption sessions and
 *  the plaintext fallback policy.
 */
pub mod session;
/**
 * Collaborator interfaces for the realtime
 *  database and local storage, plus
 *  in-memory implementations.
 */
pub mod store;

pub mod prelude {
    pub use crate::chat::{ChatController, ChatError, LocalUser, SavedChat};
    pub use crate::config::E2eeConfig;
    pub use crate::crypto::{KeyPair, PublicKey, SecretKey, SharedSecret};
    pub use crate::message::{ChatMessage, Direction, MessageBody, RenderedMessage};
    pub use crate::notify::{NoopNotifier, Notifier, NotifyError, NotifyRequest};
    pub use crate::session::{ConversationSession, E2ee, SessionError, SessionState};
    pub use crate::store::{KeyValueStore, LocalStorage, StoreError, Subscription};
}
