//! Cryptographic primitives for GitMit end-to-end encryption
//!
//! - **Identity**: one X25519 key pair per local user (`KeyPair`)
//! - **Agreement**: X25519 Diffie-Hellman between our private key and a
//!   peer's published public key yields a `SharedSecret`
//! - **Messages**: ChaCha20-Poly1305 (IETF, 96-bit nonce) under the shared
//!   secret, packaged as an `EncryptedEnvelope`
//!
//! # Security Model
//!
//! The same shared secret keys every message between two users for as long
//! as neither resets their identity. There is no ratchet, so there is no
//! forward secrecy: compromise of either private key exposes the whole
//! conversation. Nonces are random per message, which is safe for the
//! message volumes of a chat.

mod envelope;
mod keys;
mod secret;

pub use envelope::{
    EncryptedEnvelope, EnvelopeFields, ALGORITHM, ENVELOPE_VERSION, NONCE_SIZE, TAG_SIZE,
};
pub use keys::{KeyError, KeyPair, PublicKey, SecretKey, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use secret::{DecryptionError, EncryptionError, SharedSecret, SHARED_SECRET_SIZE};
