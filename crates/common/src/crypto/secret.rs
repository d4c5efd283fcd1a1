//! Per-peer shared secrets and message sealing using ChaCha20-Poly1305
//!
//! A [`SharedSecret`] is the X25519 agreement between our private key and a
//! peer's public key. Both sides compute the same 32 bytes independently, so
//! it is never stored or transmitted. It keys the IETF ChaCha20-Poly1305 AEAD
//! for every message in the conversation:
//!
//! - a fresh random 96-bit nonce per message
//! - no associated data
//! - the 16-byte Poly1305 tag is carried separately as `mac`

use std::fmt;

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::envelope::{EncryptedEnvelope, ALGORITHM, ENVELOPE_VERSION, NONCE_SIZE, TAG_SIZE};
use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};

/// Size of a derived shared secret in bytes
pub const SHARED_SECRET_SIZE: usize = 32;

/// Errors that can occur while sealing a message
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("failed to generate nonce: {0}")]
    Rng(#[from] getrandom::Error),
    #[error("encrypt error")]
    Cipher,
}

/// Errors that can occur while opening a message
///
/// Every variant means "no plaintext": decryption fails closed.
#[derive(Debug, thiserror::Error)]
pub enum DecryptionError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("unsupported envelope version {version} / algorithm {algorithm}")]
    Unsupported { version: u32, algorithm: String },
    #[error("authentication tag mismatch")]
    Authentication,
    #[error("decrypted message is not valid UTF-8")]
    Utf8,
}

/// A 256-bit symmetric key agreed with a single peer
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Eq for SharedSecret {}

impl From<[u8; SHARED_SECRET_SIZE]> for SharedSecret {
    fn from(bytes: [u8; SHARED_SECRET_SIZE]) -> Self {
        SharedSecret(bytes)
    }
}

impl SharedSecret {
    /// Derive the secret shared with the owner of `peer_public_key`
    ///
    /// Pure and deterministic: `derive(a, B) == derive(b, A)`.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::InvalidKey` if the peer key is not exactly
    /// `PUBLIC_KEY_SIZE` bytes, or if it is a low-order point that would make
    /// the agreement independent of our private key.
    pub fn derive(private_key: &SecretKey, peer_public_key: &[u8]) -> Result<Self, KeyError> {
        if peer_public_key.len() != PUBLIC_KEY_SIZE {
            return Err(KeyError::InvalidKey(format!(
                "invalid peer public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                peer_public_key.len()
            )));
        }
        let peer = PublicKey::try_from(peer_public_key)?;
        let shared = private_key.diffie_hellman(&peer);
        if !shared.was_contributory() {
            return Err(KeyError::InvalidKey(
                "peer public key is a low-order point".to_string(),
            ));
        }
        Ok(Self(shared.to_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt a message under a fresh random nonce
    ///
    /// # Errors
    ///
    /// Returns an error only if the system RNG fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedEnvelope, EncryptionError> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce)?;
        self.encrypt_with_nonce(plaintext, nonce)
    }

    /// Encrypt a message under a caller-provided nonce
    ///
    /// Deterministic for a given (plaintext, key, nonce). A nonce must never
    /// be reused under the same secret; outside of tests use [`Self::encrypt`].
    pub fn encrypt_with_nonce(
        &self,
        plaintext: &str,
        nonce: [u8; NONCE_SIZE],
    ) -> Result<EncryptedEnvelope, EncryptionError> {
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher()
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| EncryptionError::Cipher)?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(tag.as_slice());

        Ok(EncryptedEnvelope {
            version: ENVELOPE_VERSION,
            algorithm: ALGORITHM.to_string(),
            nonce,
            ciphertext: buffer,
            tag: tag_bytes,
        })
    }

    /// Verify and decrypt an envelope
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The envelope version or algorithm is not supported
    /// - Authentication tag verification fails (tampered data or wrong key)
    /// - The recovered plaintext is not UTF-8
    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<String, DecryptionError> {
        if !envelope.is_supported() {
            return Err(DecryptionError::Unsupported {
                version: envelope.version,
                algorithm: envelope.algorithm.clone(),
            });
        }

        let mut buffer = envelope.ciphertext.clone();
        self.cipher()
            .decrypt_in_place_detached(
                Nonce::from_slice(&envelope.nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&envelope.tag),
            )
            .map_err(|_| DecryptionError::Authentication)?;

        String::from_utf8(buffer).map_err(|e| {
            e.into_bytes().zeroize();
            DecryptionError::Utf8
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;
    use crate::crypto::KeyPair;

    fn secret_from_hex(text: &str) -> SecretKey {
        let bytes: [u8; 32] = hex::decode(text).unwrap().try_into().unwrap();
        SecretKey::from(bytes)
    }

    #[test]
    fn test_rfc7748_agreement() {
        let alice = secret_from_hex("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a");
        let bob = secret_from_hex("5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb");
        let expected = hex::decode("4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742")
            .unwrap();

        let ab = SharedSecret::derive(&alice, bob.public().as_bytes()).unwrap();
        let ba = SharedSecret::derive(&bob, alice.public().as_bytes()).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_agreement_is_symmetric() {
        for _ in 0..16 {
            let a = KeyPair::generate().unwrap();
            let b = KeyPair::generate().unwrap();
            let ab = SharedSecret::derive(a.secret(), b.public().as_bytes()).unwrap();
            let ba = SharedSecret::derive(b.secret(), a.public().as_bytes()).unwrap();
            assert_eq!(ab, ba);
        }
    }

    #[test]
    fn test_derive_rejects_invalid_peer_keys() {
        let a = KeyPair::generate().unwrap();

        assert!(matches!(
            SharedSecret::derive(a.secret(), &[1u8; 31]),
            Err(KeyError::InvalidKey(_))
        ));
        assert!(matches!(
            SharedSecret::derive(a.secret(), &[]),
            Err(KeyError::InvalidKey(_))
        ));
        // The identity point yields an all-zero secret
        assert!(matches!(
            SharedSecret::derive(a.secret(), &[0u8; 32]),
            Err(KeyError::InvalidKey(_))
        ));
    }

    fn shared() -> SharedSecret {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        SharedSecret::derive(a.secret(), b.public().as_bytes()).unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = shared();
        let long = "x".repeat(4096);
        for text in ["", "ahoj", "zpráva s diakritikou 🔒", long.as_str()] {
            let envelope = key.encrypt(text).unwrap();
            assert_eq!(envelope.ciphertext.len(), text.len());
            assert_eq!(key.decrypt(&envelope).unwrap(), text);
        }
    }

    #[test]
    fn test_encrypt_with_nonce_is_deterministic() {
        let key = SharedSecret::from([42u8; SHARED_SECRET_SIZE]);
        let nonce = [7u8; NONCE_SIZE];
        let first = key.encrypt_with_nonce("hello", nonce).unwrap();
        let second = key.encrypt_with_nonce("hello", nonce).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.nonce, nonce);
    }

    #[test]
    fn test_every_bit_flip_is_detected() {
        let key = shared();
        let envelope = key.encrypt("tamper with me").unwrap();

        for byte in 0..envelope.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = envelope.clone();
                tampered.ciphertext[byte] ^= 1 << bit;
                assert!(matches!(
                    key.decrypt(&tampered),
                    Err(DecryptionError::Authentication)
                ));
            }
        }

        for byte in 0..TAG_SIZE {
            for bit in 0..8 {
                let mut tampered = envelope.clone();
                tampered.tag[byte] ^= 1 << bit;
                assert!(matches!(
                    key.decrypt(&tampered),
                    Err(DecryptionError::Authentication)
                ));
            }
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = shared().encrypt("for someone else").unwrap();
        assert!(matches!(
            shared().decrypt(&envelope),
            Err(DecryptionError::Authentication)
        ));
    }

    #[test]
    fn test_nonces_are_unique() {
        let key = shared();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let envelope = key.encrypt("same text").unwrap();
            assert!(seen.insert(envelope.nonce));
        }
        assert_eq!(seen.len(), 10_000);
    }

    #[test]
    fn test_unsupported_envelope_is_rejected() {
        let key = shared();
        let mut envelope = key.encrypt("v2?").unwrap();
        envelope.version = 2;
        assert!(matches!(
            key.decrypt(&envelope),
            Err(DecryptionError::Unsupported { version: 2, .. })
        ));

        let mut envelope = key.encrypt("other alg").unwrap();
        envelope.algorithm = "x25519+xsalsa20poly1305".to_string();
        assert!(matches!(
            key.decrypt(&envelope),
            Err(DecryptionError::Unsupported { .. })
        ));
    }
}
