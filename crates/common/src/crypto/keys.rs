use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::encoding::{from_base64url, to_base64url, DecodeError};

/// Size of an X25519 private key in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of an X25519 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Key material has the wrong shape or cannot be used for agreement
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("base64url decode error: {0}")]
    Encoding(#[from] DecodeError),
    #[error("failed to gather randomness: {0}")]
    Rng(#[from] getrandom::Error),
}

/// Public half of an identity's X25519 key pair
///
/// This is the value published to the shared key directory so that peers can
/// derive a shared secret with us. It carries no secret information and is
/// freely copyable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl From<[u8; PUBLIC_KEY_SIZE]> for PublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = KeyError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            KeyError::InvalidKey(format!(
                "invalid public key size, expected {}, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(bytes.into())
    }
}

impl PublicKey {
    /// Parse a public key from base64url text
    pub fn from_base64url(text: &str) -> Result<Self, KeyError> {
        let bytes = from_base64url(text)?;
        Self::try_from(bytes.as_slice())
    }

    /// Encode the public key as base64url text, the directory's wire form
    pub fn to_base64url(&self) -> String {
        to_base64url(self.0)
    }

    /// Convert public key to raw bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Short hex fingerprint for display and logs
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.0[..8])
    }

    pub(crate) fn to_x25519(self) -> X25519PublicKey {
        X25519PublicKey::from(self.0)
    }
}

/// Private half of an identity's X25519 key pair
///
/// Never leaves the device. The only serialized form is the base64url text
/// written to local storage by the key store.
///
/// # Security Considerations
///
/// - The underlying scalar is zeroized on drop
/// - `Debug` output is redacted
#[derive(Clone)]
pub struct SecretKey(StaticSecret);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl From<[u8; PRIVATE_KEY_SIZE]> for SecretKey {
    fn from(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        Self(StaticSecret::from(secret))
    }
}

impl SecretKey {
    /// Generate a new random secret key using the operating system CSPRNG
    pub fn generate() -> Result<Self, KeyError> {
        let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
        getrandom::getrandom(&mut bytes[..])?;
        Ok(Self::from(*bytes))
    }

    /// Parse a secret key from base64url text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not base64url or does not decode to
    /// exactly `PRIVATE_KEY_SIZE` bytes.
    pub fn from_base64url(text: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(from_base64url(text)?);
        let bytes: [u8; PRIVATE_KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            KeyError::InvalidKey(format!(
                "invalid private key size, expected {}, got {}",
                PRIVATE_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self::from(bytes))
    }

    /// Encode the secret key as base64url text for local persistence
    pub fn to_base64url(&self) -> Zeroizing<String> {
        Zeroizing::new(to_base64url(self.to_bytes().as_slice()))
    }

    /// Derive the public key by scalar multiplication with the base point
    pub fn public(&self) -> PublicKey {
        PublicKey(X25519PublicKey::from(&self.0).to_bytes())
    }

    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        Zeroizing::new(self.0.to_bytes())
    }

    pub(crate) fn diffie_hellman(&self, peer: &PublicKey) -> x25519_dalek::SharedSecret {
        self.0.diffie_hellman(&peer.to_x25519())
    }
}

/// The local identity's key pair
///
/// The public key is always recomputed from the secret key, so the two
/// halves can never disagree.
#[derive(Clone, Debug)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl From<SecretKey> for KeyPair {
    fn from(secret: SecretKey) -> Self {
        let public = secret.public();
        Self { secret, public }
    }
}

impl KeyPair {
    /// Generate a fresh random key pair
    pub fn generate() -> Result<Self, KeyError> {
        Ok(SecretKey::generate()?.into())
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rng_failure_keeps_its_source() {
        use std::error::Error;

        let err = KeyError::from(getrandom::Error::UNSUPPORTED);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("failed to gather randomness"));

        let err = crate::crypto::EncryptionError::from(getrandom::Error::UNSUPPORTED);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_keypair_generation() {
        let pair = KeyPair::generate().unwrap();

        let private_text = pair.secret().to_base64url();
        let recovered = SecretKey::from_base64url(&private_text).unwrap();
        assert_eq!(*pair.secret().to_bytes(), *recovered.to_bytes());
        assert_eq!(pair.public(), &recovered.public());

        let public_text = pair.public().to_base64url();
        let recovered_public = PublicKey::from_base64url(&public_text).unwrap();
        assert_eq!(pair.public(), &recovered_public);
    }

    #[test]
    fn test_public_key_is_base_point_multiple() {
        // RFC 7748 section 6.1, Alice's key pair
        let private = hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
            .unwrap();
        let expected = hex::decode("8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a")
            .unwrap();

        let private: [u8; PRIVATE_KEY_SIZE] = private.try_into().unwrap();
        let secret = SecretKey::from(private);
        assert_eq!(secret.public().as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn test_size_validation() {
        let short = crate::encoding::to_base64url([7u8; 16]);
        assert!(matches!(
            SecretKey::from_base64url(&short),
            Err(KeyError::InvalidKey(_))
        ));
        assert!(matches!(
            PublicKey::from_base64url(&short),
            Err(KeyError::InvalidKey(_))
        ));
        assert!(matches!(
            PublicKey::from_base64url("not base64 at all!"),
            Err(KeyError::Encoding(_))
        ));
    }

    #[test]
    fn test_debug_is_redacted() {
        let pair = KeyPair::generate().unwrap();
        let printed = format!("{:?}", pair);
        let private_text = pair.secret().to_base64url();
        assert!(!printed.contains(private_text.trim_end_matches('=')));
        assert!(printed.contains("SecretKey(..)"));
    }
}
