//! Versioned container for an encrypted chat message.
//!
//! The envelope lives in two forms:
//!
//! - [`EncryptedEnvelope`] holds raw bytes and is what the cipher produces
//!   and consumes.
//! - [`EnvelopeFields`] is the wire form stored next to (or instead of) the
//!   plaintext `text` field of a message record:
//!
//! ```text
//! { "e2eeV": 1, "alg": "x25519+chacha20poly1305",
//!   "nonce": <base64url>, "ciphertext": <base64url>, "mac": <base64url> }
//! ```

use serde::{Deserialize, Serialize};

use super::secret::DecryptionError;
use crate::encoding::{from_base64url, to_base64url};

/// Size of ChaCha20-Poly1305 (IETF) nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;
/// Current envelope format version
pub const ENVELOPE_VERSION: u32 = 1;
/// Algorithm identifier written into every envelope
pub const ALGORITHM: &str = "x25519+chacha20poly1305";

/// An authenticated ciphertext plus everything needed to open it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub version: u32,
    pub algorithm: String,
    pub nonce: [u8; NONCE_SIZE],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

/// Wire form of an envelope, flattened into a message record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeFields {
    #[serde(rename = "e2eeV")]
    pub version: u32,
    #[serde(rename = "alg")]
    pub algorithm: String,
    pub nonce: String,
    pub ciphertext: String,
    pub mac: String,
}

impl EncryptedEnvelope {
    /// Whether this build knows how to open the envelope
    pub fn is_supported(&self) -> bool {
        self.version == ENVELOPE_VERSION && self.algorithm == ALGORITHM
    }

    pub fn to_fields(&self) -> EnvelopeFields {
        EnvelopeFields {
            version: self.version,
            algorithm: self.algorithm.clone(),
            nonce: to_base64url(self.nonce),
            ciphertext: to_base64url(&self.ciphertext),
            mac: to_base64url(self.tag),
        }
    }

    /// Decode the wire form
    ///
    /// # Errors
    ///
    /// Returns `DecryptionError::Malformed` if any binary field is not
    /// base64url or the nonce / tag have the wrong length.
    pub fn from_fields(fields: &EnvelopeFields) -> Result<Self, DecryptionError> {
        let nonce = decode_fixed::<NONCE_SIZE>("nonce", &fields.nonce)?;
        let tag = decode_fixed::<TAG_SIZE>("mac", &fields.mac)?;
        let ciphertext = from_base64url(&fields.ciphertext)
            .map_err(|e| DecryptionError::Malformed(format!("ciphertext: {}", e)))?;

        Ok(Self {
            version: fields.version,
            algorithm: fields.algorithm.clone(),
            nonce,
            ciphertext,
            tag,
        })
    }
}

fn decode_fixed<const N: usize>(name: &str, text: &str) -> Result<[u8; N], DecryptionError> {
    let bytes =
        from_base64url(text).map_err(|e| DecryptionError::Malformed(format!("{}: {}", name, e)))?;
    bytes.as_slice().try_into().map_err(|_| {
        DecryptionError::Malformed(format!(
            "{}: expected {} bytes, got {}",
            name,
            N,
            bytes.len()
        ))
    })
}
