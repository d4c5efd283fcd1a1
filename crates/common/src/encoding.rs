//! Base64url text encoding for binary fields at the store boundary.
//!
//! Everything above the store works on raw bytes. Keys, nonces, ciphertexts
//! and tags only become text when they are written to (or read from) the
//! shared database or local storage.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

pub use base64::DecodeError;

/// URL-safe alphabet, padded on encode, lenient about padding on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as base64url text
pub fn to_base64url(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_LENIENT.encode(bytes)
}

/// Decode base64url text, with or without trailing `=` padding
pub fn from_base64url(text: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_LENIENT.decode(text.trim())
}
