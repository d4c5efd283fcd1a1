//! Chat message records and how they are shown.
//!
//! A record lives at `messages/{ownerUid}/{peerLogin}/{messageId}`, once in
//! each participant's mailbox:
//!
//! ```text
//! { "fromUid": ..., "createdAt": <server ms>,
//!   "text": ...,                                        // plaintext, optional
//!   "e2eeV": 1, "alg": ..., "nonce": ..., "ciphertext": ..., "mac": ... }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::{DecryptionError, EncryptedEnvelope, EnvelopeFields, ALGORITHM, ENVELOPE_VERSION};
use crate::store::server_timestamp;

/// Shown in place of a message that could not be decrypted
pub const UNDECRYPTABLE_PLACEHOLDER: &str = "🔒 Unable to decrypt message";
/// Conversation list preview of a message stored without plaintext
pub const ENCRYPTED_PREVIEW: &str = "🔒 Encrypted message";

/// A message record as read from a mailbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub from_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(rename = "e2eeV", default, skip_serializing_if = "Option::is_none")]
    pub e2ee_v: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// An envelope field was present with the wrong JSON type
    #[serde(skip)]
    pub malformed: bool,
}

impl ChatMessage {
    /// Read a stored record field by field
    ///
    /// Scalars of the wrong type are dropped instead of failing the whole
    /// record. A mistyped envelope field marks the message malformed, so it
    /// still renders as undecryptable. Returns `None` only for values that
    /// are not objects.
    pub fn from_record(value: &Value) -> Option<Self> {
        let record = value.as_object()?;
        let mut malformed = false;
        let mut envelope_str = |name: &str| match record.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                malformed = true;
                None
            }
        };
        let alg = envelope_str("alg");
        let nonce = envelope_str("nonce");
        let ciphertext = envelope_str("ciphertext");
        let mac = envelope_str("mac");

        let e2ee_v = match record.get("e2eeV") {
            None | Some(Value::Null) => None,
            Some(v) => {
                let version = v.as_u64().and_then(|v| u32::try_from(v).ok());
                malformed |= version.is_none();
                version
            }
        };
        let created_at = record
            .get("createdAt")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));

        Some(Self {
            from_uid: record
                .get("fromUid")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            text: record.get("text").and_then(Value::as_str).map(str::to_string),
            created_at,
            e2ee_v,
            alg,
            nonce,
            ciphertext,
            mac,
            malformed,
        })
    }

    /// Whether the record carries envelope fields that must be decrypted
    pub fn is_encrypted(&self) -> bool {
        self.malformed || self.ciphertext.is_some() || self.nonce.is_some() || self.mac.is_some()
    }

    /// Collect the envelope fields of an encrypted record
    ///
    /// Records written before versioning carry no `e2eeV` / `alg`; those are
    /// read as the current version.
    pub fn envelope_fields(&self) -> Result<EnvelopeFields, DecryptionError> {
        if self.malformed {
            return Err(DecryptionError::Malformed(
                "envelope field has the wrong type".to_string(),
            ));
        }
        let missing = |name: &str| DecryptionError::Malformed(format!("missing field '{}'", name));
        Ok(EnvelopeFields {
            version: self.e2ee_v.unwrap_or(ENVELOPE_VERSION),
            algorithm: self.alg.clone().unwrap_or_else(|| ALGORITHM.to_string()),
            nonce: self.nonce.clone().ok_or_else(|| missing("nonce"))?,
            ciphertext: self.ciphertext.clone().ok_or_else(|| missing("ciphertext"))?,
            mac: self.mac.clone().ok_or_else(|| missing("mac"))?,
        })
    }

    pub fn envelope(&self) -> Result<EncryptedEnvelope, DecryptionError> {
        EncryptedEnvelope::from_fields(&self.envelope_fields()?)
    }
}

/// What to display for a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// Ciphertext we hold no working key for, or that failed authentication
    Undecryptable,
}

impl MessageBody {
    pub fn as_str(&self) -> &str {
        match self {
            MessageBody::Text(text) => text,
            MessageBody::Undecryptable => UNDECRYPTABLE_PLACEHOLDER,
        }
    }

    pub fn is_undecryptable(&self) -> bool {
        matches!(self, MessageBody::Undecryptable)
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub id: String,
    pub direction: Direction,
    pub body: MessageBody,
    pub created_at: Option<i64>,
}

impl fmt::Display for RenderedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            Direction::Sent => ">",
            Direction::Received => "<",
        };
        let at = self
            .created_at
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|at| {
                at.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        write!(f, "[{}] {} {}", at, arrow, self.body)
    }
}

/// A message ready to be written to both mailboxes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Plaintext to store alongside (or instead of) the envelope
    pub text: Option<String>,
    pub envelope: Option<EncryptedEnvelope>,
}

impl OutgoingMessage {
    pub fn plaintext(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            envelope: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.envelope.is_some()
    }

    /// Build the stored record; `createdAt` is left for the store to fill in
    pub fn to_record(&self, from_uid: &str) -> Value {
        let mut record = Map::new();
        record.insert("fromUid".to_string(), Value::from(from_uid));
        record.insert("createdAt".to_string(), server_timestamp());
        if let Some(text) = &self.text {
            record.insert("text".to_string(), Value::from(text.as_str()));
        }
        if let Some(envelope) = &self.envelope {
            let fields = envelope.to_fields();
            record.insert("e2eeV".to_string(), Value::from(fields.version));
            record.insert("alg".to_string(), Value::from(fields.algorithm));
            record.insert("nonce".to_string(), Value::from(fields.nonce));
            record.insert("ciphertext".to_string(), Value::from(fields.ciphertext));
            record.insert("mac".to_string(), Value::from(fields.mac));
        }
        Value::Object(record)
    }

    /// Text for the saved-chats list
    pub fn preview(&self) -> &str {
        self.text.as_deref().unwrap_or(ENCRYPTED_PREVIEW)
    }
}

/// Split a mailbox snapshot into records ordered by message id
///
/// Entries that are not JSON objects are skipped.
pub fn parse_mailbox(snapshot: Option<&Value>) -> Vec<(String, ChatMessage)> {
    let Some(Value::Object(entries)) = snapshot else {
        return Vec::new();
    };

    let mut messages: Vec<(String, ChatMessage)> = entries
        .iter()
        .filter_map(|(id, value)| match ChatMessage::from_record(value) {
            Some(message) => {
                if message.malformed {
                    tracing::warn!("message {} has a malformed envelope", id);
                }
                Some((id.clone(), message))
            }
            None => {
                tracing::warn!("skipping non-record entry {} in mailbox", id);
                None
            }
        })
        .collect();
    messages.sort_by(|a, b| a.0.cmp(&b.0));
    messages
}
