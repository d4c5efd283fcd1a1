use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of the E2EE layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eeConfig {
    /// Keep a plaintext `text` field next to the ciphertext in stored
    /// records. Makes history readable on a device that lost its key, at the
    /// cost of the database seeing the message.
    #[serde(default = "default_retain_plaintext")]
    pub retain_plaintext: bool,
    /// Upper bound for a key directory lookup when opening a conversation
    #[serde(default = "default_directory_timeout_secs")]
    pub directory_timeout_secs: u64,
}

fn default_retain_plaintext() -> bool {
    true
}

fn default_directory_timeout_secs() -> u64 {
    5
}

impl Default for E2eeConfig {
    fn default() -> Self {
        Self {
            retain_plaintext: default_retain_plaintext(),
            directory_timeout_secs: default_directory_timeout_secs(),
        }
    }
}

impl E2eeConfig {
    pub fn directory_timeout(&self) -> Duration {
        Duration::from_secs(self.directory_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: E2eeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, E2eeConfig::default());
        assert!(config.retain_plaintext);
        assert_eq!(config.directory_timeout(), Duration::from_secs(5));

        let config: E2eeConfig = serde_json::from_str(r#"{"retain_plaintext":false}"#).unwrap();
        assert!(!config.retain_plaintext);
        assert_eq!(config.directory_timeout_secs, 5);
    }
}
