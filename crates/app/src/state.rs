use std::{fs, path::PathBuf};

use common::config::E2eeConfig;
use serde::{Deserialize, Serialize};
use url::Url;

pub const APP_NAME: &str = "gitmit";
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Shared realtime database, as a JSON document
pub const DB_FILE_NAME: &str = "db.json";
/// Device-local storage holding private keys
pub const LOCAL_FILE_NAME: &str = "local.json";
pub const LOGS_DIR_NAME: &str = "logs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default log level (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Also write daily rolling log files under the logs directory
    #[serde(default)]
    pub log_to_file: bool,
    /// Login used when `--as` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_login: Option<String>,
    /// Base URL of the push relay serving `POST /notify-online`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_url: Option<Url>,
    /// Sent as `x-api-key` to the relay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_api_key: Option<String>,
    #[serde(default)]
    pub e2ee: E2eeConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_to_file: false,
            default_login: None,
            relay_url: None,
            relay_api_key: None,
            e2ee: E2eeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parsed log level, falling back to WARN on garbage
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::WARN)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the gitmit directory (~/.gitmit)
    pub gitmit_dir: PathBuf,
    /// Path to the shared database file
    pub db_path: PathBuf,
    /// Path to the device-local storage file
    pub local_path: PathBuf,
    /// Path to the log directory
    pub logs_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the gitmit directory path (custom or default ~/.gitmit)
    pub fn gitmit_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new gitmit state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let gitmit_dir = Self::gitmit_dir(custom_path)?;

        if gitmit_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&gitmit_dir)?;

        let logs_path = gitmit_dir.join(LOGS_DIR_NAME);
        fs::create_dir_all(&logs_path)?;

        let config = config.unwrap_or_default();
        let config_path = gitmit_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        // Empty database and local storage
        let db_path = gitmit_dir.join(DB_FILE_NAME);
        if !db_path.exists() {
            fs::write(&db_path, "null")?;
        }
        let local_path = gitmit_dir.join(LOCAL_FILE_NAME);
        if !local_path.exists() {
            fs::write(&local_path, "{}")?;
        }

        Ok(Self {
            gitmit_dir,
            db_path,
            local_path,
            logs_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the gitmit directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let gitmit_dir = Self::gitmit_dir(custom_path)?;

        let config_path = gitmit_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = gitmit_dir.join(DB_FILE_NAME);
        let local_path = gitmit_dir.join(LOCAL_FILE_NAME);
        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !local_path.exists() {
            return Err(StateError::MissingFile(LOCAL_FILE_NAME.to_string()));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        Ok(Self {
            logs_path: gitmit_dir.join(LOGS_DIR_NAME),
            gitmit_dir,
            db_path,
            local_path,
            config_path,
            config,
        })
    }

    /// Write the current config back to disk
    pub fn save_config(&self) -> Result<(), StateError> {
        fs::write(&self.config_path, toml::to_string_pretty(&self.config)?)?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("gitmit directory not initialized. Run 'gitmit init' first")]
    NotInitialized,

    #[error("gitmit directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("state");

        let state = AppState::init(Some(dir.clone()), None).unwrap();
        assert!(state.db_path.exists());
        assert!(state.local_path.exists());
        assert!(state.logs_path.is_dir());

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config.log_level, "warn");
        assert!(loaded.config.e2ee.retain_plaintext);

        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            relay_url = "https://relay.example.com"

            [e2ee]
            retain_plaintext = false
            "#,
        )
        .unwrap();
        assert_eq!(config.tracing_level(), tracing::Level::WARN);
        assert!(!config.e2ee.retain_plaintext);
        assert_eq!(config.e2ee.directory_timeout_secs, 5);
        assert_eq!(
            config.relay_url.unwrap().as_str(),
            "https://relay.example.com/"
        );
    }

    #[test]
    fn test_save_config() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut state = AppState::init(Some(temp.path().to_path_buf()), None).unwrap();
        state.config.default_login = Some("octocat".to_string());
        state.save_config().unwrap();

        let loaded = AppState::load(Some(temp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.config.default_login.as_deref(), Some("octocat"));
    }
}
