use clap::Args;
use url::Url;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Push relay base URL for presence notifications
    #[arg(long)]
    pub relay_url: Option<Url>,

    /// API key sent to the push relay
    #[arg(long)]
    pub relay_api_key: Option<String>,

    /// Store messages as ciphertext only, without a plaintext copy
    #[arg(long)]
    pub no_plaintext: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            relay_url: self.relay_url.clone(),
            relay_api_key: self.relay_api_key.clone(),
            ..Default::default()
        };
        config.e2ee.retain_plaintext = !self.no_plaintext;

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let relay = match &state.config.relay_url {
            Some(url) => url.to_string(),
            None => "none (presence notifications disabled)".to_string(),
        };

        Ok(format!(
            "Initialized gitmit directory at: {}\n\
             - Database: {}\n\
             - Local storage: {}\n\
             - Config: {}\n\
             - Relay: {}\n\
             - Plaintext copies: {}",
            state.gitmit_dir.display(),
            state.db_path.display(),
            state.local_path.display(),
            state.config_path.display(),
            relay,
            if state.config.e2ee.retain_plaintext {
                "kept"
            } else {
                "not stored"
            }
        ))
    }
}
