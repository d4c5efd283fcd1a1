use clap::Args;

use common::chat::LocalUser;

use crate::client::{Client, ClientError};

#[derive(Args, Debug, Clone)]
pub struct Register {
    /// Stable user id (as issued by the auth provider)
    #[arg(long)]
    pub uid: String,

    /// GitHub login
    #[arg(long)]
    pub login: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("failed to save config: {0}")]
    Config(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Register {
    type Error = RegisterError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, store, local) = Client::open_stores(ctx).await?;
        let me = LocalUser {
            uid: self.uid.clone(),
            login: self.login.clone(),
        };
        let mut client = Client::build(state, store, local, me)?;

        client
            .chat
            .register()
            .await
            .map_err(ClientError::from)?;
        let public_key = client.setup().await?;

        if client.state.config.default_login.is_none() {
            client.state.config.default_login = Some(self.login.clone());
            client.state.save_config()?;
        }

        Ok(format!(
            "Registered {} ({})\n - Public key: {}\n - Fingerprint: {}",
            self.login,
            self.uid,
            public_key.to_base64url(),
            public_key.fingerprint()
        ))
    }
}
