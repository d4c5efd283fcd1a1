use clap::Args;

use crate::client::{Client, ClientError};

/// Replace the local key pair. Messages encrypted under the old key become
/// unreadable.
#[derive(Args, Debug, Clone)]
pub struct Reset {
    /// Confirm the reset
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("resetting makes existing encrypted history unreadable; pass --yes to confirm")]
    NotConfirmed,
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[async_trait::async_trait]
impl crate::op::Op for Reset {
    type Error = ResetError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if !self.yes {
            return Err(ResetError::NotConfirmed);
        }

        let client = Client::open(ctx).await?;
        let public_key = client
            .e2ee
            .reset_identity(&client.me().uid)
            .await
            .map_err(ClientError::from)?;

        Ok(format!(
            "New identity for {}\n - Public key: {}\n - Fingerprint: {}",
            client.me().login,
            public_key.to_base64url(),
            public_key.fingerprint()
        ))
    }
}
