use clap::Args;

use crate::client::{Client, ClientError};

/// Show the local identity and what the key directory holds for it
#[derive(Args, Debug, Clone)]
pub struct Show {}

#[async_trait::async_trait]
impl crate::op::Op for Show {
    type Error = ClientError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = Client::open(ctx).await?;
        let public_key = client.setup().await?;
        let me = client.me();

        let published = client
            .e2ee
            .directory()
            .fetch_record(&me.uid)
            .await
            .map_err(common::session::SessionError::from)?;
        let directory = match published {
            Some(record) if record.x25519 == public_key.to_base64url() => {
                "published (current)".to_string()
            }
            Some(_) => "published (stale, differs from local key)".to_string(),
            None => "not published".to_string(),
        };

        Ok(format!(
            "{} ({})\n - Public key: {}\n - Fingerprint: {}\n - Directory: {}",
            me.login,
            me.uid,
            public_key.to_base64url(),
            public_key.fingerprint(),
            directory
        ))
    }
}
