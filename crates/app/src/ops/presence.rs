use clap::Args;

use crate::client::{Client, ClientError};

/// Tell everyone in the conversation list that you are online
#[derive(Args, Debug, Clone)]
pub struct Presence {}

#[async_trait::async_trait]
impl crate::op::Op for Presence {
    type Error = ClientError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = Client::open(ctx).await?;
        let delivered = client.chat.announce_presence().await?;
        Ok(format!("Notified {} contact(s)", delivered))
    }
}
