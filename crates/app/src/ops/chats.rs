use clap::Args;

use crate::client::{Client, ClientError};

/// List conversations, most recent first
#[derive(Args, Debug, Clone)]
pub struct Chats {}

#[async_trait::async_trait]
impl crate::op::Op for Chats {
    type Error = ClientError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let client = Client::open(ctx).await?;
        let chats = client.chat.saved_chats().await?;

        if chats.is_empty() {
            return Ok("No conversations yet".to_string());
        }
        Ok(chats
            .iter()
            .map(|chat| {
                format!(
                    "{}: {}",
                    chat.login,
                    chat.last_message_text.as_deref().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
