use clap::Args;

use crate::client::{Client, ClientError};

#[derive(Args, Debug, Clone)]
pub struct ReadMessages {
    /// Login of the other participant
    pub login: String,

    /// Only show the most recent messages
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[async_trait::async_trait]
impl crate::op::Op for ReadMessages {
    type Error = ClientError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = Client::open(ctx).await?;
        client.setup().await?;

        let session = client.chat.start_chat_with_login(&self.login).await?;
        let messages = client.chat.next_messages().await.unwrap_or_default();

        let skip = match self.limit {
            Some(limit) => messages.len().saturating_sub(limit),
            None => 0,
        };
        let mut lines = vec![format!("{} {}", self.login, session.status())];
        if messages.is_empty() {
            lines.push("No messages yet".to_string());
        }
        lines.extend(messages.iter().skip(skip).map(|message| message.to_string()));
        Ok(lines.join("\n"))
    }
}
