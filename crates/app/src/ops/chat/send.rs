use clap::Args;

use crate::client::{Client, ClientError};

#[derive(Args, Debug, Clone)]
pub struct SendMessage {
    /// Login of the recipient
    pub login: String,

    /// Message text
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,
}

#[async_trait::async_trait]
impl crate::op::Op for SendMessage {
    type Error = ClientError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut client = Client::open(ctx).await?;
        client.setup().await?;

        let session = client.chat.start_chat_with_login(&self.login).await?;
        let text = self.text.join(" ");
        match client.chat.send_message(&text).await? {
            Some(id) => Ok(format!("{} sent to {} ({})", id, self.login, session.status())),
            None => Ok("Nothing to send".to_string()),
        }
    }
}
