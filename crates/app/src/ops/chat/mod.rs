use clap::{Args, Subcommand};

pub mod read;
pub mod send;

use crate::op::Op;

crate::command_enum! {
    (Send, send::SendMessage),
    (Read, read::ReadMessages),
}

pub type ChatCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Chat {
    #[command(subcommand)]
    pub command: ChatCommand,
}

#[async_trait::async_trait]
impl Op for Chat {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
