// CLI modules
mod args;
mod op;
mod ops;

mod client;
mod logging;
mod notifier;
mod state;
mod store;
mod version;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Chat, Chats, Identity, Init, Presence, Register, Version};

command_enum! {
    (Init, Init),
    (Register, Register),
    (Identity, Identity),
    (Chat, Chat),
    (Chats, Chats),
    (Presence, Presence),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging follows the config when there is one; `init` runs before it exists
    let state = state::AppState::load(args.config_path.clone()).ok();
    let level = state
        .as_ref()
        .map(|state| state.config.tracing_level())
        .unwrap_or(tracing::Level::WARN);
    let guards = logging::init_logging(level, state.as_ref());

    let ctx = op::OpContext::new(args.config_path, args.as_login);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            tracing::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            1
        }
    };

    // Flush buffered log lines before exiting
    drop(guards);
    std::process::exit(code);
}
