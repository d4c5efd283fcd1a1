pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gitmit")]
#[command(about = "End-to-end encrypted chat for GitHub users")]
pub struct Args {
    /// Path to the gitmit config directory (defaults to ~/.gitmit)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Act as this registered login instead of the configured default
    #[arg(long = "as", global = true, value_name = "LOGIN")]
    pub as_login: Option<String>,

    #[command(subcommand)]
    pub command: crate::Command,
}
