use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "tg-channel-relay", version, about = "Telegram channel forwarding relay")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "CONFIG_PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the relay: command menu, provisioning API and (optionally) the listener.
    Run {
        /// Start the listener for this owner on boot, overriding `listener.autostart_owner`.
        #[arg(long)]
        owner: Option<i64>,
    },
    /// Store the API id and hash for an owner.
    SetCredentials {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        api_id: i32,
        #[arg(long, env = "TG_RELAY_API_HASH", hide_env_values = true)]
        api_hash: String,
    },
    /// Store a session artifact for an owner. The newest one is used on start.
    ImportSession {
        #[arg(long)]
        owner: i64,
        file: PathBuf,
    },
    /// Print what the text filter makes of the given text.
    CheckFilter { text: Vec<String> },
}

impl Cli {
    /// A bare invocation runs the relay.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run { owner: None })
    }
}
