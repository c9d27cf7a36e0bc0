use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod chat;
pub mod keys;
pub mod serve;

use crate::core::AppConfig;

#[derive(Subcommand)]
enum KeysCommand {
    /// List every key with its usage
    List {},
    /// Issue a new key and save it to the key file
    Add {
        #[arg(long)]
        user_id: String,

        /// Number of messages the key may send. Defaults to
        /// NEAE_DEFAULT_MAX_USES
        #[arg(long)]
        max_uses: Option<u32>,

        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Start a chat session in the terminal
    Chat {},
    /// Manage access keys
    Keys {
        #[command(subcommand)]
        command: KeysCommand,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // A missing .env file is fine, the environment may already be set
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Handle each sub command
    match args.command {
        Some(Command::Serve { host, port }) => {
            serve::run(host, port, config).await?;
        }
        Some(Command::Chat {}) => {
            chat::run(config).await?;
        }
        Some(Command::Keys { command }) => match command {
            KeysCommand::List {} => keys::list(&config)?,
            KeysCommand::Add {
                user_id,
                max_uses,
                description,
            } => keys::add(&config, &user_id, max_uses, &description)?,
        },
        None => {}
    }

    Ok(())
}
