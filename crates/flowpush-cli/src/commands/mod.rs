//! CLI command definitions and handlers.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod notify;
pub mod serve;
pub mod token;

/// flowpush - live task-update delivery
#[derive(Parser)]
#[command(name = "flowpush")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the WebSocket / event-stream server
    Serve(serve::ServeArgs),

    /// Send a task event to a running server
    Notify(notify::NotifyArgs),

    /// Issue a signed access token for a subject
    Token(token::TokenArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve(args) => serve::execute(args).await,
            Commands::Notify(args) => notify::execute(args).await,
            Commands::Token(args) => token::execute(args),
        }
    }
}
