//! Server command.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use flowpush_core::config::Config;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct ServeArgs {
    /// TOML config file
    #[arg(short, long, env = "FLOWPUSH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "FLOWPUSH_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "FLOWPUSH_HOST")]
    pub host: Option<String>,

    /// HS256 secret for access tokens
    #[arg(long, env = "FLOWPUSH_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Static token, as TOKEN=SUBJECT (repeatable)
    #[arg(long = "token", value_name = "TOKEN=SUBJECT")]
    pub tokens: Vec<String>,

    /// Per-subscriber mailbox capacity
    #[arg(long)]
    pub mailbox_capacity: Option<usize>,

    /// Read deadline for WebSocket peers, in milliseconds
    #[arg(long)]
    pub pong_wait_ms: Option<u64>,

    /// Per-write deadline, in milliseconds
    #[arg(long)]
    pub write_wait_ms: Option<u64>,

    /// Event-stream heartbeat interval, in milliseconds
    #[arg(long)]
    pub sse_heartbeat_ms: Option<u64>,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl ServeArgs {
    /// File config with flag/env overrides applied.
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                info!(path = %path.display(), "Loading config file");
                Config::load(path)?
            }
            None => Config::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(secret) = self.jwt_secret {
            config.jwt_secret = Some(secret);
        }
        if let Some(capacity) = self.mailbox_capacity {
            config.mailbox_capacity = capacity;
        }
        if let Some(ms) = self.pong_wait_ms {
            config.pong_wait_ms = ms;
        }
        if let Some(ms) = self.write_wait_ms {
            config.write_wait_ms = ms;
        }
        if let Some(ms) = self.sse_heartbeat_ms {
            config.sse_heartbeat_ms = ms;
        }
        for entry in &self.tokens {
            let Some((token, subject)) = entry.split_once('=') else {
                bail!("invalid --token '{}', expected TOKEN=SUBJECT", entry);
            };
            config.tokens.insert(token.to_string(), subject.to_string());
        }

        config.validate()?;
        info!(
            bind = %config.bind_addr(),
            mailbox_capacity = config.mailbox_capacity,
            static_tokens = config.tokens.len(),
            jwt = config.jwt_secret.is_some(),
            "Configuration resolved"
        );
        Ok(config)
    }
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let config = args.into_config()?;
    let base = format!("{}:{}", config.host, config.port);

    println!();
    println!("  {} {}", "flowpush".cyan().bold(), "Live Updates".bold());
    println!();
    println!("  {}  ws://{}/ws/tasks/{{task_id}}", "WebSocket".green(), base);
    println!("  {}     http://{}/sse/tasks/{{task_id}}", "Stream".green(), base);
    println!("  {}     http://{}/internal/notify", "Notify".green(), base);
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    flowpush_web::run_server(config).await?;
    info!("Server stopped");
    Ok(())
}
