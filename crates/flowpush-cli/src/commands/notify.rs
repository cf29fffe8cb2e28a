//! Notify command.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use flowpush_core::notifier::{Notification, Scope, WebNotifier};
use tracing::debug;

#[derive(Clone, Copy, ValueEnum)]
pub enum ScopeArg {
    All,
    Task,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::All => Scope::All,
            ScopeArg::Task => Scope::Task,
            ScopeArg::User => Scope::User,
        }
    }
}

#[derive(Args)]
pub struct NotifyArgs {
    /// Task the event is about
    pub task_id: String,

    /// Event type
    #[arg(long = "type", default_value = "task.updated")]
    pub kind: String,

    /// Who receives it
    #[arg(long, value_enum, default_value = "task")]
    pub scope: ScopeArg,

    /// Subject for --scope user
    #[arg(long)]
    pub subject: Option<String>,

    /// Extra fields as a JSON object
    #[arg(long)]
    pub data: Option<String>,

    /// Server base URL
    #[arg(long, env = "FLOWPUSH_URL", default_value = "http://127.0.0.1:3030")]
    pub url: String,
}

pub async fn execute(args: NotifyArgs) -> Result<()> {
    let mut notification = Notification::new(&args.task_id, &args.kind);
    notification.scope = args.scope.into();
    notification.subject_id = args.subject;
    if let Some(raw) = &args.data {
        notification.data = serde_json::from_str(raw).context("--data must be a JSON object")?;
    }

    debug!(url = %args.url, scope = ?notification.scope, "Posting notification");
    WebNotifier::with_url(&args.url).notify(&notification).await?;

    println!(
        "{} {} {}",
        "Sent".green().bold(),
        notification.kind,
        format!("(task {})", notification.task_id).dimmed()
    );
    Ok(())
}
