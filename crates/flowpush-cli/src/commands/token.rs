//! Token command.

use anyhow::Result;
use clap::Args;
use flowpush_core::auth::JwtValidator;

#[derive(Args)]
pub struct TokenArgs {
    /// Subject identity to embed
    pub subject: String,

    /// HS256 secret, must match the server's
    #[arg(long, env = "FLOWPUSH_JWT_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Lifetime in minutes
    #[arg(long, default_value = "60")]
    pub ttl_minutes: i64,
}

pub fn execute(args: TokenArgs) -> Result<()> {
    let token = JwtValidator::new(args.secret.as_bytes())
        .issue(&args.subject, chrono::Duration::minutes(args.ttl_minutes))?;
    println!("{}", token);
    Ok(())
}
