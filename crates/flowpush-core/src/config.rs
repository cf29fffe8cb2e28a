//! Server configuration.
//!
//! Loaded from an optional TOML file; the CLI overrides individual fields
//! from flags and environment variables before calling [`Config::validate`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{PushError, PushResult};

pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;
pub const DEFAULT_PONG_WAIT_MS: u64 = 60_000;
pub const DEFAULT_WRITE_WAIT_MS: u64 = 10_000;
pub const DEFAULT_SSE_HEARTBEAT_MS: u64 = 30_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// HS256 secret. When unset, only `tokens` are accepted.
    pub jwt_secret: Option<String>,
    /// Static token -> subject table.
    pub tokens: HashMap<String, String>,
    /// Per-subscriber mailbox capacity.
    pub mailbox_capacity: usize,
    /// Read deadline for the duplex inbound duty, refreshed on every pong.
    pub pong_wait_ms: u64,
    /// Heartbeat interval for the duplex transport. Defaults to 9/10 of `pong_wait_ms`.
    pub ping_period_ms: Option<u64>,
    /// Upper bound on any single socket write.
    pub write_wait_ms: u64,
    /// Heartbeat interval for the event-stream transport.
    pub sse_heartbeat_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
            jwt_secret: None,
            tokens: HashMap::new(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            pong_wait_ms: DEFAULT_PONG_WAIT_MS,
            ping_period_ms: None,
            write_wait_ms: DEFAULT_WRITE_WAIT_MS,
            sse_heartbeat_ms: DEFAULT_SSE_HEARTBEAT_MS,
        }
    }
}

impl Config {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> PushResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> PushResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> PushResult<()> {
        if self.mailbox_capacity == 0 {
            return Err(PushError::config("mailbox_capacity must be greater than zero"));
        }
        if self.pong_wait_ms == 0 || self.write_wait_ms == 0 || self.sse_heartbeat_ms == 0 {
            return Err(PushError::config("timeouts must be greater than zero"));
        }
        if self.ping_period() >= self.pong_wait() {
            return Err(PushError::config(format!(
                "ping period ({:?}) must be shorter than pong wait ({:?})",
                self.ping_period(),
                self.pong_wait()
            )));
        }
        if self.ping_period().is_zero() {
            return Err(PushError::config("ping period must be greater than zero"));
        }
        if self.jwt_secret.is_none() && self.tokens.is_empty() {
            return Err(PushError::config(
                "no authentication configured: set jwt_secret or tokens",
            ));
        }
        Ok(())
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_millis(self.pong_wait_ms)
    }

    pub fn ping_period(&self) -> Duration {
        let derived = self.pong_wait_ms.saturating_mul(9) / 10;
        Duration::from_millis(self.ping_period_ms.unwrap_or(derived))
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_millis(self.write_wait_ms)
    }

    pub fn sse_heartbeat(&self) -> Duration {
        Duration::from_millis(self.sse_heartbeat_ms)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
