//! Centralized error types for flowpush.

use thiserror::Error;

/// Authentication failures surfaced by a [`TokenValidator`](crate::auth::TokenValidator).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,
}

/// Main error type for flowpush operations.
#[derive(Error, Debug)]
pub enum PushError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for flowpush operations.
pub type PushResult<T> = Result<T, PushError>;

impl PushError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
