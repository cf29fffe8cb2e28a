//! Token authentication shared by both transports.
//!
//! The gate only establishes identity; it does not decide which tasks a
//! subject may observe.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::AuthError;

/// An authenticated identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
}

/// Validates an opaque bearer token.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Subject, AuthError>;
}

/// JWT claims accepted by [`JwtValidator`].
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 JWT validator.
pub struct JwtValidator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a token for `subject` valid for `ttl`.
    pub fn issue(&self, subject: &str, ttl: chrono::Duration) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + ttl.num_seconds(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}

#[async_trait]
impl TokenValidator for JwtValidator {
    async fn validate(&self, token: &str) -> Result<Subject, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "JWT rejected");
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }
        Ok(Subject { id: data.claims.sub })
    }
}

/// Fixed token table, for development setups and tests.
#[derive(Default)]
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    pub fn with(mut self, token: &str, subject: &str) -> Self {
        self.tokens.insert(token.to_string(), subject.to_string());
        self
    }
}

#[async_trait]
impl TokenValidator for StaticTokens {
    async fn validate(&self, token: &str) -> Result<Subject, AuthError> {
        self.tokens
            .get(token)
            .map(|id| Subject { id: id.clone() })
            .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
    }
}

/// Accepts a token if any inner validator does. Reports the last failure.
pub struct AnyOf {
    validators: Vec<Arc<dyn TokenValidator>>,
}

impl AnyOf {
    pub fn new(validators: Vec<Arc<dyn TokenValidator>>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl TokenValidator for AnyOf {
    async fn validate(&self, token: &str) -> Result<Subject, AuthError> {
        let mut last = AuthError::InvalidToken("no validator configured".to_string());
        for validator in &self.validators {
            match validator.validate(token).await {
                Ok(subject) => return Ok(subject),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}

/// Build the validator described by `config`.
pub fn from_config(config: &Config) -> Arc<dyn TokenValidator> {
    let mut validators: Vec<Arc<dyn TokenValidator>> = Vec::new();
    if !config.tokens.is_empty() {
        validators.push(Arc::new(StaticTokens::new(config.tokens.clone())));
    }
    if let Some(secret) = &config.jwt_secret {
        validators.push(Arc::new(JwtValidator::new(secret.as_bytes())));
    }
    match validators.len() {
        1 => validators.remove(0),
        _ => Arc::new(AnyOf::new(validators)),
    }
}

/// Run the gate over an optional token.
pub async fn authenticate(
    validator: &dyn TokenValidator,
    token: Option<&str>,
) -> Result<Subject, AuthError> {
    match token {
        Some(t) if !t.trim().is_empty() => validator.validate(t.trim()).await,
        _ => Err(AuthError::MissingToken),
    }
}
