//! Request-side token extraction in front of the auth gate.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use flowpush_core::auth::{self, Subject};
use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

/// `?token=` query parameter accepted by both transports.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Authenticate a request. The query parameter wins over an `Authorization: Bearer` header.
pub async fn authenticate_request(
    state: &AppState,
    query: &TokenQuery,
    headers: &HeaderMap,
) -> Result<Subject, ApiError> {
    let token = query.token.as_deref().or_else(|| bearer_token(headers));
    auth::authenticate(state.validator.as_ref(), token)
        .await
        .map_err(|e| {
            warn!(error = %e, "Authentication failed");
            ApiError::from(e)
        })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
