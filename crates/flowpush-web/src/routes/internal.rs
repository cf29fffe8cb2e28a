//! Internal notification endpoints.
//!
//! Producers outside this process hand task events to the hub here.

use axum::{extract::State, http::StatusCode, Json};
use flowpush_core::notifier::{Notification, Scope};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;

/// Receive a notification and dispatch it by scope.
pub async fn notify(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> Result<StatusCode, ApiError> {
    info!(
        task_id = %notification.task_id,
        kind = %notification.kind,
        scope = ?notification.scope,
        "Received internal notification"
    );
    let payload = notification.to_event().to_payload()?;

    match notification.scope {
        Scope::All => state.hub.broadcast(payload),
        Scope::Task => {
            let reached = state.hub.broadcast_to_task(&notification.task_id, payload).await;
            debug!(reached, "Task-scoped notification delivered");
        }
        Scope::User => {
            let Some(subject_id) = notification.subject_id.as_deref() else {
                return Err(ApiError::BadRequest("scope 'user' requires subject_id".to_string()));
            };
            let reached = state.hub.broadcast_to_user(subject_id, payload).await;
            debug!(reached, "User-scoped notification delivered");
        }
    }

    Ok(StatusCode::ACCEPTED)
}

/// Current subscriber count, after pending registrations are applied.
pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    state.hub.flush().await;
    Json(json!({ "subscribers": state.hub.count().await }))
}
