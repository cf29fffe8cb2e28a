//! Producer-side client for the internal notification endpoint.
//!
//! Task-event emitters running in another process use this to hand
//! events to a running `flowpush serve`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{PushError, PushResult};
use crate::event::TaskEvent;

/// Which subscribers a notification is addressed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every live subscriber.
    All,
    /// Subscribers whose connection targets the notification's task.
    #[default]
    Task,
    /// Subscribers authenticated as `subject_id`.
    User,
}

/// Body of `POST /internal/notify`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub task_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Notification {
    pub fn new(task_id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind: kind.into(),
            scope: Scope::default(),
            subject_id: None,
            data: serde_json::Map::new(),
        }
    }

    /// Build the wire event, stamped with the current time.
    pub fn to_event(&self) -> TaskEvent {
        TaskEvent::new(self.kind.clone(), self.task_id.clone()).with_fields(self.data.clone())
    }
}

/// Notifies the server of task changes via HTTP.
#[derive(Clone)]
pub struct WebNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl WebNotifier {
    /// Create a notifier for the server at `base_url`.
    pub fn with_url(base_url: &str) -> Self {
        debug!(base_url = %base_url, "WebNotifier initialized");
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send a notification, reporting failures to the caller.
    pub async fn notify(&self, notification: &Notification) -> PushResult<()> {
        let url = format!("{}/internal/notify", self.base_url);
        debug!(
            url = %url,
            task_id = %notification.task_id,
            kind = %notification.kind,
            "Sending notification"
        );

        let response = self
            .client
            .post(&url)
            .json(notification)
            .send()
            .await
            .map_err(|e| PushError::transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PushError::transport(format!(
                "notify rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
