//! Task events and their pre-serialized wire form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::PushResult;

/// Event type sent once when a subscriber is accepted.
pub const CONNECTED: &str = "connected";

/// Event type used as a liveness probe on the stream transport.
pub const HEARTBEAT: &str = "heartbeat";

/// A task notification as it appears on the wire.
///
/// `type`, `task_id` and `time` are always present; anything else is
/// flattened into the top-level object.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct TaskEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub task_id: String,
    /// Unix timestamp in seconds.
    pub time: i64,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl TaskEvent {
    pub fn new(kind: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            task_id: task_id.into(),
            time: chrono::Utc::now().timestamp(),
            fields: serde_json::Map::new(),
        }
    }

    /// Connection acknowledgement carrying the authenticated subject.
    pub fn connected(task_id: &str, subject_id: &str) -> Self {
        Self::new(CONNECTED, task_id).with_field("subject_id", subject_id)
    }

    pub fn heartbeat(task_id: &str) -> Self {
        Self::new(HEARTBEAT, task_id)
    }

    /// Add a type-specific field. Reserved keys are ignored.
    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if !matches!(key, "type" | "task_id" | "time") {
            self.fields.insert(key.to_string(), value.into());
        }
        self
    }

    /// Merge a JSON object into the event's fields.
    pub fn with_fields(mut self, data: serde_json::Map<String, serde_json::Value>) -> Self {
        for (key, value) in data {
            self = self.with_field(&key, value);
        }
        self
    }

    /// Serialize once for fan-out.
    pub fn to_payload(&self) -> PushResult<Payload> {
        Ok(Payload::from(serde_json::to_string(self)?))
    }
}

/// An immutable, pre-serialized message. Cloning is a reference-count bump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload(Arc<str>);

impl Payload {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
