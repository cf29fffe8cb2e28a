//! End-to-end tests for the event-stream transport.

mod common;

use flowpush_core::config::Config;
use serde_json::{json, Value};
use std::time::Duration;

/// Reads `data: <json>\n\n` frames off a streaming response.
struct FrameReader {
    response: reqwest::Response,
    buffer: String,
}

impl FrameReader {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Next frame's JSON, or `None` when the stream ends.
    async fn next(&mut self) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let frame: String = self.buffer.drain(..end + 2).collect();
                    let data = frame
                        .strip_prefix("data: ")
                        .and_then(|rest| rest.strip_suffix("\n\n"))
                        .unwrap_or_else(|| panic!("malformed frame: {frame:?}"));
                    assert!(!data.contains('\n'), "frame spans lines: {frame:?}");
                    return Some(serde_json::from_str(data).unwrap());
                }
                match self.response.chunk().await.unwrap() {
                    Some(chunk) => self.buffer.push_str(std::str::from_utf8(&chunk).unwrap()),
                    None => return None,
                }
            }
        })
        .await
        .expect("Timed out waiting for an event frame")
    }

    /// Next frame that is not a heartbeat.
    async fn next_event(&mut self) -> Option<Value> {
        loop {
            let frame = self.next().await?;
            if frame["type"] != "heartbeat" {
                return Some(frame);
            }
        }
    }
}

async fn open(addr: std::net::SocketAddr, task_id: &str, token: &str) -> FrameReader {
    let response = reqwest::get(format!("http://{addr}/sse/tasks/{task_id}?token={token}"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    FrameReader::new(response)
}

#[tokio::test]
async fn test_headers_and_connected_event() {
    let (addr, state) = common::spawn_server(common::test_config()).await;
    let response = reqwest::get(format!("http://{addr}/sse/tasks/t7?token=other"))
        .await
        .unwrap();

    let headers = response.headers();
    assert!(headers["content-type"].to_str().unwrap().starts_with("text/event-stream"));
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let mut reader = FrameReader::new(response);
    let connected = reader.next().await.unwrap();
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["subject_id"], "u2");
    assert_eq!(connected["task_id"], "t7");

    common::wait_for_subscribers(&state.hub, 1).await;
}

#[tokio::test]
async fn test_notify_reaches_stream_subscriber() {
    let (addr, state) = common::spawn_server(common::test_config()).await;
    let mut on_task = open(addr, "t1", "good").await;
    let mut elsewhere = open(addr, "t2", "good").await;
    on_task.next().await.unwrap();
    elsewhere.next().await.unwrap();
    common::wait_for_subscribers(&state.hub, 2).await;

    let status = reqwest::Client::new()
        .post(format!("http://{addr}/internal/notify"))
        .json(&json!({ "task_id": "t1", "type": "task.rejected", "data": { "reason": "budget" } }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 202);

    let event = on_task.next_event().await.unwrap();
    assert_eq!(event["type"], "task.rejected");
    assert_eq!(event["task_id"], "t1");
    assert_eq!(event["reason"], "budget");

    // A hub-wide broadcast reaches the other task's stream; the task-scoped one did not.
    state
        .hub
        .broadcast(flowpush_core::TaskEvent::new("system.notice", "-").to_payload().unwrap());
    assert_eq!(elsewhere.next_event().await.unwrap()["type"], "system.notice");
}

#[tokio::test]
async fn test_heartbeat_frames() {
    let config = Config {
        sse_heartbeat_ms: 100,
        ..common::test_config()
    };
    let (addr, _state) = common::spawn_server(config).await;
    let mut reader = open(addr, "t1", "good").await;

    assert_eq!(reader.next().await.unwrap()["type"], "connected");
    let heartbeat = reader.next().await.unwrap();
    assert_eq!(heartbeat["type"], "heartbeat");
    assert_eq!(heartbeat["task_id"], "t1");
}

#[tokio::test]
async fn test_client_disconnect_unregisters() {
    let config = Config {
        sse_heartbeat_ms: 100,
        ..common::test_config()
    };
    let (addr, state) = common::spawn_server(config).await;
    let mut reader = open(addr, "t1", "good").await;
    reader.next().await.unwrap();
    common::wait_for_subscribers(&state.hub, 1).await;

    drop(reader);

    // The next heartbeat write fails and the body is dropped.
    common::wait_for_subscribers(&state.hub, 0).await;
}

#[tokio::test]
async fn test_hub_shutdown_ends_stream() {
    let (addr, state) = common::spawn_server(common::test_config()).await;
    let mut reader = open(addr, "t1", "good").await;
    reader.next().await.unwrap();
    common::wait_for_subscribers(&state.hub, 1).await;

    state.hub.shutdown();

    assert!(reader.next().await.is_none());
}
