//! Shared helpers for the web integration tests.
#![allow(dead_code)]

use flowpush_core::config::Config;
use flowpush_core::Hub;
use flowpush_web::state::AppState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Two static tokens: `good` -> u1, `other` -> u2.
pub fn test_config() -> Config {
    Config {
        port: 0,
        tokens: HashMap::from([
            ("good".to_string(), "u1".to_string()),
            ("other".to_string(), "u2".to_string()),
        ]),
        ..Config::default()
    }
}

/// Start the server on a random port and return its address and state.
pub async fn spawn_server(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::from_config(config);
    let app = flowpush_web::create_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Poll until the hub holds exactly `expected` subscribers.
pub async fn wait_for_subscribers(hub: &Hub, expected: usize) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            hub.flush().await;
            if hub.count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "hub never reached {expected} subscribers");
}
