//! flowpush web server
//!
//! Axum-based endpoints for live task updates: a WebSocket transport, an
//! event-stream transport, and internal producer hooks.

pub mod auth;
pub mod error;
pub mod routes;
pub mod sse;
pub mod state;
pub mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use flowpush_core::config::Config;
use flowpush_core::Hub;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let internal_routes = Router::new()
        .route("/notify", post(routes::internal::notify))
        .route("/stats", get(routes::internal::stats))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/ws/tasks/{task_id}", get(websocket::ws_handler))
        .route("/sse/tasks/{task_id}", get(sse::sse_handler))
        .nest("/internal", internal_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the server until Ctrl+C, then close every subscriber and drain.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let addr = config.bind_addr();
    let state = AppState::from_config(config);
    let hub = state.hub.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;
    Ok(())
}

async fn shutdown_signal(hub: Hub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, disconnecting subscribers");
    hub.shutdown();
}
