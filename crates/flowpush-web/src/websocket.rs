//! WebSocket endpoint and the per-connection actor.
//!
//! Each accepted socket is split in two duties:
//! - inbound: watches for pongs under a read deadline; its end means the peer is gone
//! - outbound: drains the mailbox into text frames and sends heartbeat pings
//!
//! Whichever finishes first tears the connection down. Nothing is retried;
//! clients reconnect with a fresh handshake.

use axum::{
    body::Bytes,
    extract::{
        ws::{
            close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket,
            WebSocketUpgrade,
        },
        Path, Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use flowpush_core::auth::Subject;
use flowpush_core::hub::{ConnectionId, Mailbox, Subscriber, SubscriberKind};
use flowpush_core::{PushError, PushResult, TaskEvent};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::time::Duration;
use tokio::time::{interval_at, timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::{authenticate_request, TokenQuery};
use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound on mailbox items folded into one frame.
const MAX_BATCH: usize = 64;

/// Timing knobs for one connection, derived from config.
#[derive(Clone, Copy, Debug)]
struct Timings {
    pong_wait: Duration,
    ping_period: Duration,
    write_wait: Duration,
}

/// WebSocket upgrade handler.
///
/// GET /ws/tasks/{task_id}?token=...
///
/// Authentication runs before the upgrade is inspected, so a bad token is
/// always a 401 and never leaves a registered subscriber behind.
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let subject = authenticate_request(&state, &query, &headers).await?;
    let ws = ws?;

    info!(subject_id = %subject.id, task_id = %task_id, "WebSocket upgrade accepted");

    Ok(ws
        .on_failed_upgrade(|e: axum::Error| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| run_connection(socket, state, subject, task_id)))
}

/// Drive one authenticated connection until either duty ends.
async fn run_connection(socket: WebSocket, state: AppState, subject: Subject, task_id: String) {
    let timings = Timings {
        pong_wait: state.config.pong_wait(),
        ping_period: state.config.ping_period(),
        write_wait: state.config.write_wait(),
    };
    let (mut sink, stream) = socket.split();
    let (subscriber, mailbox) = Subscriber::new(
        subject.id.clone(),
        task_id.clone(),
        SubscriberKind::Duplex,
        state.config.mailbox_capacity,
    );
    let connection_id = subscriber.connection_id;

    // Acknowledge before registering: a peer that cannot take one frame is never a member.
    let ack = match TaskEvent::connected(&task_id, &subject.id).to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Failed to serialize connected event");
            return;
        }
    };
    let ack = Message::Text(ack.to_string().into());
    if let Err(e) = send_with_deadline(&mut sink, ack, timings.write_wait).await {
        debug!(%connection_id, error = %e, "Failed to send connected event");
        return;
    }

    state.hub.register(subscriber);
    info!(%connection_id, subject_id = %subject.id, task_id = %task_id, "WebSocket actor started");

    let mut outbound = tokio::spawn(outbound_duty(sink, mailbox, timings, connection_id));

    let outbound_done = tokio::select! {
        reason = inbound_duty(stream, timings.pong_wait, connection_id) => {
            debug!(%connection_id, reason, "Inbound duty ended");
            false
        }
        _ = &mut outbound => {
            debug!(%connection_id, "Outbound duty ended");
            true
        }
    };

    // Closes the mailbox, which lets the outbound duty send its close frame.
    state.hub.unregister(connection_id);
    if !outbound_done && timeout(timings.write_wait, &mut outbound).await.is_err() {
        outbound.abort();
    }

    info!(%connection_id, subject_id = %subject.id, "WebSocket actor stopped");
}

/// Wait for frames until the peer goes away or stops answering pings.
async fn inbound_duty(
    mut stream: SplitStream<WebSocket>,
    pong_wait: Duration,
    connection_id: ConnectionId,
) -> &'static str {
    let mut deadline = Instant::now() + pong_wait;
    loop {
        match timeout_at(deadline, stream.next()).await {
            Err(_) => return "read deadline exceeded",
            Ok(None) => return "stream ended",
            Ok(Some(Err(e))) => {
                debug!(%connection_id, error = %e, "WebSocket receive error");
                return "read error";
            }
            Ok(Some(Ok(msg))) => match msg {
                Message::Pong(_) => deadline = Instant::now() + pong_wait,
                Message::Close(frame) => {
                    debug!(%connection_id, reason = ?frame, "Client initiated close");
                    return "peer closed";
                }
                // Answered by the protocol layer
                Message::Ping(_) => {}
                Message::Text(_) | Message::Binary(_) => {
                    debug!(%connection_id, "Discarding inbound application message");
                }
            },
        }
    }
}

/// Forward mailbox items to the socket and keep the peer's deadline fed.
async fn outbound_duty(
    mut sink: SplitSink<WebSocket, Message>,
    mut mailbox: Mailbox,
    timings: Timings,
    connection_id: ConnectionId,
) {
    let mut heartbeat = interval_at(Instant::now() + timings.ping_period, timings.ping_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = mailbox.recv() => {
                let Some(first) = next else {
                    debug!(%connection_id, "Mailbox closed, sending close frame");
                    let close = Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "going away".into(),
                    }));
                    let _ = send_with_deadline(&mut sink, close, timings.write_wait).await;
                    break;
                };

                let mut frame = first.to_string();
                for payload in mailbox.drain_ready(MAX_BATCH - 1) {
                    frame.push('\n');
                    frame.push_str(payload.as_str());
                }
                let text = Message::Text(frame.into());
                if let Err(e) = send_with_deadline(&mut sink, text, timings.write_wait).await {
                    debug!(%connection_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let ping = Message::Ping(Bytes::new());
                if let Err(e) = send_with_deadline(&mut sink, ping, timings.write_wait).await {
                    debug!(%connection_id, error = %e, "Heartbeat failed");
                    break;
                }
            }
        }
    }

    let _ = timeout(timings.write_wait, sink.close()).await;
}

async fn send_with_deadline(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: Message,
    write_wait: Duration,
) -> PushResult<()> {
    match timeout(write_wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PushError::transport(e.to_string())),
        Err(_) => Err(PushError::transport("write deadline exceeded")),
    }
}
