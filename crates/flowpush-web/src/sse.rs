//! Server-Sent Events endpoint.
//!
//! A write-only hub subscriber: same mailbox and backpressure policy as the
//! WebSocket actor, with JSON heartbeats in place of ping frames.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
};
use flowpush_core::hub::{ConnectionId, Mailbox, Subscriber, SubscriberKind};
use flowpush_core::{Hub, Payload, TaskEvent};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::auth::{authenticate_request, TokenQuery};
use crate::error::ApiError;
use crate::state::AppState;

/// Unregisters the subscriber when the response body is dropped.
struct Registration {
    hub: Hub,
    connection_id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        debug!(connection_id = %self.connection_id, "Event stream closed");
        self.hub.unregister(self.connection_id);
    }
}

struct StreamState {
    pending: Option<Payload>,
    mailbox: Mailbox,
    heartbeat: Interval,
    task_id: String,
    registration: Registration,
}

/// Event-stream handler.
///
/// GET /sse/tasks/{task_id}?token=...
pub async fn sse_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let subject = authenticate_request(&state, &query, &headers).await?;
    let connected = TaskEvent::connected(&task_id, &subject.id).to_payload()?;

    let (subscriber, mailbox) = Subscriber::new(
        subject.id.clone(),
        task_id.clone(),
        SubscriberKind::Stream,
        state.config.mailbox_capacity,
    );
    let connection_id = subscriber.connection_id;
    state.hub.register(subscriber);

    info!(%connection_id, subject_id = %subject.id, task_id = %task_id, "Event stream opened");

    let period = state.config.sse_heartbeat();
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let body = event_stream(StreamState {
        pending: Some(connected),
        mailbox,
        heartbeat,
        task_id,
        registration: Registration {
            hub: state.hub.clone(),
            connection_id,
        },
    });

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::CONNECTION, HeaderValue::from_static("keep-alive")),
            (HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no")),
        ],
        Sse::new(body),
    ))
}

/// Yields the connected event, then mailbox items and heartbeats until the mailbox closes.
fn event_stream(
    state: StreamState,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    stream::unfold(state, |mut st| async move {
        if let Some(first) = st.pending.take() {
            return Some((Ok(frame(&first)), st));
        }

        tokio::select! {
            next = st.mailbox.recv() => match next {
                Some(payload) => Some((Ok(frame(&payload)), st)),
                None => {
                    debug!(
                        connection_id = %st.registration.connection_id,
                        "Mailbox closed, ending event stream"
                    );
                    None
                }
            },
            _ = st.heartbeat.tick() => match TaskEvent::heartbeat(&st.task_id).to_payload() {
                Ok(payload) => Some((Ok(frame(&payload)), st)),
                Err(e) => {
                    warn!(error = %e, "Failed to serialize heartbeat");
                    None
                }
            },
        }
    })
}

/// `data: <json>\n\n`
fn frame(payload: &Payload) -> Event {
    Event::default().data(payload.as_str())
}
