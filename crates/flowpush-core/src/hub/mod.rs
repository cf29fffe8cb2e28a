//! Broadcast hub - registry and fan-out authority over live subscribers.
//!
//! Two admission paths share one registry lock:
//!
//! ```text
//!  register / unregister / broadcast ──► command queue ──► worker ─┐
//!                                                                  ├─► RwLock<HashMap<..>>
//!  broadcast_to_user / broadcast_to_task / count / contains ───────┘
//! ```
//!
//! Funneled calls are plain enqueues and never block the caller, so they are
//! safe from `Drop` impls. Delivery uses `try_send`: a subscriber whose
//! mailbox is full is removed on the spot (drop-and-disconnect), which
//! closes its mailbox and ends its outbound duty.

mod subscriber;

pub use subscriber::{ConnectionId, Mailbox, Subscriber, SubscriberKind, TryRecvError};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

use crate::event::Payload;

type Registry = Arc<RwLock<HashMap<ConnectionId, Subscriber>>>;

enum Command {
    Register(Subscriber),
    Unregister(ConnectionId),
    Broadcast(Payload),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle to the process-wide hub. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    registry: Registry,
    commands: mpsc::UnboundedSender<Command>,
}

impl Hub {
    /// Create a hub and spawn its worker on the current tokio runtime.
    ///
    /// The worker stops on [`Hub::shutdown`] or when every handle is dropped.
    pub fn new() -> Self {
        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(registry.clone(), rx));
        Self { registry, commands }
    }

    /// Queue `subscriber` for registration.
    pub fn register(&self, subscriber: Subscriber) {
        if let Err(mpsc::error::SendError(Command::Register(sub))) =
            self.commands.send(Command::Register(subscriber))
        {
            // Worker is gone; dropping the subscriber closes its mailbox.
            debug!(connection_id = %sub.connection_id, "Hub stopped, registration refused");
        }
    }

    /// Queue removal of a subscriber. Absent ids are ignored.
    pub fn unregister(&self, connection_id: ConnectionId) {
        let _ = self.commands.send(Command::Unregister(connection_id));
    }

    /// Queue delivery of `payload` to every live subscriber.
    pub fn broadcast(&self, payload: Payload) {
        let _ = self.commands.send(Command::Broadcast(payload));
    }

    /// Deliver to subscribers authenticated as `subject_id`. Returns the number reached.
    pub async fn broadcast_to_user(&self, subject_id: &str, payload: Payload) -> usize {
        let mut subscribers = self.registry.write().await;
        deliver(&mut subscribers, &payload, |s| s.subject_id == subject_id)
    }

    /// Deliver to subscribers whose connection was opened against `task_id`.
    pub async fn broadcast_to_task(&self, task_id: &str, payload: Payload) -> usize {
        let mut subscribers = self.registry.write().await;
        deliver(&mut subscribers, &payload, |s| s.task_id == task_id)
    }

    pub async fn count(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn contains(&self, connection_id: ConnectionId) -> bool {
        self.registry.read().await.contains_key(&connection_id)
    }

    /// Wait until every command queued before this call has been processed.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Close every mailbox and stop the worker. Later funneled calls are no-ops.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(registry: Registry, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Register(subscriber) => {
                let mut subscribers = registry.write().await;
                info!(
                    connection_id = %subscriber.connection_id,
                    subject_id = %subscriber.subject_id,
                    task_id = %subscriber.task_id,
                    kind = subscriber.kind.as_str(),
                    active = subscribers.len() + 1,
                    "Subscriber registered"
                );
                subscribers.insert(subscriber.connection_id, subscriber);
            }
            Command::Unregister(connection_id) => {
                let mut subscribers = registry.write().await;
                if subscribers.remove(&connection_id).is_some() {
                    info!(%connection_id, active = subscribers.len(), "Subscriber unregistered");
                } else {
                    debug!(%connection_id, "Unregister for unknown subscriber ignored");
                }
            }
            Command::Broadcast(payload) => {
                let mut subscribers = registry.write().await;
                deliver(&mut subscribers, &payload, |_| true);
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => {
                let mut subscribers = registry.write().await;
                info!(active = subscribers.len(), "Hub shutting down, closing all mailboxes");
                subscribers.clear();
                break;
            }
        }
    }
    debug!("Hub worker stopped");
}

/// Offer `payload` to every subscriber matching `filter`, evicting the unresponsive.
fn deliver<F>(
    subscribers: &mut HashMap<ConnectionId, Subscriber>,
    payload: &Payload,
    filter: F,
) -> usize
where
    F: Fn(&Subscriber) -> bool,
{
    let mut sent = 0;
    let mut evicted = Vec::new();

    for (connection_id, subscriber) in subscribers.iter() {
        if !filter(subscriber) {
            continue;
        }
        match subscriber.mailbox.try_send(payload.clone()) {
            Ok(()) => sent += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    %connection_id,
                    subject_id = %subscriber.subject_id,
                    "Mailbox full, disconnecting subscriber"
                );
                evicted.push(*connection_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%connection_id, "Mailbox receiver gone, removing subscriber");
                evicted.push(*connection_id);
            }
        }
    }

    for connection_id in &evicted {
        subscribers.remove(connection_id);
    }

    if !evicted.is_empty() {
        debug!(
            sent,
            evicted = evicted.len(),
            active = subscribers.len(),
            "Broadcast completed with evictions"
        );
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAILBOX_CAPACITY;

    fn subscriber(subject: &str, task: &str) -> (Subscriber, Mailbox) {
        Subscriber::new(subject, task, SubscriberKind::Duplex, DEFAULT_MAILBOX_CAPACITY)
    }

    fn drain(mailbox: &mut Mailbox) -> Vec<String> {
        mailbox
            .drain_ready(usize::MAX)
            .iter()
            .map(|p| p.as_str().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_register_unregister_membership() {
        let hub = Hub::new();
        let (sub, _mailbox) = subscriber("u1", "t1");
        let id = sub.connection_id;

        hub.register(sub);
        hub.flush().await;
        assert!(hub.contains(id).await);
        assert_eq!(hub.count().await, 1);

        hub.unregister(id);
        hub.flush().await;
        assert!(!hub.contains(id).await);
        assert_eq!(hub.count().await, 0);
    }

    #[tokio::test]
    async fn test_double_unregister_is_noop() {
        let hub = Hub::new();
        let (sub, mut mailbox) = subscriber("u1", "t1");
        let id = sub.connection_id;

        hub.register(sub);
        hub.unregister(id);
        hub.unregister(id);
        hub.flush().await;

        assert!(!hub.contains(id).await);
        assert_eq!(mailbox.recv().await, None);
    }

    #[tokio::test]
    async fn test_broadcast_preserves_order() {
        let hub = Hub::new();
        let mut mailboxes = Vec::new();
        for i in 0..3 {
            let (sub, mailbox) = subscriber(&format!("u{i}"), "t1");
            hub.register(sub);
            mailboxes.push(mailbox);
        }

        hub.broadcast(Payload::from("one"));
        hub.broadcast(Payload::from("two"));
        hub.broadcast(Payload::from("three"));
        hub.flush().await;

        for mailbox in &mut mailboxes {
            assert_eq!(drain(mailbox), vec!["one", "two", "three"]);
        }
    }

    #[tokio::test]
    async fn test_broadcast_to_user_filters_by_subject() {
        let hub = Hub::new();
        let (a, mut a_box) = subscriber("u1", "t1");
        let (b, mut b_box) = subscriber("u1", "t2");
        let (c, mut c_box) = subscriber("u2", "t1");
        hub.register(a);
        hub.register(b);
        hub.register(c);
        hub.flush().await;

        let reached = hub.broadcast_to_user("u1", Payload::from("msg")).await;

        assert_eq!(reached, 2);
        assert_eq!(drain(&mut a_box), vec!["msg"]);
        assert_eq!(drain(&mut b_box), vec!["msg"]);
        assert!(drain(&mut c_box).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_to_task_filters_by_affinity() {
        let hub = Hub::new();
        let (a, mut a_box) = subscriber("u1", "t1");
        let (b, mut b_box) = Subscriber::new("u2", "t1", SubscriberKind::Stream, 8);
        let (c, mut c_box) = subscriber("u1", "t2");
        hub.register(a);
        hub.register(b);
        hub.register(c);
        hub.flush().await;

        let reached = hub.broadcast_to_task("t1", Payload::from("approved")).await;

        assert_eq!(reached, 2);
        assert_eq!(drain(&mut a_box), vec!["approved"]);
        assert_eq!(drain(&mut b_box), vec!["approved"]);
        assert!(drain(&mut c_box).is_empty());
    }

    #[tokio::test]
    async fn test_full_mailbox_disconnects_only_that_subscriber() {
        let hub = Hub::new();
        let (slow, mut slow_box) = subscriber("u1", "t1");
        let (steady, mut steady_box) = Subscriber::new("u2", "t1", SubscriberKind::Duplex, 1024);
        let slow_id = slow.connection_id;
        let steady_id = steady.connection_id;
        hub.register(slow);
        hub.register(steady);

        for i in 0..DEFAULT_MAILBOX_CAPACITY {
            hub.broadcast(Payload::from(format!("m{i}")));
        }
        hub.flush().await;
        assert!(hub.contains(slow_id).await);

        let (fresh, mut fresh_box) = subscriber("u3", "t1");
        hub.register(fresh);
        hub.broadcast(Payload::from("overflow"));
        hub.flush().await;

        assert!(!hub.contains(slow_id).await);
        assert!(hub.contains(steady_id).await);
        assert_eq!(drain(&mut fresh_box), vec!["overflow"]);
        assert_eq!(drain(&mut steady_box).len(), DEFAULT_MAILBOX_CAPACITY + 1);

        // Queued items remain readable, then the mailbox reports closed.
        assert_eq!(drain(&mut slow_box).len(), DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(slow_box.try_recv(), Err(TryRecvError::Disconnected));

        hub.broadcast(Payload::from("after"));
        hub.flush().await;
        assert_eq!(drain(&mut fresh_box), vec!["after"]);
    }

    #[tokio::test]
    async fn test_full_mailbox_on_direct_path() {
        let hub = Hub::new();
        let (sub, _mailbox) = Subscriber::new("u1", "t1", SubscriberKind::Stream, 1);
        let id = sub.connection_id;
        hub.register(sub);
        hub.flush().await;

        assert_eq!(hub.broadcast_to_user("u1", Payload::from("a")).await, 1);
        assert_eq!(hub.broadcast_to_user("u1", Payload::from("b")).await, 0);
        assert!(!hub.contains(id).await);
    }

    #[tokio::test]
    async fn test_dropped_mailbox_is_evicted() {
        let hub = Hub::new();
        let (sub, mailbox) = subscriber("u1", "t1");
        let id = sub.connection_id;
        hub.register(sub);
        drop(mailbox);

        hub.broadcast(Payload::from("x"));
        hub.flush().await;
        assert!(!hub.contains(id).await);
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_mailboxes() {
        let hub = Hub::new();
        let (a, mut a_box) = subscriber("u1", "t1");
        let (b, mut b_box) = subscriber("u2", "t2");
        hub.register(a);
        hub.register(b);
        hub.flush().await;

        hub.shutdown();
        assert_eq!(a_box.recv().await, None);
        assert_eq!(b_box.recv().await, None);
        assert_eq!(hub.count().await, 0);

        // Registration after shutdown closes the newcomer immediately.
        let (late, mut late_box) = subscriber("u3", "t3");
        hub.register(late);
        hub.flush().await;
        assert_eq!(late_box.recv().await, None);
        assert_eq!(hub.count().await, 0);
    }
}
