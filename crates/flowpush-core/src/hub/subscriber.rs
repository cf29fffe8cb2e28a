//! Subscriber handles and their mailboxes.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event::Payload;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Connection ID (unique per accepted subscriber)
pub type ConnectionId = Uuid;

/// Which transport a subscriber is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberKind {
    /// WebSocket connection actor.
    Duplex,
    /// Write-only event stream.
    Stream,
}

impl SubscriberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplex => "duplex",
            Self::Stream => "stream",
        }
    }
}

/// The hub-side half of a subscriber.
///
/// Owns the only sender into the mailbox: when the hub drops a
/// `Subscriber`, the paired [`Mailbox`] observes a closed channel.
/// Deliberately not `Clone`.
#[derive(Debug)]
pub struct Subscriber {
    pub connection_id: ConnectionId,
    pub subject_id: String,
    pub task_id: String,
    pub kind: SubscriberKind,
    pub(crate) mailbox: mpsc::Sender<Payload>,
}

impl Subscriber {
    /// Create a fresh subscriber and the receiving half of its mailbox.
    pub fn new(
        subject_id: impl Into<String>,
        task_id: impl Into<String>,
        kind: SubscriberKind,
        capacity: usize,
    ) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            connection_id: Uuid::new_v4(),
            subject_id: subject_id.into(),
            task_id: task_id.into(),
            kind,
            mailbox: tx,
        };
        (subscriber, Mailbox { rx })
    }
}

/// Receiving half of a subscriber's bounded outbound queue.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::Receiver<Payload>,
}

impl Mailbox {
    /// Next message, or `None` once the hub has closed the mailbox and it is drained.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Payload, TryRecvError> {
        self.rx.try_recv()
    }

    /// Collect up to `max` messages that are already queued, without waiting.
    pub fn drain_ready(&mut self, max: usize) -> Vec<Payload> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(payload) => batch.push(payload),
                Err(_) => break,
            }
        }
        batch
    }
}
