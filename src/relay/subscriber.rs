//! One remote listener with a bounded outbound queue.
//!
//! A [`Subscriber`] is the producer half: anything holding it can enqueue
//! opaque JSON messages without blocking. The transport task holds the
//! [`SubscriberQueue`] half and drains it onto the wire. Dropping every
//! `Subscriber` clone closes the queue and ends the transport task;
//! dropping the queue makes further publishes fail as closed.

use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::RelayError;

/// Default outbound queue depth per subscriber.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Consumer half of a subscriber's outbound queue.
pub type SubscriberQueue = mpsc::Receiver<Value>;

/// Handle to one remote listener.
#[derive(Clone)]
pub struct Subscriber {
    key: Uuid,
    queue: mpsc::Sender<Value>,
}

/// Create a subscriber with a fresh key and a queue of the given capacity
/// (clamped to at least 1).
pub fn channel(capacity: usize) -> (Subscriber, SubscriberQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Subscriber {
            key: Uuid::new_v4(),
            queue: tx,
        },
        rx,
    )
}

impl Subscriber {
    /// The key this subscriber is tracked under.
    pub fn key(&self) -> Uuid {
        self.key
    }

    /// Enqueue one message for asynchronous delivery, without blocking.
    ///
    /// A full queue is the caller's signal that this subscriber is not
    /// keeping up; the pool reacts by disconnecting it.
    pub fn publish(&self, msg: Value) -> Result<(), RelayError> {
        self.queue.try_send(msg).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => RelayError::QueueFull { key: self.key },
            mpsc::error::TrySendError::Closed(_) => RelayError::SubscriberClosed { key: self.key },
        })
    }
}
