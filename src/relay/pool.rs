//! Subscriber fan-out for one relay server.
//!
//! Broadcast never blocks on a slow consumer: each delivery is a
//! non-blocking enqueue, and a subscriber whose queue is full is treated as
//! unresponsive and removed from the pool, which closes its connection.
//! Per-subscriber delivery stays FIFO relative to one producer's broadcast
//! order; nothing is guaranteed across concurrent producers.

use std::collections::HashMap;
use std::sync::RwLock;

use metrics::{counter, gauge};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::lock;

use super::error::RelayError;
use super::subscriber::Subscriber;

const METRIC_BROADCAST: &str = "riverbero_broadcast_total";
const METRIC_SUBSCRIBER_DROPPED: &str = "riverbero_subscriber_dropped_total";
const METRIC_SUBSCRIBERS_ACTIVE: &str = "riverbero_subscribers_active";

/// The set of live subscribers attached to one relay server.
pub struct SubscriberPool {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
}

impl SubscriberPool {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a subscriber.
    ///
    /// Fails with [`RelayError::DuplicateSubscriberKey`] if its key is
    /// already tracked.
    pub fn add(&self, subscriber: Subscriber) -> Result<(), RelayError> {
        let key = subscriber.key();
        {
            let mut subscribers = lock::write(&self.subscribers, "pool.add");
            if subscribers.contains_key(&key) {
                return Err(RelayError::DuplicateSubscriberKey { key });
            }
            subscribers.insert(key, subscriber);
            gauge!(METRIC_SUBSCRIBERS_ACTIVE).set(subscribers.len() as f64);
        }
        info!(subscriber = %key, "subscriber attached");
        Ok(())
    }

    /// Detach a subscriber. Idempotent; returns whether it was present.
    ///
    /// Dropping the pool's handle closes the subscriber's queue once the
    /// transport task releases its own clone.
    pub fn remove(&self, key: &Uuid) -> bool {
        let mut subscribers = lock::write(&self.subscribers, "pool.remove");
        let removed = subscribers.remove(key).is_some();
        gauge!(METRIC_SUBSCRIBERS_ACTIVE).set(subscribers.len() as f64);
        removed
    }

    /// Deliver `msg` to every attached subscriber.
    ///
    /// Subscribers that cannot accept the message (queue full or connection
    /// gone) are disconnected; delivery to the rest is unaffected.
    pub fn broadcast(&self, msg: &Value) {
        let unresponsive: Vec<Uuid> = {
            let subscribers = lock::read(&self.subscribers, "pool.broadcast");
            subscribers
                .values()
                .filter_map(|subscriber| match subscriber.publish(msg.clone()) {
                    Ok(()) => None,
                    Err(err) => {
                        warn!(subscriber = %subscriber.key(), error = %err, "dropping subscriber");
                        Some(subscriber.key())
                    }
                })
                .collect()
        };

        for key in &unresponsive {
            self.remove(key);
            counter!(METRIC_SUBSCRIBER_DROPPED).increment(1);
        }
        counter!(METRIC_BROADCAST).increment(1);
    }

    /// Number of attached subscribers.
    pub fn len(&self) -> usize {
        lock::read(&self.subscribers, "pool.len").len()
    }

    /// True when no subscribers are attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::super::subscriber;
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let pool = SubscriberPool::new();
        let (sub_a, mut queue_a) = subscriber::channel(4);
        let (sub_b, mut queue_b) = subscriber::channel(4);
        pool.add(sub_a).expect("attach a");
        pool.add(sub_b).expect("attach b");

        pool.broadcast(&json!({"n": 1}));

        assert_eq!(queue_a.recv().await, Some(json!({"n": 1})));
        assert_eq!(queue_b.recv().await, Some(json!({"n": 1})));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let pool = SubscriberPool::new();
        let (subscriber, _queue) = subscriber::channel(4);

        pool.add(subscriber.clone()).expect("first attach");
        let err = pool.add(subscriber).expect_err("same key");
        assert!(matches!(err, RelayError::DuplicateSubscriberKey { .. }));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let pool = SubscriberPool::new();
        let (subscriber, _queue) = subscriber::channel(4);
        let key = subscriber.key();
        pool.add(subscriber).expect("attach");

        assert!(pool.remove(&key));
        assert!(!pool.remove(&key));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn slow_subscribers_are_disconnected_not_waited_on() {
        let pool = SubscriberPool::new();
        let mut queues = Vec::new();
        for _ in 0..3 {
            let (subscriber, queue) = subscriber::channel(1);
            pool.add(subscriber).expect("attach");
            queues.push(queue);
        }

        // First broadcast fills every capacity-1 queue.
        pool.broadcast(&json!("m1"));
        assert_eq!(pool.len(), 3);

        // Nobody drained: the second broadcast finds every queue full and
        // disconnects all three.
        pool.broadcast(&json!("m2"));
        assert!(pool.is_empty());

        // The first message was still delivered.
        for queue in &mut queues {
            assert_eq!(queue.recv().await, Some(json!("m1")));
        }
    }

    #[tokio::test]
    async fn closed_subscriber_is_pruned_on_broadcast() {
        let pool = SubscriberPool::new();
        let (subscriber, queue) = subscriber::channel(4);
        pool.add(subscriber).expect("attach");
        drop(queue);

        pool.broadcast(&json!("gone"));
        assert!(pool.is_empty());
    }
}
