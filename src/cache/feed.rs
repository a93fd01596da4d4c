//! Bounded publish/consume feeds.
//!
//! Each cache owns one raw feed (snapshots) and one reduction feed (derived
//! values). A feed is a single shared queue, not a broadcast: when several
//! readers hold the same [`Feed`], they compete for entries. Fan-out to many
//! observers is the relay pool's job, not the feed's.
//!
//! Publishing never blocks the monitor. A full feed drops the entry and
//! counts the drop, mirroring the relay's drop-slow-consumer policy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

const METRIC_FEED_DROPPED: &str = "riverbero_feed_dropped_total";

/// Create a feed pair with the given capacity (clamped to at least 1).
pub(crate) fn channel<T>(label: &'static str, capacity: usize) -> (FeedSender<T>, Feed<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let sender = FeedSender {
        label,
        tx,
        dropped: Arc::clone(&dropped),
    };
    let feed = Feed {
        rx: Arc::new(Mutex::new(rx)),
        dropped,
    };
    (sender, feed)
}

/// Consumer half of a feed. Cloning yields another competing reader of the
/// same underlying queue.
pub struct Feed<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> Feed<T> {
    /// Wait for the next published entry.
    ///
    /// Returns `None` once the publishing side is gone, which for a cache
    /// feed means the cache itself was dropped.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Non-blocking poll. Returns `None` when the feed is currently empty or
    /// another reader holds the queue.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Number of entries discarded because the feed was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer half of a feed, held by the change monitor.
pub(crate) struct FeedSender<T> {
    label: &'static str,
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> FeedSender<T> {
    /// Enqueue without blocking. A full queue discards the entry.
    pub(crate) fn publish(&self, value: T) {
        match self.tx.try_send(value) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                counter!(METRIC_FEED_DROPPED, "feed" => self.label).increment(1);
                debug!(feed = self.label, "feed full, dropping entry");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(feed = self.label, "feed closed, dropping entry");
            }
        }
    }
}
