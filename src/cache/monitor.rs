//! Change monitor: one background task per cache.
//!
//! The monitor wakes on the cache's dirty signal, reduces a fresh snapshot,
//! and publishes only when the derived projection differs structurally from
//! the previous one. Mutations that land mid-cycle leave the signal set, so
//! the next cycle re-checks; repeated wakes without an actual change never
//! emit. The task runs for the process lifetime; there is no cancellation.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::trace;

use super::store::{Cache, CacheKey, CacheValue};

const METRIC_PUBLISH: &str = "riverbero_monitor_publish_total";
const METRIC_REDUCE_MS: &str = "riverbero_reduce_ms";

pub(crate) fn spawn<K: CacheKey, V: CacheValue>(cache: Arc<Cache<K, V>>) -> JoinHandle<()> {
    tokio::spawn(run(cache))
}

async fn run<K: CacheKey, V: CacheValue>(cache: Arc<Cache<K, V>>) {
    let mut previous: Option<Value> = None;
    loop {
        observe(&cache, &mut previous);
        // notify_one stores a permit, so a mutation racing observe() is
        // picked up immediately instead of being lost.
        cache.dirty().notified().await;
    }
}

/// One monitor cycle: snapshot, reduce, compare, record-and-publish.
fn observe<K: CacheKey, V: CacheValue>(cache: &Cache<K, V>, previous: &mut Option<Value>) {
    let (snapshot, reduce) = cache.observe_input();

    let reduce_started = Instant::now();
    let derived = reduce(&snapshot);
    histogram!(METRIC_REDUCE_MS).record(reduce_started.elapsed().as_secs_f64() * 1000.0);

    if previous.as_ref() == Some(&derived) {
        trace!("projection unchanged, nothing to publish");
        return;
    }

    cache.record(snapshot, derived.clone());
    counter!(METRIC_PUBLISH).increment(1);
    *previous = Some(derived);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::reducer::Snapshot;

    async fn next_reduced(cache: &Arc<Cache<String, u32>>) -> Value {
        tokio::time::timeout(Duration::from_secs(5), cache.reducer_feed().recv())
            .await
            .expect("feed entry within deadline")
            .expect("feed open")
    }

    /// Give the monitor time to run any pending cycle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn initial_projection_is_published() {
        let cache: Arc<Cache<String, u32>> = Cache::new(CacheConfig::default());
        assert_eq!(next_reduced(&cache).await, json!([]));
        assert_eq!(cache.reducer_history().len(), 1);
    }

    #[tokio::test]
    async fn each_change_publishes_exactly_one_projection() {
        let cache: Arc<Cache<String, u32>> = Cache::new(CacheConfig::default());
        assert_eq!(next_reduced(&cache).await, json!([]));

        cache.save("a".into(), 1).expect("save");
        assert_eq!(next_reduced(&cache).await, json!([1]));

        cache.save("b".into(), 2).expect("save");
        assert_eq!(next_reduced(&cache).await, json!([1, 2]));

        cache.delete(&"a".into()).expect("delete");
        assert_eq!(next_reduced(&cache).await, json!([2]));

        settle().await;
        assert!(cache.reducer_feed().try_recv().is_none());
    }

    #[tokio::test]
    async fn unchanged_projection_never_emits() {
        let cache: Arc<Cache<String, u32>> = Cache::new(CacheConfig::default());
        assert_eq!(next_reduced(&cache).await, json!([]));

        cache.save("a".into(), 1).expect("save");
        assert_eq!(next_reduced(&cache).await, json!([1]));

        // Same projection from a different reducer registration: the dirty
        // signal fires, the derived value does not change, nothing is
        // published.
        cache.set_reducer(crate::cache::reducer::default_reducer);
        settle().await;
        assert!(cache.reducer_feed().try_recv().is_none());
        assert_eq!(cache.reducer_history().len(), 2);
    }

    #[tokio::test]
    async fn reducer_replacement_wins_and_reprojects() {
        let cache: Arc<Cache<String, u32>> = Cache::new(CacheConfig::default());
        assert_eq!(next_reduced(&cache).await, json!([]));

        cache.save("a".into(), 2).expect("save");
        assert_eq!(next_reduced(&cache).await, json!([2]));

        cache.set_reducer(|snapshot: &Snapshot<String, u32>| {
            json!(snapshot.values().map(|item| item.data).sum::<u32>())
        });
        assert_eq!(next_reduced(&cache).await, json!(2));

        cache.set_reducer(|snapshot: &Snapshot<String, u32>| {
            json!(snapshot.values().map(|item| u64::from(item.data) * 10).sum::<u64>())
        });
        assert_eq!(next_reduced(&cache).await, json!(20));
    }

    #[tokio::test]
    async fn histories_grow_in_step_with_the_feed() {
        let cache: Arc<Cache<String, u32>> = Cache::new(CacheConfig::default());
        assert_eq!(next_reduced(&cache).await, json!([]));

        cache.save("a".into(), 1).expect("save");
        let _ = next_reduced(&cache).await;
        cache.save("b".into(), 2).expect("save");
        let _ = next_reduced(&cache).await;

        let raw = cache.raw_history();
        let reduced = cache.reducer_history();
        assert_eq!(raw.len(), 3);
        assert_eq!(reduced.len(), 3);
        assert!(raw.keys().eq(reduced.keys()));

        let latest = raw.values().next_back().expect("latest snapshot");
        assert_eq!(latest.len(), 2);
    }

    #[tokio::test]
    async fn raw_feed_carries_the_snapshot_itself() {
        let cache: Arc<Cache<String, u32>> = Cache::new(CacheConfig::default());
        let raw_feed = cache.raw_feed();

        let initial = tokio::time::timeout(Duration::from_secs(5), raw_feed.recv())
            .await
            .expect("deadline")
            .expect("open");
        assert!(initial.is_empty());

        cache.save("a".into(), 5).expect("save");
        let snapshot = tokio::time::timeout(Duration::from_secs(5), raw_feed.recv())
            .await
            .expect("deadline")
            .expect("open");
        assert_eq!(snapshot.get(&"a".to_string()).expect("item").data, 5);
    }
}
