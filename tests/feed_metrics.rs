//! Verifies the metric keys emitted along the publish and fan-out paths.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use riverbero::cache::{Cache, CacheConfig};
use riverbero::relay::{SubscriberPool, subscriber};
use serde_json::json;

#[tokio::test]
async fn publish_and_fanout_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Monitor publish + reduce latency: a tiny feed forces overflow drops.
    let cache: Arc<Cache<String, u32>> = Cache::new(CacheConfig {
        feed_capacity: 1,
        ..Default::default()
    });
    for i in 0..4u32 {
        cache.save(format!("k{i}"), i).expect("save");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::timeout(Duration::from_secs(5), async {
        while cache.reducer_feed().dropped() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reduction feed overflowed");

    // Fan-out: one responsive subscriber, one with a saturated queue.
    let pool = SubscriberPool::new();
    let (healthy, mut healthy_queue) = subscriber::channel(8);
    let (slow, _slow_queue) = subscriber::channel(1);
    pool.add(healthy).expect("attach healthy");
    pool.add(slow).expect("attach slow");

    pool.broadcast(&json!("m1"));
    pool.broadcast(&json!("m2"));
    assert_eq!(pool.len(), 1);
    assert_eq!(healthy_queue.recv().await, Some(json!("m1")));

    let snapshot = snapshotter.snapshot();
    let seen: HashSet<String> = snapshot
        .into_vec()
        .into_iter()
        .map(|(key, _, _, _)| key.key().name().to_string())
        .collect();

    for expected in [
        "riverbero_monitor_publish_total",
        "riverbero_reduce_ms",
        "riverbero_feed_dropped_total",
        "riverbero_broadcast_total",
        "riverbero_subscriber_dropped_total",
        "riverbero_subscribers_active",
    ] {
        assert!(seen.contains(expected), "missing metric key: {expected}");
    }
}
