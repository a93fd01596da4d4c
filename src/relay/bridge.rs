//! Feed-to-relay bridge.
//!
//! Completes the pipeline: derived values published by a cache's monitor
//! are consumed from the reduction feed and broadcast to the relay's
//! subscribers.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::Feed;

use super::server::RelayServer;

/// Pump a reduction feed into a relay server until the feed closes.
pub fn spawn_reducer_bridge(feed: Feed<Value>, server: Arc<RelayServer>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(derived) = feed.recv().await {
            server.publish(derived);
        }
        debug!("reduction feed closed, bridge stopping");
    })
}
