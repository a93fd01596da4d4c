//! The typed item store.
//!
//! A [`Cache`] owns a keyed live set of timestamped items, an append-only
//! pair of histories (raw snapshots and derived projections), and the feeds
//! its change monitor publishes to. All mutations go through the cache's
//! single exclusive lock and wake the monitor with a dirty signal; the lock
//! is never held across an await.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Notify;
use tracing::debug;

use super::config::CacheConfig;
use super::error::CacheError;
use super::feed::{self, Feed, FeedSender};
use super::lock;
use super::monitor;
use super::reducer::{Item, Reducer, Snapshot};

/// Bounds required of a cache key: hashable for the live set, ordered for
/// snapshots and histories, printable for error messages.
pub trait CacheKey: Eq + Hash + Ord + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Ord + Clone + Debug + Send + Sync + 'static {}

/// Bounds required of a cached value: cloneable into snapshots and
/// serializable by the default reducer and the relay.
pub trait CacheValue: Clone + Serialize + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + Send + Sync + 'static {}

struct CacheInner<K, V> {
    live: HashMap<K, Item<V>>,
    raw_history: BTreeMap<OffsetDateTime, Snapshot<K, V>>,
    reducer: Option<Reducer<K, V>>,
    reducer_history: BTreeMap<OffsetDateTime, Value>,
    // Publish stamps key the histories, so they must be strictly increasing
    // even when two cycles land within clock resolution.
    last_stamp: Option<OffsetDateTime>,
}

/// A single typed cache with change detection and reduction.
///
/// Construction spawns the cache's change monitor, which runs for the rest
/// of the process lifetime; there is no shutdown path for it.
pub struct Cache<K, V> {
    created_at: OffsetDateTime,
    config: CacheConfig,
    inner: RwLock<CacheInner<K, V>>,
    dirty: Notify,
    raw_tx: FeedSender<Snapshot<K, V>>,
    raw_rx: Feed<Snapshot<K, V>>,
    reduced_tx: FeedSender<Value>,
    reduced_rx: Feed<Value>,
}

impl<K, V> Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    /// Create a cache and start its change monitor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: CacheConfig) -> Arc<Self> {
        let (raw_tx, raw_rx) = feed::channel("raw", config.feed_capacity);
        let (reduced_tx, reduced_rx) = feed::channel("reduced", config.feed_capacity);
        let cache = Arc::new(Self {
            created_at: OffsetDateTime::now_utc(),
            config,
            inner: RwLock::new(CacheInner {
                live: HashMap::new(),
                raw_history: BTreeMap::new(),
                reducer: None,
                reducer_history: BTreeMap::new(),
                last_stamp: None,
            }),
            dirty: Notify::new(),
            raw_tx,
            raw_rx,
            reduced_tx,
            reduced_rx,
        });
        monitor::spawn(Arc::clone(&cache));
        cache
    }

    /// Insert `data` under `key`.
    ///
    /// Fails with [`CacheError::DuplicateKey`] if the key is already live;
    /// callers must `delete` first. The existing item is left untouched.
    pub fn save(&self, key: K, data: V) -> Result<(), CacheError> {
        {
            let mut inner = lock::write(&self.inner, "save");
            if inner.live.contains_key(&key) {
                return Err(CacheError::duplicate_key(&key));
            }
            inner.live.insert(
                key,
                Item {
                    created_at: OffsetDateTime::now_utc(),
                    data,
                },
            );
        }
        self.dirty.notify_one();
        Ok(())
    }

    /// Insert `data` under `key` and schedule its eviction after `timeout`.
    ///
    /// When the timer fires the key is removed and `on_evict` receives the
    /// evicted value, exactly once. An explicit [`Cache::delete`] that wins
    /// the race makes the eviction a silent no-op: nothing is re-deleted and
    /// the callback never runs.
    pub fn save_with_timeout(
        self: &Arc<Self>,
        key: K,
        data: V,
        timeout: Duration,
        on_evict: impl FnOnce(V) + Send + 'static,
    ) -> Result<(), CacheError> {
        if timeout.is_zero() {
            return Err(CacheError::InvalidTimeout { timeout });
        }
        self.save(key.clone(), data)?;

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cache.evict(&key, on_evict);
        });
        Ok(())
    }

    fn evict(&self, key: &K, on_evict: impl FnOnce(V)) {
        let evicted = {
            let mut inner = lock::write(&self.inner, "evict");
            inner.live.remove(key)
        };
        match evicted {
            Some(item) => {
                self.dirty.notify_one();
                debug!(key = ?key, "evicted expired item");
                on_evict(item.data);
            }
            // Deleted before the timer fired; the eviction is already done.
            None => debug!(key = ?key, "eviction skipped, key already gone"),
        }
    }

    /// Look up one item.
    pub fn get(&self, key: &K) -> Option<Item<V>> {
        lock::read(&self.inner, "get").live.get(key).cloned()
    }

    /// The live set as of this call.
    ///
    /// Concurrent writers may change the cache immediately afterwards; use
    /// [`Cache::snapshot`] when a consistent, ordered view is needed.
    pub fn get_all(&self) -> HashMap<K, Item<V>> {
        lock::read(&self.inner, "get_all").live.clone()
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        lock::read(&self.inner, "len").live.len()
    }

    /// True when no items are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take an isolated, key-ordered copy of the live set.
    pub fn snapshot(&self) -> Snapshot<K, V> {
        lock::read(&self.inner, "snapshot")
            .live
            .iter()
            .map(|(key, item)| (key.clone(), item.clone()))
            .collect()
    }

    /// Remove one item.
    ///
    /// Fails with [`CacheError::KeyNotFound`] if the key is not live.
    pub fn delete(&self, key: &K) -> Result<(), CacheError> {
        {
            let mut inner = lock::write(&self.inner, "delete");
            if inner.live.remove(key).is_none() {
                return Err(CacheError::key_not_found(key));
            }
        }
        self.dirty.notify_one();
        Ok(())
    }

    /// Install the active reducer, replacing any previous registration.
    ///
    /// The monitor re-reduces on the next wake, so a reducer swap publishes
    /// a new derived value iff the projection actually changes.
    pub fn set_reducer(&self, reduce: impl Fn(&Snapshot<K, V>) -> Value + Send + Sync + 'static) {
        lock::write(&self.inner, "set_reducer").reducer = Some(Arc::new(reduce));
        self.dirty.notify_one();
    }

    /// The shared feed of raw snapshots, one entry per observed change.
    pub fn raw_feed(&self) -> Feed<Snapshot<K, V>> {
        self.raw_rx.clone()
    }

    /// The shared feed of derived values, one entry per observed change.
    pub fn reducer_feed(&self) -> Feed<Value> {
        self.reduced_rx.clone()
    }

    /// Accumulated snapshot history, keyed by publish stamp.
    pub fn raw_history(&self) -> BTreeMap<OffsetDateTime, Snapshot<K, V>> {
        lock::read(&self.inner, "raw_history").raw_history.clone()
    }

    /// Accumulated derived-value history, keyed by publish stamp.
    pub fn reducer_history(&self) -> BTreeMap<OffsetDateTime, Value> {
        lock::read(&self.inner, "reducer_history")
            .reducer_history
            .clone()
    }

    /// When this cache was constructed.
    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub(crate) fn dirty(&self) -> &Notify {
        &self.dirty
    }

    /// Snapshot the live set together with the currently active reducer,
    /// installing the default reducer on first need.
    pub(crate) fn observe_input(&self) -> (Snapshot<K, V>, Reducer<K, V>) {
        let snapshot = self.snapshot();
        {
            let inner = lock::read(&self.inner, "observe_input");
            if let Some(reduce) = inner.reducer.clone() {
                return (snapshot, reduce);
            }
        }

        let mut inner = lock::write(&self.inner, "observe_input.install_default");
        let reduce = inner
            .reducer
            .get_or_insert_with(|| {
                debug!("no reducer registered, installing default");
                Arc::new(super::reducer::default_reducer::<K, V>)
            })
            .clone();
        (snapshot, reduce)
    }

    /// Record one observed change into both histories and publish it.
    pub(crate) fn record(&self, snapshot: Snapshot<K, V>, derived: Value) {
        {
            let mut inner = lock::write(&self.inner, "record");
            let mut stamp = OffsetDateTime::now_utc();
            if let Some(last) = inner.last_stamp
                && stamp <= last
            {
                stamp = last + Duration::from_nanos(1);
            }
            inner.last_stamp = Some(stamp);
            inner.raw_history.insert(stamp, snapshot.clone());
            inner.reducer_history.insert(stamp, derived.clone());

            let limit = self.config.history_limit;
            if limit > 0 {
                while inner.raw_history.len() > limit {
                    inner.raw_history.pop_first();
                }
                while inner.reducer_history.len() > limit {
                    inner.reducer_history.pop_first();
                }
            }
        }
        self.raw_tx.publish(snapshot);
        self.reduced_tx.publish(derived);
    }
}
