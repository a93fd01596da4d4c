//! Reduction pipeline: snapshots in, one derived projection out.
//!
//! A reducer maps the entire keyed snapshot of a cache to a single
//! [`serde_json::Value`]. The derived shape is entirely caller-defined; the
//! engine only requires that it can be compared structurally (to suppress
//! no-op publishes) and serialized for the relay. Reducers must be total:
//! there is no error channel out of the reduction step.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// A stored value plus its creation timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct Item<V> {
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub data: V,
}

/// Point-in-time, independent copy of a cache's live set.
///
/// Ordered by key so that reduction and serialization are deterministic for
/// identical contents. A snapshot never aliases the live set; mutations after
/// it was taken are invisible through it.
pub type Snapshot<K, V> = BTreeMap<K, Item<V>>;

/// The active reduction step of a cache. Last registration wins.
pub type Reducer<K, V> = Arc<dyn Fn(&Snapshot<K, V>) -> Value + Send + Sync>;

/// Fallback projection installed when a cache is first observed without a
/// registered reducer: every item's data, appended into a plain sequence in
/// key order.
pub(crate) fn default_reducer<K, V: Serialize>(snapshot: &Snapshot<K, V>) -> Value {
    Value::Array(
        snapshot
            .values()
            .map(|item| serde_json::to_value(&item.data).unwrap_or(Value::Null))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    fn item<V>(data: V) -> Item<V> {
        Item {
            created_at: OffsetDateTime::now_utc(),
            data,
        }
    }

    #[test]
    fn default_reducer_appends_data_in_key_order() {
        let mut snapshot: Snapshot<String, u32> = Snapshot::new();
        snapshot.insert("b".into(), item(2));
        snapshot.insert("a".into(), item(1));
        snapshot.insert("c".into(), item(3));

        assert_eq!(default_reducer(&snapshot), json!([1, 2, 3]));
    }

    #[test]
    fn default_reducer_of_empty_snapshot_is_empty_sequence() {
        let snapshot: Snapshot<String, u32> = Snapshot::new();
        assert_eq!(default_reducer(&snapshot), json!([]));
    }
}
