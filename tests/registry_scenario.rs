//! End-to-end registry behavior against the process-wide instance.

use riverbero::cache::{self, CacheConfig, CacheError, StoreRegistry};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn typed_cache_lifecycle_through_the_global_registry() {
    let store = cache::new_store("test").expect("store registered");
    let created = store
        .new_cache::<String, i64>("c", CacheConfig::default())
        .expect("cache registered");

    created.save("k".to_string(), 123).expect("first save");
    let err = created
        .save("k".to_string(), 456)
        .expect_err("duplicate key");
    assert!(matches!(err, CacheError::DuplicateKey { .. }));

    assert_eq!(created.get_all().len(), 1);
    assert_eq!(created.get(&"k".to_string()).expect("item").data, 123);

    // Same handle through the lookup path, type re-validated.
    let looked_up = cache::use_cache::<String, i64>("test", "c").expect("typed lookup");
    assert_eq!(looked_up.get_all().len(), 1);

    let err = cache::use_cache::<String, i64>("missing", "c").expect_err("unknown store");
    assert!(matches!(err, CacheError::StoreNotFound { .. }));

    let err = cache::use_cache::<String, String>("test", "c").expect_err("wrong element type");
    assert!(matches!(err, CacheError::TypeMismatch { .. }));
}

#[tokio::test]
#[serial]
async fn registrations_are_first_come_first_served() {
    cache::new_store("contested").expect("first registration");
    let err = cache::new_store("contested").expect_err("second registration");
    assert!(matches!(err, CacheError::DuplicateStoreId { .. }));

    let store = cache::use_store("contested").expect("still resolvable");
    store
        .new_cache::<u64, String>("c", CacheConfig::default())
        .expect("cache");
    let err = store
        .new_cache::<u64, String>("c", CacheConfig::default())
        .expect_err("duplicate cache id");
    assert!(matches!(err, CacheError::DuplicateCacheId { .. }));
}

#[tokio::test]
#[serial]
async fn isolated_registries_do_not_observe_the_global_namespace() {
    cache::new_store("only-global").expect("global store");

    let isolated = StoreRegistry::new();
    assert!(isolated.use_store("only-global").is_none());
    isolated.new_store("only-global").expect("same id, different registry");
}
