//! Store registry: named, heterogeneous namespaces of typed caches.
//!
//! A [`Store`] maps cache ids to caches of differing element types, so the
//! static types are erased at the boundary and recovered on lookup with a
//! checked downcast. Every retrieval re-validates the concrete type; a
//! mismatched lookup returns [`CacheError::TypeMismatch`] instead of a
//! mistyped handle.
//!
//! Registry and store locks guard only the id maps, never cache contents,
//! and are acquired strictly top-down (registry, then store, then cache).

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use tracing::info;

use super::commands::Commands;
use super::config::CacheConfig;
use super::error::CacheError;
use super::lock;
use super::store::{Cache, CacheKey, CacheValue};

static GLOBAL: Lazy<StoreRegistry> = Lazy::new(StoreRegistry::new);

struct CacheSlot {
    handle: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// One namespace of caches. A cache id maps to exactly one concrete
/// key/value pairing for the store's lifetime.
pub struct Store {
    id: String,
    caches: RwLock<HashMap<String, CacheSlot>>,
    commands: Commands,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Store {
    fn new(id: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            caches: RwLock::new(HashMap::new()),
            commands: Commands::new(),
        })
    }

    /// The id this store is registered under.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Named actions attached to this store.
    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    /// Create a cache under `cache_id` and start its monitor.
    pub fn new_cache<K: CacheKey, V: CacheValue>(
        &self,
        cache_id: impl Into<String>,
        config: CacheConfig,
    ) -> Result<Arc<Cache<K, V>>, CacheError> {
        let cache_id = cache_id.into();
        let mut caches = lock::write(&self.caches, "new_cache");
        if caches.contains_key(&cache_id) {
            return Err(CacheError::DuplicateCacheId {
                store: self.id.clone(),
                id: cache_id,
            });
        }

        let cache = Cache::<K, V>::new(config);
        let type_name = std::any::type_name::<Cache<K, V>>();
        info!(
            store = %self.id,
            cache = %cache_id,
            cache_type = type_name,
            "cache created"
        );
        caches.insert(cache_id, CacheSlot {
            handle: Box::new(Arc::clone(&cache)),
            type_name,
        });
        Ok(cache)
    }

    /// Retrieve a cache, re-validating its concrete type.
    pub fn use_cache<K: CacheKey, V: CacheValue>(
        &self,
        cache_id: &str,
    ) -> Result<Arc<Cache<K, V>>, CacheError> {
        let caches = lock::read(&self.caches, "use_cache");
        let slot = caches.get(cache_id).ok_or_else(|| CacheError::CacheNotFound {
            store: self.id.clone(),
            id: cache_id.to_string(),
        })?;
        slot.handle
            .downcast_ref::<Arc<Cache<K, V>>>()
            .map(Arc::clone)
            .ok_or_else(|| CacheError::TypeMismatch {
                store: self.id.clone(),
                id: cache_id.to_string(),
                actual: slot.type_name,
            })
    }

    /// Ids of all caches currently registered in this store.
    pub fn cache_ids(&self) -> Vec<String> {
        lock::read(&self.caches, "cache_ids").keys().cloned().collect()
    }
}

/// Directory of stores. The process-wide instance lives for the process
/// lifetime; isolated instances are cheap to construct where needed.
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Arc<Store>>>,
}

impl StoreRegistry {
    /// An empty, isolated registry.
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry, created lazily on first use and never
    /// torn down.
    pub fn global() -> &'static StoreRegistry {
        &GLOBAL
    }

    /// Register a new store under `id`.
    pub fn new_store(&self, id: impl Into<String>) -> Result<Arc<Store>, CacheError> {
        let id = id.into();
        let mut stores = lock::write(&self.stores, "new_store");
        if stores.contains_key(&id) {
            return Err(CacheError::DuplicateStoreId { id });
        }
        let store = Store::new(id.clone());
        info!(store = %id, "store created");
        stores.insert(id, Arc::clone(&store));
        Ok(store)
    }

    /// Pure lookup; no allocation on the miss path.
    pub fn use_store(&self, id: &str) -> Option<Arc<Store>> {
        lock::read(&self.stores, "use_store").get(id).cloned()
    }

    /// Two-level lookup with the mandatory type re-validation.
    pub fn use_cache<K: CacheKey, V: CacheValue>(
        &self,
        store_id: &str,
        cache_id: &str,
    ) -> Result<Arc<Cache<K, V>>, CacheError> {
        let store = self.use_store(store_id).ok_or_else(|| CacheError::StoreNotFound {
            id: store_id.to_string(),
        })?;
        store.use_cache::<K, V>(cache_id)
    }

    /// Ids of all registered stores.
    pub fn store_ids(&self) -> Vec<String> {
        lock::read(&self.stores, "store_ids").keys().cloned().collect()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register a store in the process-wide registry.
pub fn new_store(id: impl Into<String>) -> Result<Arc<Store>, CacheError> {
    StoreRegistry::global().new_store(id)
}

/// Look up a store in the process-wide registry.
pub fn use_store(id: &str) -> Option<Arc<Store>> {
    StoreRegistry::global().use_store(id)
}

/// Look up a typed cache in the process-wide registry.
pub fn use_cache<K: CacheKey, V: CacheValue>(
    store_id: &str,
    cache_id: &str,
) -> Result<Arc<Cache<K, V>>, CacheError> {
    StoreRegistry::global().use_cache::<K, V>(store_id, cache_id)
}
