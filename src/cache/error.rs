//! Error taxonomy for cache, store, and registry operations.
//!
//! Every public operation returns a recoverable [`CacheError`]; nothing in
//! this module terminates the process. Conditions the engine handles locally
//! (an eviction firing after an explicit delete, a full feed) are not errors
//! at all and never surface here.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// `save` refused to overwrite an existing item.
    #[error("duplicate cache key: {key}")]
    DuplicateKey { key: String },
    /// `delete` (or a typed lookup) found nothing under the key.
    #[error("no item with key: {key}")]
    KeyNotFound { key: String },
    /// `save_with_timeout` requires a strictly positive timeout.
    #[error("eviction timeout must be greater than zero, got {timeout:?}")]
    InvalidTimeout { timeout: Duration },
    /// A store with this id is already registered.
    #[error("store `{id}` already exists")]
    DuplicateStoreId { id: String },
    /// No store registered under this id.
    #[error("no store with id `{id}`")]
    StoreNotFound { id: String },
    /// The store already holds a cache under this id.
    #[error("cache `{id}` already exists in store `{store}`")]
    DuplicateCacheId { store: String, id: String },
    /// The store holds no cache under this id.
    #[error("no cache with id `{id}` in store `{store}`")]
    CacheNotFound { store: String, id: String },
    /// The cache exists but was created with a different key/value pairing.
    #[error("cache `{id}` in store `{store}` holds `{actual}`, not the requested type")]
    TypeMismatch {
        store: String,
        id: String,
        actual: &'static str,
    },
}

impl CacheError {
    pub(crate) fn duplicate_key(key: impl std::fmt::Debug) -> Self {
        Self::DuplicateKey {
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn key_not_found(key: impl std::fmt::Debug) -> Self {
        Self::KeyNotFound {
            key: format!("{key:?}"),
        }
    }
}
