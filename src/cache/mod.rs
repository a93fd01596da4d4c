//! Riverbero cache engine.
//!
//! Typed, process-local caches under continuous observation:
//!
//! - **Store** ([`store`]): keyed live set of timestamped items, with
//!   optional per-item eviction timers
//! - **Monitor** ([`monitor`]): per-cache background task that reduces each
//!   observed change into a derived projection and publishes it
//! - **Registry** ([`registry`]): process-wide directory of stores, each a
//!   heterogeneous namespace of typed caches
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `riverbero.toml`:
//!
//! ```toml
//! [cache]
//! feed_capacity = 1024
//! history_limit = 0   # 0 keeps the full history
//! ```

mod commands;
mod config;
mod error;
mod feed;
pub(crate) mod lock;
mod monitor;
mod reducer;
mod registry;
mod store;

pub use commands::{CommandError, Commands};
pub use config::CacheConfig;
pub use error::CacheError;
pub use feed::Feed;
pub use reducer::{Item, Reducer, Snapshot};
pub use registry::{Store, StoreRegistry, new_store, use_cache, use_store};
pub use store::{Cache, CacheKey, CacheValue};
