//! Cache tuning knobs.
//!
//! Controls feed capacity and history retention via `riverbero.toml`.

use serde::Deserialize;

const DEFAULT_FEED_CAPACITY: usize = 1024;
const DEFAULT_HISTORY_LIMIT: usize = 0;

/// Per-cache tuning from `riverbero.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Capacity of the raw and reduction feeds.
    pub feed_capacity: usize,
    /// Maximum retained history entries per history map; 0 keeps everything.
    ///
    /// The engine never prunes by default: history doubles as an audit
    /// trail for late-joining observers. Deployments that mutate hot caches
    /// for weeks set a cap instead.
    pub history_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed_capacity: DEFAULT_FEED_CAPACITY,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            feed_capacity: settings.feed_capacity,
            history_limit: settings.history_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.feed_capacity, 1024);
        assert_eq!(config.history_limit, 0);
    }
}
