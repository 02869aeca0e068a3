//! Query cache configuration.

use std::num::NonZeroUsize;

use super::CacheStrategy;

const DEFAULT_STORE_CAPACITY: usize = 1024;

/// Runtime configuration for the query cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every query is fetched uncached, as in preview mode.
    pub enabled: bool,
    /// Strategy applied when a call site does not pick one.
    pub default_strategy: CacheStrategy,
    /// Maximum entries kept by the in-memory store.
    pub store_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_strategy: CacheStrategy::Short,
            store_capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_strategy: settings.default_strategy,
            store_capacity: settings.store_capacity.get(),
        }
    }
}

impl CacheConfig {
    /// Store capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn store_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.store_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    /// Strategy for a call site, falling back to the configured default.
    pub fn strategy_or_default(&self, requested: Option<CacheStrategy>) -> CacheStrategy {
        if !self.enabled {
            return CacheStrategy::None;
        }
        requested.unwrap_or(self.default_strategy)
    }
}
