//! Query cache.
//!
//! Turns a content fetch into a cached, strategy-aware call:
//!
//! - **Keys**: SHA-256 of the query text and its serialized parameters
//! - **Strategies**: named `Cache-Control` policies (`Long`, `Short`, `None`, custom)
//! - **Store**: host-supplied, HTTP-cache-shaped; the store owns freshness
//! - **Orchestrator**: picks the effective strategy (preview always bypasses),
//!   reads through the store and writes back in the background
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_strategy = "short"
//! store_capacity = 1024
//! ```

mod config;
mod deferred;
mod directives;
mod keys;
mod lock;
mod orchestrator;
mod store;
mod strategy;

pub use config::CacheConfig;
pub use deferred::{BackgroundTasks, WaitUntil};
pub use directives::{Freshness, parse_cache_control};
pub use keys::{CacheKey, hash_query};
pub use orchestrator::{CacheRequest, QueryCache};
pub use store::{CacheHit, CacheStore, EntryStatus, InMemoryCacheStore, StoreError};
pub use strategy::{CacheMode, CacheStrategy, UnknownStrategy};

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
