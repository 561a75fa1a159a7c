//! Lookup Cache Module
//!
//! Read-through caching for entities addressable by several identifiers,
//! with invalidation driven by per-entity signals.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           LookupCache                               │
//! │   find_by_* ──► KeyedCacheStore ──miss──► EntityStore (backing)     │
//! │                      │                                              │
//! │            entries bound to signals                                 │
//! │                      │                                              │
//! │   add / remove ──► SignalRegistry (one signal per entity id)        │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - **Keys** (`key.rs`): lookup shape plus identifier values, hashed once
//! - **Signals** (`signal.rs`): per-entity cancellation tokens; firing one
//!   expires every entry containing that entity
//! - **Store** (`store.rs`): size-bounded LRU map with lazy invalidation
//! - **Lookup** (`lookup.rs`): the read-through façade and population policy
//! - **Metrics** (`metrics.rs`): per-shape hit/miss counters
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokencache::adapters::InMemoryTokenStore;
//! use tokencache::cache::LookupCache;
//!
//! let store = Arc::new(InMemoryTokenStore::new());
//! let cache = LookupCache::new(Arc::clone(&store));
//!
//! let token = cache.find_by_id("t-1").await?;
//! if let Some(token) = token {
//!     cache.remove(&token)?;
//! }
//! ```

mod entry;
mod key;
mod lookup;
mod metrics;
mod signal;
mod store;

#[cfg(test)]
mod proptest;

pub use entry::CachedValue;
pub use key::{LookupKey, LookupShape};
pub use lookup::{CacheConfig, LookupCache};
pub use metrics::{CacheMetrics, CacheStats, MetricsSnapshot, ShapeSnapshot};
pub use signal::{SignalHandle, SignalRegistry, SignalSource};
pub use store::{KeyedCacheStore, StoreConfig, StoreStats};

/// Default store capacity, in size units
pub const DEFAULT_CAPACITY: u64 = 250;
