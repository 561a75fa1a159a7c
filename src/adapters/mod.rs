//! Infrastructure Adapters
//!
//! Implementations of the domain [`EntityStore`](crate::domain::EntityStore)
//! port.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokencache::adapters::InMemoryTokenStore;
//! use tokencache::cache::LookupCache;
//!
//! let store = Arc::new(InMemoryTokenStore::new());
//! let cache = LookupCache::new(store.clone());
//! let token = cache.find_by_id("tok-1").await?;
//! ```

mod memory;

pub use memory::{InMemoryTokenStore, StoreQueryStats};
