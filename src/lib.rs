//! TokenCache - Read-through lookup cache with signal-driven invalidation
//!
//! Caches lookups of entities that are addressable by several identifiers
//! (primary id, reference id) and groupable by several relations (subject,
//! application, authorization). Removing one entity invalidates every cached
//! lookup that contains it, across all shapes, without enumerating them.
//!
//! # Architecture
//!
//! ```text
//! caller ──► LookupCache ──hit──► KeyedCacheStore (LRU, size-bounded)
//!                │
//!                └──miss──► EntityStore (backing) ──► populate + bind signals
//!
//! add / remove ──► SignalRegistry ──fire──► bound entries expire
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Backing store implementations
//! - [`cache`] - Keys, signals, store and the lookup façade
//! - [`domain`] - Entity model and the backing store port
//! - [`error`] - Error types

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use adapters::InMemoryTokenStore;
pub use cache::{CacheConfig, CacheStats, LookupCache, LookupKey, LookupShape, SignalRegistry};
pub use domain::{EntityStore, Token, TokenFilter, TokenStatus, TokenType};
pub use error::{Error, Result};
