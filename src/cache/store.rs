//! Keyed Cache Store - size-bounded LRU with signal-bound entries
//!
//! # Design
//!
//! - One `parking_lot::Mutex` guards the map and the recency index; every
//!   operation is a short critical section that never awaits
//! - Recency is a `BTreeMap` keyed by a monotonically increasing access tick,
//!   so the least recently used entry is always the first key
//! - Entries observe their signals lazily: a fired signal makes the entry
//!   absent on the next lookup, and [`KeyedCacheStore::sweep`] reclaims the
//!   rest in bulk

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::key::LookupKey;
use super::signal::SignalHandle;
use super::DEFAULT_CAPACITY;

/// Keyed store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum total size of all entries, in entry size units
    pub capacity: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Stored entry with its bookkeeping
struct Slot<V> {
    value: V,
    size: u64,
    signals: Box<[SignalHandle]>,
    /// Recency tick, also the key of this entry in the recency index
    tick: u64,
}

impl<V> Slot<V> {
    #[inline]
    fn is_invalidated(&self) -> bool {
        self.signals.iter().any(SignalHandle::is_fired)
    }
}

struct Inner<V> {
    entries: HashMap<LookupKey, Slot<V>>,
    recency: BTreeMap<u64, LookupKey>,
    next_tick: u64,
    size: u64,
}

impl<V> Inner<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            size: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Mark an entry as most recently used
    fn touch(&mut self, key: &LookupKey) {
        let tick = self.tick();
        if let Some(slot) = self.entries.get_mut(key) {
            let old = std::mem::replace(&mut slot.tick, tick);
            // Reuse the owned key from the index instead of cloning
            let owned = self.recency.remove(&old).unwrap_or_else(|| key.clone());
            self.recency.insert(tick, owned);
        }
    }

    fn remove(&mut self, key: &LookupKey) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.recency.remove(&slot.tick);
        self.size -= slot.size;
        Some(slot)
    }

    fn pop_lru(&mut self) -> Option<(LookupKey, Slot<V>)> {
        let (_, key) = self.recency.pop_first()?;
        let slot = self.entries.remove(&key)?;
        self.size -= slot.size;
        Some((key, slot))
    }
}

/// Size-bounded, internally synchronized cache store
pub struct KeyedCacheStore<V> {
    inner: Mutex<Inner<V>>,
    /// Configuration
    config: StoreConfig,
    /// Hit count
    hits: AtomicU64,
    /// Miss count
    misses: AtomicU64,
    /// Successful insertions
    insertions: AtomicU64,
    /// Insertions refused (oversized or already invalidated)
    rejections: AtomicU64,
    /// Capacity evictions
    evictions: AtomicU64,
    /// Entries dropped because one of their signals fired
    invalidations: AtomicU64,
}

impl<V: Clone> KeyedCacheStore<V> {
    /// Create a store with default configuration
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store with custom configuration
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Get a value, treating entries with a fired signal as absent
    pub fn try_get(&self, key: &LookupKey) -> Option<V> {
        let mut inner = self.inner.lock();

        let lookup = inner
            .entries
            .get(key)
            .map(|slot| (!slot.is_invalidated()).then(|| slot.value.clone()));

        match lookup {
            Some(Some(value)) => {
                inner.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Some(None) => {
                inner.remove(key);
                self.invalidations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(%key, "Dropped invalidated entry");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a value bound to `signals`, replacing any entry under `key`.
    ///
    /// Least recently used entries are evicted until the value fits. Returns
    /// `false` when the value was refused: its size alone exceeds capacity,
    /// or one of its signals has already fired. A refused insert still
    /// removes the previous entry under `key`.
    pub fn insert(&self, key: LookupKey, value: V, size: u64, signals: Vec<SignalHandle>) -> bool {
        let mut inner = self.inner.lock();
        inner.remove(&key);

        if size > self.config.capacity || signals.iter().any(SignalHandle::is_fired) {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            trace!(%key, size, "Refused cache entry");
            return false;
        }

        // `key` was removed above, so eviction can never pick it
        while inner.size + size > self.config.capacity {
            match inner.pop_lru() {
                Some((evicted, _)) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    trace!(key = %evicted, "Evicted least recently used entry");
                }
                None => break,
            }
        }

        let tick = inner.tick();
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(
            key,
            Slot {
                value,
                size,
                signals: signals.into_boxed_slice(),
                tick,
            },
        );
        inner.size += size;
        self.insertions.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Remove an entry, returning whether it was present
    pub fn remove(&self, key: &LookupKey) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Remove several entries under one lock acquisition
    pub fn remove_all<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a LookupKey>,
    {
        let mut inner = self.inner.lock();
        keys.into_iter()
            .filter(|key| inner.remove(key).is_some())
            .count()
    }

    /// Check if a live entry exists, without affecting recency
    pub fn contains_key(&self, key: &LookupKey) -> bool {
        self.inner
            .lock()
            .entries
            .get(key)
            .is_some_and(|slot| !slot.is_invalidated())
    }

    /// Drop every entry bound to a fired signal. Returns the number dropped.
    pub fn sweep(&self) -> usize {
        let mut inner = self.inner.lock();
        let dead: Vec<LookupKey> = inner
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_invalidated())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &dead {
            inner.remove(key);
        }
        self.invalidations
            .fetch_add(dead.len() as u64, Ordering::Relaxed);
        dead.len()
    }

    /// Clear the store
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
        inner.size = 0;
    }

    /// Get current total size
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Get capacity
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Get number of entries, including not yet reclaimed invalidated ones
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get capacity eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Get hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }

    /// Get utilization (0.0 - 1.0)
    pub fn utilization(&self) -> f64 {
        self.size() as f64 / self.capacity() as f64
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let (size, entries) = {
            let inner = self.inner.lock();
            (inner.size, inner.entries.len())
        };
        StoreStats {
            size,
            capacity: self.capacity(),
            entries,
            hits: self.hits(),
            misses: self.misses(),
            hit_ratio: self.hit_ratio(),
            insertions: self.insertions.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            evictions: self.evictions(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            utilization: size as f64 / self.capacity() as f64,
        }
    }
}

impl<V: Clone> Default for KeyedCacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Current total size
    pub size: u64,
    /// Capacity
    pub capacity: u64,
    /// Number of entries
    pub entries: usize,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
    /// Successful insertions
    pub insertions: u64,
    /// Refused insertions
    pub rejections: u64,
    /// Capacity evictions
    pub evictions: u64,
    /// Entries dropped after a signal fired
    pub invalidations: u64,
    /// Utilization (0.0 - 1.0)
    pub utilization: f64,
}

// =============================================================================
// Tests
// =============================================================================
