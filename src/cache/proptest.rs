//! Property-Based Tests for the Lookup Cache
//!
//! # Test Properties
//!
//! 1. **Key Identity**: keys are equal exactly when shape and values are
//! 2. **Capacity Bound**: total size never exceeds capacity
//! 3. **LRU Order**: the store agrees with a naive recency model
//! 4. **Signal Coherence**: an entry bound to a fired signal is never served

#![cfg(test)]

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use proptest::prelude::*;

use super::key::{LookupKey, LookupShape};
use super::signal::{SignalRegistry, SignalSource};
use super::store::{KeyedCacheStore, StoreConfig};

// =============================================================================
// Property Strategies
// =============================================================================

fn shape_strategy() -> impl Strategy<Value = LookupShape> {
    prop::sample::select(LookupShape::ALL.to_vec())
}

/// Short identifiers so collisions between generated keys are common.
fn value_strategy() -> impl Strategy<Value = String> {
    "[a-c]{0,3}"
}

#[derive(Debug, Clone)]
enum Op {
    Insert { key: u8, size: u64 },
    Get { key: u8 },
    Remove { key: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, 1u64..6).prop_map(|(key, size)| Op::Insert { key, size }),
        (0u8..16).prop_map(|key| Op::Get { key }),
        (0u8..16).prop_map(|key| Op::Remove { key }),
    ]
}

fn hash_of(key: &LookupKey) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn key(n: u8) -> LookupKey {
    LookupKey::id(format!("tok-{}", n))
}

/// Naive LRU: front of the vector is least recently used.
struct Model {
    capacity: u64,
    order: Vec<(u8, u64)>,
}

impl Model {
    fn size(&self) -> u64 {
        self.order.iter().map(|&(_, size)| size).sum()
    }

    fn remove(&mut self, key: u8) -> bool {
        let before = self.order.len();
        self.order.retain(|&(k, _)| k != key);
        self.order.len() != before
    }

    fn insert(&mut self, key: u8, size: u64) {
        self.remove(key);
        if size > self.capacity {
            return;
        }
        while self.size() + size > self.capacity {
            self.order.remove(0);
        }
        self.order.push((key, size));
    }

    fn get(&mut self, key: u8) -> bool {
        match self.order.iter().position(|&(k, _)| k == key) {
            Some(pos) => {
                let entry = self.order.remove(pos);
                self.order.push(entry);
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Key Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Equality follows shape and values; equal keys hash equally
    #[test]
    fn prop_key_identity(
        a_shape in shape_strategy(),
        a_values in prop::collection::vec(value_strategy(), 1..3),
        b_shape in shape_strategy(),
        b_values in prop::collection::vec(value_strategy(), 1..3),
    ) {
        let a = LookupKey::new(a_shape, a_values.clone());
        let b = LookupKey::new(b_shape, b_values.clone());

        let expected = a_shape == b_shape && a_values == b_values;
        prop_assert_eq!(a == b, expected);
        if expected {
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }
}

// =============================================================================
// Store Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Size stays within capacity and matches the recency model
    #[test]
    fn prop_store_matches_lru_model(
        capacity in 1u64..12,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let store: KeyedCacheStore<u8> = KeyedCacheStore::with_config(StoreConfig { capacity });
        let mut model = Model { capacity, order: Vec::new() };

        for op in ops {
            match op {
                Op::Insert { key: k, size } => {
                    store.insert(key(k), k, size, Vec::new());
                    model.insert(k, size);
                }
                Op::Get { key: k } => {
                    let got = store.try_get(&key(k));
                    prop_assert_eq!(got.is_some(), model.get(k));
                    if let Some(value) = got {
                        prop_assert_eq!(value, k);
                    }
                }
                Op::Remove { key: k } => {
                    prop_assert_eq!(store.remove(&key(k)), model.remove(k));
                }
            }

            prop_assert!(store.size() <= capacity);
            prop_assert_eq!(store.size(), model.size());
            prop_assert_eq!(store.len(), model.order.len());
        }
    }

    /// Entries bound to a fired signal are never served
    #[test]
    fn prop_fired_entries_never_served(
        bindings in prop::collection::vec(prop::collection::vec(0u8..6, 1..4), 1..20),
        fired in prop::collection::vec(0u8..6, 0..6),
    ) {
        let registry = SignalRegistry::new();
        let store: KeyedCacheStore<usize> =
            KeyedCacheStore::with_config(StoreConfig { capacity: 1000 });
        let mut bound: HashMap<usize, Vec<u8>> = HashMap::new();

        for (n, ids) in bindings.iter().enumerate() {
            let signals = ids
                .iter()
                .map(|id| registry.get_or_create(&format!("e-{}", id)))
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            store.insert(LookupKey::subject(format!("s-{}", n)), n, 1, signals);
            bound.insert(n, ids.clone());
        }

        for id in &fired {
            registry.fire(&format!("e-{}", id)).unwrap();
        }

        for (n, ids) in &bound {
            let served = store.try_get(&LookupKey::subject(format!("s-{}", n))).is_some();
            let invalidated = ids.iter().any(|id| fired.contains(id));
            prop_assert_eq!(served, !invalidated);
        }
    }
}
