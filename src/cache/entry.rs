//! Cached values
//!
//! What a cache entry holds: one entity, the "not found" marker, or an
//! ordered, immutable list of entities.

use std::sync::Arc;

/// Value stored under a lookup key
#[derive(Debug, Clone)]
pub enum CachedValue<E> {
    /// Single-entity lookup result; `None` is the "not found" marker
    Single(Option<E>),
    /// One-to-many lookup result
    List(Arc<[E]>),
}

impl<E> CachedValue<E> {
    /// Cache an entity that was found
    pub fn found(entity: E) -> Self {
        CachedValue::Single(Some(entity))
    }

    /// Cache the "not found" marker
    pub fn not_found() -> Self {
        CachedValue::Single(None)
    }

    /// Cache a list result
    pub fn list(entities: impl Into<Arc<[E]>>) -> Self {
        CachedValue::List(entities.into())
    }

    /// Whether this is the "not found" marker
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CachedValue::Single(None))
    }

    /// Capacity units charged for this value.
    ///
    /// Single values (found or not) cost 1; lists cost their length, with a
    /// floor of 1 so empty lists are still bounded by capacity.
    pub fn size(&self) -> u64 {
        match self {
            CachedValue::Single(_) => 1,
            CachedValue::List(entities) => (entities.len() as u64).max(1),
        }
    }

    /// Unwrap a single-entity value; lists yield `None`
    pub fn into_single(self) -> Option<E> {
        match self {
            CachedValue::Single(entity) => entity,
            CachedValue::List(_) => None,
        }
    }

    /// Unwrap a list value; single values yield `None`
    pub fn into_list(self) -> Option<Arc<[E]>> {
        match self {
            CachedValue::List(entities) => Some(entities),
            CachedValue::Single(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(CachedValue::found("a").size(), 1);
        assert_eq!(CachedValue::<&str>::not_found().size(), 1);
        assert_eq!(CachedValue::list(vec!["a", "b", "c"]).size(), 3);
        assert_eq!(CachedValue::<&str>::list(Vec::new()).size(), 1);
    }

    #[test]
    fn test_not_found_marker() {
        assert!(CachedValue::<i32>::not_found().is_not_found());
        assert!(!CachedValue::found(7).is_not_found());
        assert!(!CachedValue::<i32>::list(Vec::new()).is_not_found());
    }

    #[test]
    fn test_unwrap_helpers() {
        assert_eq!(CachedValue::found(1).into_single(), Some(1));
        assert_eq!(CachedValue::list(vec![1]).into_single(), None);
        assert_eq!(CachedValue::list(vec![1, 2]).into_list().unwrap().len(), 2);
        assert!(CachedValue::found(1).into_list().is_none());
    }
}
