//! Cache Metrics Collection
//!
//! Lookup-level counters for monitoring cache effectiveness.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::key::LookupShape;
use super::store::StoreStats;

const SHAPES: usize = LookupShape::ALL.len();

/// Lookup metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // Per-shape lookups
    hits: [AtomicU64; SHAPES],
    misses: [AtomicU64; SHAPES],

    // Store traffic
    store_queries: AtomicU64,
    filtered_queries: AtomicU64,

    // Population
    negative_entries: AtomicU64,
    populations_skipped: AtomicU64,

    // Invalidation
    signals_fired: AtomicU64,
    list_invalidations: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, shape: LookupShape) {
        self.hits[shape.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self, shape: LookupShape) {
        self.misses[shape.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_query(&self) {
        self.store_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered_query(&self) {
        self.filtered_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_negative_entry(&self) {
        self.negative_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_population_skipped(&self) {
        self.populations_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_signal_fired(&self) {
        self.signals_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_list_invalidations(&self, count: usize) {
        self.list_invalidations
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn hits(&self, shape: LookupShape) -> u64 {
        self.hits[shape.index()].load(Ordering::Relaxed)
    }

    pub fn misses(&self, shape: LookupShape) -> u64 {
        self.misses[shape.index()].load(Ordering::Relaxed)
    }

    pub fn store_queries(&self) -> u64 {
        self.store_queries.load(Ordering::Relaxed)
    }

    /// Get overall lookup hit ratio across all shapes
    pub fn overall_hit_ratio(&self) -> f64 {
        let hits: u64 = LookupShape::ALL.iter().map(|&s| self.hits(s)).sum();
        let misses: u64 = LookupShape::ALL.iter().map(|&s| self.misses(s)).sum();
        let total = hits + misses;

        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups: LookupShape::ALL
                .iter()
                .map(|&shape| ShapeSnapshot {
                    shape: shape.as_str(),
                    hits: self.hits(shape),
                    misses: self.misses(shape),
                })
                .collect(),
            store_queries: self.store_queries(),
            filtered_queries: self.filtered_queries.load(Ordering::Relaxed),
            negative_entries: self.negative_entries.load(Ordering::Relaxed),
            populations_skipped: self.populations_skipped.load(Ordering::Relaxed),
            signals_fired: self.signals_fired.load(Ordering::Relaxed),
            list_invalidations: self.list_invalidations.load(Ordering::Relaxed),
            overall_hit_ratio: self.overall_hit_ratio(),
        }
    }
}

/// Hits and misses for one lookup shape
#[derive(Debug, Clone, Serialize)]
pub struct ShapeSnapshot {
    pub shape: &'static str,
    pub hits: u64,
    pub misses: u64,
}

/// Snapshot of lookup metrics
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub lookups: Vec<ShapeSnapshot>,
    pub store_queries: u64,
    pub filtered_queries: u64,
    pub negative_entries: u64,
    pub populations_skipped: u64,
    pub signals_fired: u64,
    pub list_invalidations: u64,
    pub overall_hit_ratio: f64,
}

/// Combined lookup and store statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub lookups: MetricsSnapshot,
    pub store: StoreStats,
    pub live_signals: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = CacheMetrics::new();
        for shape in LookupShape::ALL {
            assert_eq!(metrics.hits(shape), 0);
            assert_eq!(metrics.misses(shape), 0);
        }
        assert_eq!(metrics.overall_hit_ratio(), 0.0);
    }

    #[test]
    fn test_per_shape_tracking() {
        let metrics = CacheMetrics::new();

        metrics.record_hit(LookupShape::Id);
        metrics.record_hit(LookupShape::Id);
        metrics.record_miss(LookupShape::Subject);

        assert_eq!(metrics.hits(LookupShape::Id), 2);
        assert_eq!(metrics.misses(LookupShape::Id), 0);
        assert_eq!(metrics.misses(LookupShape::Subject), 1);
        assert!((metrics.overall_hit_ratio() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_snapshot() {
        let metrics = CacheMetrics::new();

        metrics.record_hit(LookupShape::ApplicationId);
        metrics.record_store_query();
        metrics.record_negative_entry();
        metrics.record_signal_fired();
        metrics.record_list_invalidations(3);
        metrics.record_population_skipped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lookups.len(), LookupShape::ALL.len());
        let app = snapshot
            .lookups
            .iter()
            .find(|s| s.shape == "application_id")
            .unwrap();
        assert_eq!(app.hits, 1);
        assert_eq!(snapshot.store_queries, 1);
        assert_eq!(snapshot.negative_entries, 1);
        assert_eq!(snapshot.signals_fired, 1);
        assert_eq!(snapshot.list_invalidations, 3);
        assert_eq!(snapshot.populations_skipped, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = CacheMetrics::new();
        metrics.record_hit(LookupShape::Subject);

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["lookups"][2]["shape"], "subject");
        assert_eq!(json["lookups"][2]["hits"], 1);
    }
}
