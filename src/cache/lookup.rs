//! Lookup Cache - read-through façade over the keyed store
//!
//! Orchestrates read-through behavior for every lookup shape, decides which
//! keys to populate or invalidate when an entity is observed, and is the only
//! component that talks to the [`EntityStore`].
//!
//! # Population policy
//!
//! - Single lookups (id, reference id) cache the entity bound to its signal,
//!   or a "not found" marker bound to nothing
//! - One-to-many lookups (subject, application, authorization) cache the
//!   whole list bound to the signal of every entity in it
//! - Every observed entity goes through [`LookupCache::add`], which drops
//!   the one-to-many entries it could belong to and rebuilds its own
//!   single-entity entries
//!
//! # Concurrency
//!
//! Suspension happens only while awaiting the store. Signal binding and
//! insertion happen together after the await, so dropping a lookup future
//! leaves its key either untouched or fully populated.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{future, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::entry::CachedValue;
use super::key::{LookupKey, LookupShape};
use super::metrics::{CacheMetrics, CacheStats};
use super::signal::{SignalHandle, SignalRegistry, SignalSource};
use super::store::{KeyedCacheStore, StoreConfig};
use crate::domain::ports::{EntityStore, EntityStream, TokenFilter};
use crate::error::{Error, Result};

/// Lookup cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Keyed store configuration
    pub store: StoreConfig,
    /// Cache "not found" markers for single-entity lookups
    pub negative_caching: bool,
    /// Period of the background sweep, if any
    pub sweep_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            negative_caching: true,
            sweep_interval: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store capacity.
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.store.capacity = capacity;
        self
    }

    /// Enable or disable negative caching.
    pub fn with_negative_caching(mut self, enabled: bool) -> Self {
        self.negative_caching = enabled;
        self
    }

    /// Set the background sweep period.
    pub fn with_sweep_interval(mut self, period: Duration) -> Self {
        self.sweep_interval = Some(period);
        self
    }

    /// Check the configuration for values the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.capacity == 0 {
            return Err(Error::Config("capacity must be greater than zero".into()));
        }
        if self.sweep_interval == Some(Duration::ZERO) {
            return Err(Error::Config("sweep interval must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Read-through lookup cache
pub struct LookupCache<S: EntityStore> {
    /// Backing store, queried on misses
    store: Arc<S>,
    /// Cached lookups
    entries: KeyedCacheStore<CachedValue<S::Entity>>,
    /// Per-entity invalidation signals
    signals: Arc<dyn SignalSource>,
    /// Configuration
    config: CacheConfig,
    /// Metrics collector
    metrics: CacheMetrics,
}

/// Treat empty strings returned by accessors as absent.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::empty_identifier(what));
    }
    Ok(())
}

impl<S: EntityStore> LookupCache<S> {
    /// Create a new lookup cache with default configuration
    pub fn new(store: Arc<S>) -> Self {
        Self::build(CacheConfig::default(), store, Arc::new(SignalRegistry::new()))
    }

    /// Create a new lookup cache with custom configuration
    pub fn with_config(config: CacheConfig, store: Arc<S>) -> Result<Self> {
        Self::with_signal_source(config, store, Arc::new(SignalRegistry::new()))
    }

    /// Create a lookup cache drawing signals from an external source
    pub fn with_signal_source(
        config: CacheConfig,
        store: Arc<S>,
        signals: Arc<dyn SignalSource>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, store, signals))
    }

    fn build(config: CacheConfig, store: Arc<S>, signals: Arc<dyn SignalSource>) -> Self {
        Self {
            store,
            entries: KeyedCacheStore::with_config(config.store.clone()),
            signals,
            config,
            metrics: CacheMetrics::new(),
        }
    }

    // =========================================================================
    // Single-entity lookups
    // =========================================================================

    /// Find an entity by primary identifier.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<S::Entity>> {
        require(id, "identifier")?;

        let key = LookupKey::id(id);
        if let Some(cached) = self.lookup(&key) {
            return Ok(cached.into_single());
        }

        let generation = self.signals.generation();
        self.metrics.record_store_query();
        let entity = self.store.find_by_id(id).await?;

        self.populate_single(key, entity.as_ref(), generation)?;
        Ok(entity)
    }

    /// Find an entity by reference identifier.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_by_reference_id(&self, reference_id: &str) -> Result<Option<S::Entity>> {
        require(reference_id, "reference identifier")?;

        let key = LookupKey::reference_id(reference_id);
        if let Some(cached) = self.lookup(&key) {
            return Ok(cached.into_single());
        }

        let generation = self.signals.generation();
        self.metrics.record_store_query();
        let entity = self.store.find_by_reference_id(reference_id).await?;

        self.populate_single(key, entity.as_ref(), generation)?;
        Ok(entity)
    }

    // =========================================================================
    // One-to-many lookups
    // =========================================================================

    /// Find every entity issued to a subject.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_by_subject(&self, subject: &str) -> Result<Arc<[S::Entity]>> {
        require(subject, "subject")?;

        let key = LookupKey::subject(subject);
        if let Some(list) = self.lookup(&key).and_then(CachedValue::into_list) {
            return Ok(list);
        }

        let generation = self.signals.generation();
        self.metrics.record_store_query();
        let stream = self.store.find_by_subject(subject);
        self.populate_list(key, stream, generation).await
    }

    /// Find every entity owned by an application.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_by_application_id(
        &self,
        application_id: &str,
    ) -> Result<Arc<[S::Entity]>> {
        require(application_id, "application identifier")?;

        let key = LookupKey::application_id(application_id);
        if let Some(list) = self.lookup(&key).and_then(CachedValue::into_list) {
            return Ok(list);
        }

        let generation = self.signals.generation();
        self.metrics.record_store_query();
        let stream = self.store.find_by_application_id(application_id);
        self.populate_list(key, stream, generation).await
    }

    /// Find every entity attached to an authorization.
    #[instrument(skip(self), level = "debug")]
    pub async fn find_by_authorization_id(
        &self,
        authorization_id: &str,
    ) -> Result<Arc<[S::Entity]>> {
        require(authorization_id, "authorization identifier")?;

        let key = LookupKey::authorization_id(authorization_id);
        if let Some(list) = self.lookup(&key).and_then(CachedValue::into_list) {
            return Ok(list);
        }

        let generation = self.signals.generation();
        self.metrics.record_store_query();
        let stream = self.store.find_by_authorization_id(authorization_id);
        self.populate_list(key, stream, generation).await
    }

    // =========================================================================
    // Filtered pass-through
    // =========================================================================

    /// Stream every entity matching `filter` straight from the store.
    ///
    /// The result set itself is never cached, but each entity streamed
    /// through is added so its single-entity lookups stay warm.
    pub fn find<'a>(&'a self, filter: &'a TokenFilter) -> EntityStream<'a, S::Entity> {
        self.metrics.record_filtered_query();
        let generation = self.signals.generation();

        self.store
            .find(filter)
            .and_then(move |entity| {
                future::ready(self.add_observed(&entity, generation).map(|_| entity))
            })
            .boxed()
    }

    // =========================================================================
    // Mutation notifications
    // =========================================================================

    /// Record an observation of `entity`.
    ///
    /// Drops the cached one-to-many lookups the entity could belong to and
    /// the entity's own single-entity entries, then caches the entity under
    /// its id and reference id bound to its signal.
    pub fn add(&self, entity: &S::Entity) -> Result<()> {
        self.add_observed(entity, self.signals.generation())
            .map(|_| ())
    }

    /// Invalidate every cached lookup containing `entity`, across all shapes.
    pub fn remove(&self, entity: &S::Entity) -> Result<()> {
        let id = self.entity_id(entity)?;
        self.invalidate(&id).map(|_| ())
    }

    /// Fire the signal of an entity known only by identifier.
    ///
    /// Returns whether any cached lookup was bound to it.
    pub fn invalidate(&self, id: &str) -> Result<bool> {
        require(id, "identifier")?;

        let fired = self.signals.fire(id)?;
        if fired {
            self.metrics.record_signal_fired();
        }
        debug!(id, fired, "Invalidated entity");
        Ok(fired)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drop every entry whose signal has fired, then every signal no entry
    /// is bound to any more. Returns the number of entries dropped.
    pub fn sweep(&self) -> usize {
        let swept = self.entries.sweep();
        let pruned = self.signals.prune();
        if swept > 0 || pruned > 0 {
            debug!(swept, pruned, "Swept invalidated entries");
        }
        swept
    }

    /// Run the background sweep until `shutdown` is cancelled.
    ///
    /// Returns immediately when no sweep interval is configured.
    pub async fn run_sweeper(self: Arc<Self>, shutdown: CancellationToken) {
        let Some(period) = self.config.sweep_interval else {
            debug!("No sweep interval configured, sweeper not started");
            return;
        };

        info!(?period, "Starting cache sweeper");
        let mut tick = interval(period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Cache sweeper shutting down");
                    break;
                }
                _ = tick.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// Drop every cached lookup. Signals are left untouched.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get combined statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            lookups: self.metrics.snapshot(),
            store: self.entries.stats(),
            live_signals: self.signals.live_count(),
        }
    }

    /// Get the lookup metrics
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Get the keyed store
    pub fn entries(&self) -> &KeyedCacheStore<CachedValue<S::Entity>> {
        &self.entries
    }

    /// Get the backing store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Cache lookup with hit/miss accounting
    fn lookup(&self, key: &LookupKey) -> Option<CachedValue<S::Entity>> {
        match self.entries.try_get(key) {
            Some(value) => {
                self.metrics.record_hit(key.shape());
                trace!(%key, not_found = value.is_not_found(), "Cache hit");
                Some(value)
            }
            None => {
                self.metrics.record_miss(key.shape());
                debug!(%key, "Cache miss");
                None
            }
        }
    }

    fn entity_id(&self, entity: &S::Entity) -> Result<String> {
        non_empty(self.store.id(entity)).ok_or_else(|| {
            warn!("Entity has no usable identifier");
            Error::InvalidState("the entity identifier cannot be resolved".into())
        })
    }

    /// Insert unless a signal fired since `generation` was read.
    ///
    /// Signals must be acquired before calling: a fire that lands after the
    /// generation check then cancels one of them, and the entry is dead on
    /// arrival instead of stale.
    fn insert_if_current(
        &self,
        key: LookupKey,
        value: CachedValue<S::Entity>,
        signals: Vec<SignalHandle>,
        generation: u64,
    ) -> bool {
        if self.signals.generation() != generation {
            self.metrics.record_population_skipped();
            debug!(%key, "Skipped population raced by an invalidation");
            return false;
        }

        let size = value.size();
        self.entries.insert(key, value, size, signals)
    }

    fn populate_single(
        &self,
        key: LookupKey,
        entity: Option<&S::Entity>,
        generation: u64,
    ) -> Result<()> {
        match entity {
            Some(entity) => {
                let (signal, own_keys) = self.add_observed(entity, generation)?;
                // Normally `key` is one of the entity's own keys and already
                // populated; only a store answering under a different
                // identifier needs the extra entry.
                if !own_keys.contains(&key) {
                    let value = CachedValue::found(entity.clone());
                    self.insert_if_current(key, value, vec![signal], generation);
                }
            }
            None if self.config.negative_caching => {
                if self.insert_if_current(key, CachedValue::not_found(), Vec::new(), generation) {
                    self.metrics.record_negative_entry();
                }
            }
            None => {}
        }
        Ok(())
    }

    async fn populate_list(
        &self,
        key: LookupKey,
        stream: EntityStream<'_, S::Entity>,
        generation: u64,
    ) -> Result<Arc<[S::Entity]>> {
        // Drain fully before touching the cache: a failed or dropped stream
        // leaves the key unpopulated.
        let entities: Vec<S::Entity> = stream.try_collect().await?;

        let mut seen = HashSet::with_capacity(entities.len());
        let mut signals = Vec::with_capacity(entities.len());
        for entity in &entities {
            let (signal, _) = self.add_observed(entity, generation)?;
            if seen.insert(signal.id().to_string()) {
                signals.push(signal);
            }
        }

        let list: Arc<[S::Entity]> = entities.into();
        debug!(%key, count = list.len(), "Populating list lookup");
        self.insert_if_current(key, CachedValue::list(Arc::clone(&list)), signals, generation);
        Ok(list)
    }

    /// Value of the entity field a lookup shape is keyed by
    fn field(&self, shape: LookupShape, entity: &S::Entity) -> Option<String> {
        let value = match shape {
            LookupShape::Id => self.store.id(entity),
            LookupShape::ReferenceId => self.store.reference_id(entity),
            LookupShape::Subject => self.store.subject(entity),
            LookupShape::ApplicationId => self.store.application_id(entity),
            LookupShape::AuthorizationId => self.store.authorization_id(entity),
        };
        non_empty(value)
    }

    /// Keys of the given kind under which `entity` can be looked up
    fn keys_of(&self, entity: &S::Entity, one_to_many: bool) -> Vec<LookupKey> {
        LookupShape::ALL
            .into_iter()
            .filter(|shape| shape.is_one_to_many() == one_to_many)
            .filter_map(|shape| {
                self.field(shape, entity)
                    .map(|value| LookupKey::single(shape, value))
            })
            .collect()
    }

    /// Invalidation + population for one observed entity.
    ///
    /// Returns the entity's signal and the single-entity keys it was cached
    /// under.
    fn add_observed(
        &self,
        entity: &S::Entity,
        generation: u64,
    ) -> Result<(SignalHandle, Vec<LookupKey>)> {
        let id = self.entity_id(entity)?;

        // Membership of a cached list cannot be decided from one entity's
        // new state, so every list it could belong to is dropped.
        let list_keys = self.keys_of(entity, true);
        let dropped = self.entries.remove_all(&list_keys);
        if dropped > 0 {
            self.metrics.record_list_invalidations(dropped);
            debug!(id = %id, dropped, "Dropped list lookups");
        }

        let single_keys = self.keys_of(entity, false);
        self.entries.remove_all(&single_keys);

        let signal = self.signals.get_or_create(&id)?;
        for key in &single_keys {
            let value = CachedValue::found(entity.clone());
            self.insert_if_current(key.clone(), value, vec![signal.clone()], generation);
        }
        Ok((signal, single_keys))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTokenStore;
    use crate::domain::token::{Token, TokenType};
    use assert_matches::assert_matches;

    fn cache() -> (Arc<InMemoryTokenStore>, LookupCache<InMemoryTokenStore>) {
        let store = Arc::new(InMemoryTokenStore::new());
        let cache = LookupCache::new(Arc::clone(&store));
        (store, cache)
    }

    fn token(id: &str) -> Token {
        Token::new(TokenType::AccessToken)
            .with_id(id)
            .with_reference_id(format!("ref-{}", id))
            .with_subject("alice")
            .with_application_id("portal")
            .with_authorization_id("auth-1")
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_capacity(64)
            .with_negative_caching(false)
            .with_sweep_interval(Duration::from_secs(5));

        assert_eq!(config.store.capacity, 64);
        assert!(!config.negative_caching);
        assert_eq!(config.sweep_interval, Some(Duration::from_secs(5)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert_matches!(
            CacheConfig::new().with_capacity(0).validate(),
            Err(Error::Config(_))
        );
        assert_matches!(
            CacheConfig::new().with_sweep_interval(Duration::ZERO).validate(),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "store": { "capacity": 10 } }"#).unwrap();
        assert_eq!(config.store.capacity, 10);
        assert!(config.negative_caching);
        assert!(config.sweep_interval.is_none());
    }

    #[tokio::test]
    async fn test_empty_arguments_rejected() {
        let (_, cache) = cache();

        assert_matches!(cache.find_by_id("").await, Err(Error::InvalidArgument(_)));
        assert_matches!(
            cache.find_by_reference_id("").await,
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(cache.find_by_subject("").await, Err(Error::InvalidArgument(_)));
        assert_matches!(
            cache.find_by_application_id("").await,
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(
            cache.find_by_authorization_id("").await,
            Err(Error::InvalidArgument(_))
        );
        assert_matches!(cache.invalidate(""), Err(Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_entity_without_id_is_invalid_state() {
        let (_, cache) = cache();
        let unsaved = Token::new(TokenType::AccessToken);

        assert_matches!(cache.add(&unsaved), Err(Error::InvalidState(_)));
        assert_matches!(cache.remove(&unsaved), Err(Error::InvalidState(_)));
        assert_matches!(cache.remove(&unsaved.with_id("")), Err(Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let (store, cache) = cache();
        store.create(token("t1"));

        let first = cache.find_by_id("t1").await.unwrap();
        let second = cache.find_by_id("t1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.query_stats().find_by_id, 1);
        assert_eq!(cache.metrics().hits(LookupShape::Id), 1);
        assert_eq!(cache.metrics().misses(LookupShape::Id), 1);
    }

    #[tokio::test]
    async fn test_found_entity_keyed_under_reference_id() {
        let (store, cache) = cache();
        store.create(token("t1"));

        cache.find_by_id("t1").await.unwrap();
        let by_ref = cache.find_by_reference_id("ref-t1").await.unwrap();

        assert_eq!(by_ref.unwrap().id.as_deref(), Some("t1"));
        assert_eq!(store.query_stats().find_by_reference_id, 0);
    }

    #[tokio::test]
    async fn test_add_populates_without_store() {
        let (store, cache) = cache();
        let t = token("t1");

        cache.add(&t).unwrap();

        assert_eq!(cache.find_by_id("t1").await.unwrap(), Some(t.clone()));
        assert_eq!(cache.find_by_reference_id("ref-t1").await.unwrap(), Some(t));
        assert_eq!(store.query_stats().total(), 0);
    }

    #[tokio::test]
    async fn test_negative_caching() {
        let (store, cache) = cache();

        assert!(cache.find_by_id("missing").await.unwrap().is_none());
        assert!(cache.find_by_id("missing").await.unwrap().is_none());
        assert_eq!(store.query_stats().find_by_id, 1);
        assert_eq!(cache.stats().lookups.negative_entries, 1);

        // Signals never touch negative entries
        cache.invalidate("missing").unwrap();
        assert!(cache.find_by_id("missing").await.unwrap().is_none());
        assert_eq!(store.query_stats().find_by_id, 1);

        let t = token("missing");
        cache.add(&t).unwrap();
        assert_eq!(cache.find_by_id("missing").await.unwrap(), Some(t));
        assert_eq!(store.query_stats().find_by_id, 1);
    }

    #[tokio::test]
    async fn test_negative_caching_disabled() {
        let store = Arc::new(InMemoryTokenStore::new());
        let config = CacheConfig::new().with_negative_caching(false);
        let cache = LookupCache::with_config(config, Arc::clone(&store)).unwrap();

        cache.find_by_id("missing").await.unwrap();
        cache.find_by_id("missing").await.unwrap();
        assert_eq!(store.query_stats().find_by_id, 2);
    }

    #[tokio::test]
    async fn test_list_lookup_populates_singles() {
        let (store, cache) = cache();
        store.create(token("t1"));
        store.create(token("t2"));

        let list = cache.find_by_subject("alice").await.unwrap();
        assert_eq!(list.len(), 2);

        cache.find_by_id("t1").await.unwrap();
        cache.find_by_reference_id("ref-t2").await.unwrap();
        cache.find_by_subject("alice").await.unwrap();

        let stats = store.query_stats();
        assert_eq!(stats.find_by_subject, 1);
        assert_eq!(stats.find_by_id, 0);
        assert_eq!(stats.find_by_reference_id, 0);
    }

    #[tokio::test]
    async fn test_empty_list_is_cached() {
        let (store, cache) = cache();

        assert!(cache.find_by_application_id("nobody").await.unwrap().is_empty());
        assert!(cache.find_by_application_id("nobody").await.unwrap().is_empty());
        assert_eq!(store.query_stats().find_by_application_id, 1);
    }

    #[tokio::test]
    async fn test_list_signals_deduplicated() {
        let (store, cache) = cache();
        store.create(token("t1"));

        cache.find_by_authorization_id("auth-1").await.unwrap();
        assert_eq!(cache.stats().live_signals, 1);
    }

    #[tokio::test]
    async fn test_remove_invalidates_every_shape() {
        let (store, cache) = cache();
        let t = store.create(token("t1"));

        cache.find_by_subject("alice").await.unwrap();
        cache.find_by_application_id("portal").await.unwrap();
        cache.find_by_authorization_id("auth-1").await.unwrap();
        cache.find_by_id("t1").await.unwrap();
        let before = store.query_stats();

        cache.remove(&t).unwrap();

        cache.find_by_id("t1").await.unwrap();
        cache.find_by_reference_id("ref-t1").await.unwrap();
        cache.find_by_subject("alice").await.unwrap();
        cache.find_by_application_id("portal").await.unwrap();
        cache.find_by_authorization_id("auth-1").await.unwrap();

        let after = store.query_stats();
        assert_eq!(after.find_by_subject, before.find_by_subject + 1);
        assert_eq!(after.find_by_application_id, before.find_by_application_id + 1);
        assert_eq!(
            after.find_by_authorization_id,
            before.find_by_authorization_id + 1
        );
        assert!(
            after.find_by_id + after.find_by_reference_id
                > before.find_by_id + before.find_by_reference_id
        );
    }

    #[tokio::test]
    async fn test_store_failure_propagates_and_leaves_cache_untouched() {
        let (store, cache) = cache();
        store.create(token("t1"));
        store.set_unavailable(true);

        assert_matches!(cache.find_by_id("t1").await, Err(Error::Store(_)));
        assert_matches!(cache.find_by_subject("alice").await, Err(Error::Store(_)));
        assert!(cache.entries().is_empty());

        store.set_unavailable(false);
        assert!(cache.find_by_id("t1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_filtered_find_warms_singles() {
        let (store, cache) = cache();
        store.create(token("t1"));
        store.create(token("t2").with_subject("bob"));

        let filter = TokenFilter::new().with_subject("bob");
        let found: Vec<Token> = cache.find(&filter).try_collect().await.unwrap();
        assert_eq!(found.len(), 1);

        // Filter results are never cached
        let _: Vec<Token> = cache.find(&filter).try_collect().await.unwrap();
        assert_eq!(store.query_stats().find, 2);

        cache.find_by_id("t2").await.unwrap();
        assert_eq!(store.query_stats().find_by_id, 0);
    }

    #[tokio::test]
    async fn test_population_skipped_after_concurrent_fire() {
        let (store, cache) = cache();
        let t = store.create(token("t1"));

        let generation = cache.signals.generation();
        cache.invalidate("t1").unwrap();
        cache.populate_single(LookupKey::id("t1"), Some(&t), generation).unwrap();

        assert!(!cache.entries().contains_key(&LookupKey::id("t1")));
        // One skip per single-entity key: id and reference id
        assert_eq!(cache.stats().lookups.populations_skipped, 2);
    }

    #[tokio::test]
    async fn test_lookup_key_not_inserted_twice() {
        let (store, cache) = cache();
        store.create(token("t1"));

        cache.find_by_reference_id("ref-t1").await.unwrap();

        let stats = cache.stats().store;
        assert_eq!(stats.insertions, 2);
        assert_eq!(stats.entries, 2);
    }

    #[tokio::test]
    async fn test_sweep_prunes_signals_of_evicted_entries() {
        let store = Arc::new(InMemoryTokenStore::new());
        let config = CacheConfig::new().with_capacity(2);
        let cache = LookupCache::with_config(config, Arc::clone(&store)).unwrap();
        store.create(token("t1"));
        store.create(token("t2"));

        // Each token occupies its id and reference id entries
        cache.find_by_id("t1").await.unwrap();
        cache.find_by_id("t2").await.unwrap();
        assert!(!cache.entries().contains_key(&LookupKey::id("t1")));
        assert_eq!(cache.stats().live_signals, 2);

        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.stats().live_signals, 1);

        // The surviving entries still invalidate through their signal
        assert!(cache.invalidate("t2").unwrap());
        cache.find_by_id("t2").await.unwrap();
        assert_eq!(store.query_stats().find_by_id, 3);
    }

    #[tokio::test]
    async fn test_sweep_reclaims_fired_entries() {
        let (store, cache) = cache();
        let t = store.create(token("t1"));
        cache.find_by_subject("alice").await.unwrap();
        let populated = cache.entries().len();
        assert!(populated >= 3);

        cache.remove(&t).unwrap();
        assert_eq!(cache.sweep(), populated);
        assert!(cache.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_runs_until_shutdown() {
        let store = Arc::new(InMemoryTokenStore::new());
        let t = store.create(token("t1"));
        let config = CacheConfig::new().with_sweep_interval(Duration::from_millis(10));
        let cache = Arc::new(LookupCache::with_config(config, store).unwrap());

        cache.find_by_id("t1").await.unwrap();
        cache.remove(&t).unwrap();
        assert!(!cache.entries().is_empty());

        let shutdown = CancellationToken::new();
        let sweeper = tokio::spawn(Arc::clone(&cache).run_sweeper(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.entries().is_empty());

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, cache) = cache();
        store.create(token("t1"));
        cache.find_by_id("t1").await.unwrap();

        cache.clear();
        assert!(cache.entries().is_empty());
        cache.find_by_id("t1").await.unwrap();
        assert_eq!(store.query_stats().find_by_id, 2);
    }
}
