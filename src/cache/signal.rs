//! Invalidation signals
//!
//! One signal per entity identifier. Cache entries bind to the signals of
//! every entity they contain; firing a signal expires all of those entries
//! at once without the cache ever enumerating them.
//!
//! # Design
//!
//! - `DashMap` slot per identifier, get-or-create under the shard lock
//! - Firing removes the slot before cancelling, so the next demand for the
//!   same identifier observes a fresh signal
//! - A global generation counter is bumped on every fire; populations that
//!   straddle a fire compare generations and skip caching
//! - Slots no entry holds a handle to are pruned, so the registry stays
//!   bounded by the cached entries rather than by every entity ever seen

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

/// Source of invalidation signals keyed by entity identifier.
pub trait SignalSource: Send + Sync {
    /// Return the live signal for `id`, creating it if needed.
    ///
    /// Fails with [`Error::InvalidArgument`] when `id` is empty.
    fn get_or_create(&self, id: &str) -> Result<SignalHandle>;

    /// Remove and fire the live signal for `id`.
    ///
    /// Returns whether a live signal existed.
    fn fire(&self, id: &str) -> Result<bool>;

    /// Number of fires performed so far. Monotonic.
    fn generation(&self) -> u64;

    /// Number of live (unfired) signals.
    fn live_count(&self) -> usize;

    /// Drop live signals nobody outside the source holds. Returns the
    /// number dropped.
    fn prune(&self) -> usize;
}

struct SignalInner {
    id: String,
    token: CancellationToken,
}

/// Observable, non-fireable handle to an invalidation signal.
#[derive(Clone)]
pub struct SignalHandle {
    inner: Arc<SignalInner>,
}

impl SignalHandle {
    /// Wrap a cancellation token. Whoever keeps the token owns firing.
    pub fn new(id: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: id.into(),
                token,
            }),
        }
    }

    /// Entity identifier this signal belongs to
    #[inline]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Check whether the signal has fired
    #[inline]
    pub fn is_fired(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Whether two handles refer to the same signal instance
    pub fn same_signal(&self, other: &SignalHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for SignalHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHandle")
            .field("id", &self.id())
            .field("fired", &self.is_fired())
            .finish()
    }
}

/// Registry holding one live signal per entity identifier.
#[derive(Default)]
pub struct SignalRegistry {
    /// Live signals by identifier
    signals: DashMap<String, (SignalHandle, CancellationToken)>,
    /// Fire counter
    generation: AtomicU64,
}

impl SignalRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalSource for SignalRegistry {
    fn get_or_create(&self, id: &str) -> Result<SignalHandle> {
        if id.is_empty() {
            return Err(Error::empty_identifier("identifier"));
        }

        // Try read first
        if let Some(slot) = self.signals.get(id) {
            return Ok(slot.0.clone());
        }

        // Double-checked under the shard write lock
        let slot = self.signals.entry(id.to_string()).or_insert_with(|| {
            trace!(id, "Creating invalidation signal");
            let token = CancellationToken::new();
            (SignalHandle::new(id, token.clone()), token)
        });
        Ok(slot.0.clone())
    }

    fn fire(&self, id: &str) -> Result<bool> {
        if id.is_empty() {
            return Err(Error::empty_identifier("identifier"));
        }

        // Bumped before removal so a population that creates a fresh signal
        // after this point still sees the generation change.
        self.generation.fetch_add(1, Ordering::SeqCst);

        match self.signals.remove(id) {
            Some((_, (_, token))) => {
                token.cancel();
                trace!(id, "Fired invalidation signal");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn live_count(&self) -> usize {
        self.signals.len()
    }

    fn prune(&self) -> usize {
        let before = self.signals.len();
        // Handles are only cloned under the shard lock `retain` holds, so a
        // slot whose handle has no other owner cannot gain one mid-check.
        self.signals
            .retain(|_, (handle, _)| Arc::strong_count(&handle.inner) > 1);
        let pruned = before.saturating_sub(self.signals.len());
        if pruned > 0 {
            trace!(pruned, "Pruned unreferenced signals");
        }
        pruned
    }
}

// =============================================================================
// Tests
// =============================================================================
