//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the abstraction the lookup cache depends on: the
//! durable entity store that answers cache misses. Infrastructure adapters
//! implement [`EntityStore`] to provide concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Lookup Cache                            │
//! │  find_by_id │ find_by_subject │ ... │ add │ remove          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ (misses only)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Ports (This Module)                       │
//! │              EntityStore  +  field accessors                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │        InMemoryTokenStore │ database-backed stores           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

use super::token::{TokenStatus, TokenType};

/// Lazy, finite, non-restartable sequence of entities produced by a store.
pub type EntityStream<'a, E> = BoxStream<'a, Result<E>>;

// =============================================================================
// Value Objects
// =============================================================================

/// Filter for the uncached, combinatorial lookup shape.
///
/// Every field is optional; `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenFilter {
    /// Subject the token was issued to
    pub subject: Option<String>,
    /// Client (application) identifier
    pub client: Option<String>,
    /// Token status
    pub status: Option<TokenStatus>,
    /// Token type
    pub token_type: Option<TokenType>,
}

impl TokenFilter {
    /// Create an empty filter matching every entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a subject.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Restrict to a client.
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Restrict to a status.
    pub fn with_status(mut self, status: TokenStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to a token type.
    pub fn with_type(mut self, token_type: TokenType) -> Self {
        self.token_type = Some(token_type);
        self
    }
}

// =============================================================================
// Entity Store Port
// =============================================================================

/// Port for the durable store backing the lookup cache.
///
/// The store is always the source of truth. Lookups that miss the cache are
/// forwarded here; the cache never writes through it.
///
/// The accessor methods extract identifying fields from an entity. They are
/// synchronous, never fail, and return `None` when the field is absent.
///
/// # Example
///
/// ```ignore
/// struct SqlTokenStore { /* ... */ }
///
/// #[async_trait]
/// impl EntityStore for SqlTokenStore {
///     type Entity = TokenRow;
///
///     async fn find_by_id(&self, id: &str) -> Result<Option<TokenRow>> {
///         // SELECT ... WHERE id = $1
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Entity type served by this store.
    type Entity: Clone + Send + Sync + 'static;

    /// Find an entity by its primary identifier.
    async fn find_by_id(&self, id: &str) -> Result<Option<Self::Entity>>;

    /// Find an entity by its reference identifier.
    async fn find_by_reference_id(&self, reference_id: &str) -> Result<Option<Self::Entity>>;

    /// Stream every entity issued to a subject.
    fn find_by_subject<'a>(&'a self, subject: &'a str) -> EntityStream<'a, Self::Entity>;

    /// Stream every entity owned by an application.
    fn find_by_application_id<'a>(
        &'a self,
        application_id: &'a str,
    ) -> EntityStream<'a, Self::Entity>;

    /// Stream every entity attached to an authorization.
    fn find_by_authorization_id<'a>(
        &'a self,
        authorization_id: &'a str,
    ) -> EntityStream<'a, Self::Entity>;

    /// Stream every entity matching a filter.
    fn find<'a>(&'a self, filter: &'a TokenFilter) -> EntityStream<'a, Self::Entity>;

    /// Primary identifier of an entity.
    fn id(&self, entity: &Self::Entity) -> Option<String>;

    /// Reference identifier of an entity.
    fn reference_id(&self, entity: &Self::Entity) -> Option<String>;

    /// Subject of an entity.
    fn subject(&self, entity: &Self::Entity) -> Option<String>;

    /// Owning application identifier.
    fn application_id(&self, entity: &Self::Entity) -> Option<String>;

    /// Owning authorization identifier.
    fn authorization_id(&self, entity: &Self::Entity) -> Option<String>;
}
