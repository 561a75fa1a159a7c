//! In-memory token store.
//!
//! Concurrent [`EntityStore`] implementation backed by a `DashMap`. Used by
//! the tests and the soak harness; it counts every query so callers can
//! assert whether a lookup reached the store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::domain::ports::{EntityStore, EntityStream, TokenFilter};
use crate::domain::token::Token;
use crate::error::{Error, Result};

/// Per-query counters for the in-memory store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreQueryStats {
    pub find_by_id: u64,
    pub find_by_reference_id: u64,
    pub find_by_subject: u64,
    pub find_by_application_id: u64,
    pub find_by_authorization_id: u64,
    pub find: u64,
}

impl StoreQueryStats {
    /// Total number of queries of any shape
    pub fn total(&self) -> u64 {
        self.find_by_id
            + self.find_by_reference_id
            + self.find_by_subject
            + self.find_by_application_id
            + self.find_by_authorization_id
            + self.find
    }
}

/// In-memory token store backed by a `DashMap`.
#[derive(Default)]
pub struct InMemoryTokenStore {
    /// Tokens by primary identifier
    tokens: DashMap<String, Token>,
    /// When set, every query fails with a store error
    unavailable: AtomicBool,
    find_by_id: AtomicU64,
    find_by_reference_id: AtomicU64,
    find_by_subject: AtomicU64,
    find_by_application_id: AtomicU64,
    find_by_authorization_id: AtomicU64,
    find: AtomicU64,
}

impl InMemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a new token, assigning an identifier if it has none.
    ///
    /// Returns the token as stored.
    pub fn create(&self, mut token: Token) -> Token {
        let id = token
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
            .clone();
        debug!(token_id = %id, "Created token");
        self.tokens.insert(id, token.clone());
        token
    }

    /// Replace a persisted token.
    pub fn update(&self, token: Token) -> Result<()> {
        let id = token
            .id
            .clone()
            .ok_or_else(|| Error::InvalidState("cannot update a token without id".into()))?;

        match self.tokens.get_mut(&id) {
            Some(mut existing) => {
                *existing = token;
                Ok(())
            }
            None => Err(Error::store(format!("token '{}' does not exist", id))),
        }
    }

    /// Delete a token, returning it if it existed.
    pub fn delete(&self, id: &str) -> Option<Token> {
        self.tokens.remove(id).map(|(_, token)| token)
    }

    /// Number of persisted tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Simulate a connectivity failure for every subsequent query
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of the query counters
    pub fn query_stats(&self) -> StoreQueryStats {
        StoreQueryStats {
            find_by_id: self.find_by_id.load(Ordering::Relaxed),
            find_by_reference_id: self.find_by_reference_id.load(Ordering::Relaxed),
            find_by_subject: self.find_by_subject.load(Ordering::Relaxed),
            find_by_application_id: self.find_by_application_id.load(Ordering::Relaxed),
            find_by_authorization_id: self.find_by_authorization_id.load(Ordering::Relaxed),
            find: self.find.load(Ordering::Relaxed),
        }
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::store(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "token store unavailable",
            )));
        }
        Ok(())
    }

    /// Snapshot matching tokens into a stream, oldest first.
    fn stream_where<F>(&self, predicate: F) -> EntityStream<'static, Token>
    where
        F: Fn(&Token) -> bool,
    {
        if let Err(e) = self.check_available() {
            return stream::once(async move { Err(e) }).boxed();
        }

        let mut matching: Vec<Token> = self
            .tokens
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.id.cmp(&b.id))
        });

        stream::iter(matching.into_iter().map(Ok)).boxed()
    }
}

#[async_trait]
impl EntityStore for InMemoryTokenStore {
    type Entity = Token;

    async fn find_by_id(&self, id: &str) -> Result<Option<Token>> {
        self.find_by_id.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self.tokens.get(id).map(|t| t.value().clone()))
    }

    async fn find_by_reference_id(&self, reference_id: &str) -> Result<Option<Token>> {
        self.find_by_reference_id.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self
            .tokens
            .iter()
            .find(|entry| entry.value().reference_id.as_deref() == Some(reference_id))
            .map(|entry| entry.value().clone()))
    }

    fn find_by_subject<'a>(&'a self, subject: &'a str) -> EntityStream<'a, Token> {
        self.find_by_subject.fetch_add(1, Ordering::Relaxed);
        self.stream_where(|t| t.subject.as_deref() == Some(subject))
    }

    fn find_by_application_id<'a>(&'a self, application_id: &'a str) -> EntityStream<'a, Token> {
        self.find_by_application_id.fetch_add(1, Ordering::Relaxed);
        self.stream_where(|t| t.application_id.as_deref() == Some(application_id))
    }

    fn find_by_authorization_id<'a>(
        &'a self,
        authorization_id: &'a str,
    ) -> EntityStream<'a, Token> {
        self.find_by_authorization_id.fetch_add(1, Ordering::Relaxed);
        self.stream_where(|t| t.authorization_id.as_deref() == Some(authorization_id))
    }

    fn find<'a>(&'a self, filter: &'a TokenFilter) -> EntityStream<'a, Token> {
        self.find.fetch_add(1, Ordering::Relaxed);
        self.stream_where(|t| t.matches(filter))
    }

    fn id(&self, token: &Token) -> Option<String> {
        token.id.clone()
    }

    fn reference_id(&self, token: &Token) -> Option<String> {
        token.reference_id.clone()
    }

    fn subject(&self, token: &Token) -> Option<String> {
        token.subject.clone()
    }

    fn application_id(&self, token: &Token) -> Option<String> {
        token.application_id.clone()
    }

    fn authorization_id(&self, token: &Token) -> Option<String> {
        token.authorization_id.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
