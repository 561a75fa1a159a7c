//! Error types for the token lookup cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a store collaborator
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the lookup cache
#[derive(Error, Debug)]
pub enum Error {
    /// An empty or missing identifier was passed to a lookup or invalidation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An entity could not yield a usable identifier from the store accessors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Failure reported by the backing store, propagated unchanged
    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap a store collaborator failure
    pub fn store(err: impl Into<StoreError>) -> Self {
        Error::Store(err.into())
    }

    /// Shorthand for an empty-identifier argument error
    pub(crate) fn empty_identifier(what: &str) -> Self {
        Error::InvalidArgument(format!("the {} cannot be null or empty", what))
    }
}
