//! Domain Layer
//!
//! The entity model and the store port the lookup cache is written against.
//!
//! - **Ports** (`ports.rs`) - [`EntityStore`], the store collaborator answering cache misses
//! - **Token** (`token.rs`) - the token entity served by the bundled adapters
//!
//! # Usage
//!
//! ```ignore
//! use tokencache::domain::{EntityStore, TokenFilter};
//!
//! async fn count_for_client<S: EntityStore>(store: &S, client: &str) -> usize {
//!     use futures::StreamExt;
//!     let filter = TokenFilter::new().with_client(client);
//!     store.find(&filter).count().await
//! }
//! ```

pub mod ports;
pub mod token;

pub use ports::{EntityStore, EntityStream, TokenFilter};
pub use token::{Token, TokenStatus, TokenType};
