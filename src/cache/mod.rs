//! Offline fallback for the calendar.
//!
//! # Modules
//!
//! - `snapshot` - The immutable [`CacheSnapshot`] of one successful fetch
//! - `cache_store` - JSON file implementation of [`CachePersistence`]

mod cache_store;
mod snapshot;

pub use crate::cache::cache_store::JsonCacheStore;
pub use crate::cache::snapshot::{CacheSnapshot, SCHEMA_VERSION};

use async_trait::async_trait;
use mockall::automock;
use thiserror::Error;

/// Errors raised while persisting a snapshot.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Durable storage of the last-known-good snapshot.
#[automock]
#[async_trait]
pub trait CachePersistence: Send + Sync {
    /// Loads the stored snapshot.
    ///
    /// Returns `None` when nothing usable is stored; never fails.
    async fn load(&self) -> Option<CacheSnapshot>;

    /// Replaces the stored snapshot.
    async fn save(&self, snapshot: &CacheSnapshot) -> Result<(), PersistenceError>;
}
