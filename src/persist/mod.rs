// src/persist/mod.rs
//! Durable posting storage behind a key-unique insert interface.
//!
//! The identity key for existence checks is the posting URL; stores enforce
//! URL uniqueness and roll back a whole batch on violation.

pub mod memory;
pub mod sqlite;
pub mod sync;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::ingest::types::Posting;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use sync::PersistenceSync;

#[async_trait]
pub trait PostingStore: Send + Sync {
    /// Subset of `urls` already stored.
    async fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>>;

    /// Insert every posting or none. A URL already present (in the store or
    /// twice in the batch) yields `PersistenceConflict` and nothing is written.
    async fn insert_batch(&self, postings: &[Posting]) -> Result<usize>;

    /// Stored postings in insertion order.
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Posting>>;

    async fn get(&self, id: &str) -> Result<Option<Posting>>;

    async fn count(&self) -> Result<usize>;
}
