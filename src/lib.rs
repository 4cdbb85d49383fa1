// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod persist;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::{AggregatorConfig, Environment};
pub use crate::error::{AggregatorError, Result};
pub use crate::ingest::types::{Posting, PostingDto, SourceAdapter, SourceOutcome};
pub use crate::ingest::AggregationEngine;
pub use crate::persist::{PersistenceSync, PostingStore};
