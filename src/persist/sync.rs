// src/persist/sync.rs
use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;

use crate::error::{AggregatorError, Result};
use crate::ingest::types::Posting;
use crate::persist::PostingStore;

/// Inserts freshly aggregated postings whose URL is not yet stored.
/// Existing rows are never updated.
pub struct PersistenceSync {
    store: Arc<dyn PostingStore>,
}

impl PersistenceSync {
    pub fn new(store: Arc<dyn PostingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PostingStore> {
        &self.store
    }

    /// One reconciliation pass. Returns how many postings were newly stored.
    ///
    /// Postings without a URL are skipped: they have no identity key to check
    /// against the store. A race with a concurrent pass surfaces as
    /// `PersistenceConflict` with nothing written.
    pub async fn reconcile(&self, postings: &[Posting]) -> Result<usize> {
        crate::ingest::ensure_metrics_described();

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(postings.len());
        let mut skipped = 0usize;
        for p in postings {
            match p.dedup_key() {
                Some(url) if seen.insert(url.to_string()) => candidates.push(p),
                Some(_) => {}
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "postings without url not persisted");
        }

        let urls: Vec<String> = candidates.iter().map(|p| p.url.trim().to_string()).collect();
        let existing = self.store.existing_urls(&urls).await?;

        let fresh: Vec<Posting> = candidates
            .into_iter()
            .filter(|p| !existing.contains(p.url.trim()))
            .map(|p| Posting {
                url: p.url.trim().to_string(),
                liked: false,
                ..p.clone()
            })
            .collect();

        if fresh.is_empty() {
            tracing::info!(candidates = urls.len(), "no new postings to store");
            return Ok(0);
        }

        match self.store.insert_batch(&fresh).await {
            Ok(n) => {
                counter!("persistence_inserted_total").increment(n as u64);
                tracing::info!(stored = n, candidates = urls.len(), "new postings stored");
                Ok(n)
            }
            Err(e) => {
                if e.is_conflict() {
                    counter!("persistence_conflicts_total").increment(1);
                    tracing::warn!(error = %e, "batch rolled back on conflict");
                }
                Err(e)
            }
        }
    }

    /// Re-run the full pass (existence check, filter, insert) on conflict,
    /// up to `max_attempts` passes in total.
    pub async fn reconcile_with_retry(&self, postings: &[Posting], max_attempts: usize) -> Result<usize> {
        let attempts = max_attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            match self.reconcile(postings).await {
                Err(e) if e.is_conflict() => {
                    tracing::info!(attempt, "reconciliation conflict, retrying with fresh pass");
                    last = Some(e);
                }
                other => return other,
            }
        }
        Err(last.unwrap_or_else(|| AggregatorError::conflict("reconciliation did not run")))
    }
}
