// src/ingest/aggregator.rs
//! Fan-out/fan-in over every registered source.
//!
//! Each adapter runs on its own task under a per-source timeout. Results are
//! joined in registration order, so the merged sequence is ordered by source
//! precedence, then by within-source fetch order. Pagination is applied after
//! the full merge; every call re-fetches.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

use crate::config::AggregatorConfig;
use crate::error::{AggregatorError, Result};
use crate::ingest::providers::{FranceTravailAdapter, RemotiveAdapter};
use crate::ingest::types::{FailureReason, Posting, SourceAdapter, SourceOutcome};
use crate::ingest::{dedup_by_url, ensure_metrics_described, paginate};

/// What a single source contributed to one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: &'static str,
    pub fetched: usize,
    pub failure: Option<FailureReason>,
}

#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    /// Merged and deduplicated, in source precedence order.
    pub postings: Vec<Posting>,
    pub sources: Vec<SourceReport>,
    pub dedup_dropped: usize,
}

impl AggregationReport {
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| s.failure.is_some())
    }
}

pub struct AggregationEngine {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    source_timeout: Duration,
}

impl AggregationEngine {
    /// `adapters` order is the merge precedence.
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, source_timeout: Duration) -> Self {
        Self {
            adapters,
            source_timeout,
        }
    }

    /// Default source set: public board first, then the authenticated board.
    pub fn from_config(cfg: &AggregatorConfig) -> Result<Self> {
        let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(RemotiveAdapter::from_config(cfg)?),
            Arc::new(FranceTravailAdapter::from_config(cfg)?),
        ];
        Ok(Self::new(adapters, cfg.source_timeout()))
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Deduplicated `[offset, offset + limit)` window of the merged feed.
    ///
    /// Only fails with `FatalConcurrencyFault` (a task cancelled by runtime
    /// shutdown); source failures and panics shrink the result instead.
    pub async fn aggregate(&self, offset: usize, limit: usize) -> Result<Vec<Posting>> {
        let report = self.aggregate_report().await?;
        Ok(paginate(report.postings, offset, limit))
    }

    pub async fn aggregate_report(&self) -> Result<AggregationReport> {
        ensure_metrics_described();

        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let timeout = self.source_timeout;
                tokio::spawn(async move { run_source(adapter, timeout).await })
            })
            .collect();

        let mut merged = Vec::new();
        let mut sources = Vec::with_capacity(handles.len());
        for (adapter, handle) in self.adapters.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                // A panicking adapter only loses its own contribution.
                Err(e) if e.is_panic() => {
                    tracing::error!(source = adapter.name(), error = %e, "source task panicked");
                    let reason = FailureReason::Fetch(format!("adapter panicked: {e}"));
                    counter!(
                        "aggregator_source_failures_total",
                        "source" => adapter.name(),
                        "reason" => reason.label()
                    )
                    .increment(1);
                    SourceOutcome::Failed(reason)
                }
                Err(e) => {
                    return Err(AggregatorError::FatalConcurrencyFault(format!(
                        "task for source {} did not complete: {e}",
                        adapter.name()
                    )));
                }
            };

            let failure = outcome.failure().cloned();
            let postings = outcome.into_postings();
            counter!("aggregator_postings_fetched_total", "source" => adapter.name())
                .increment(postings.len() as u64);
            sources.push(SourceReport {
                source: adapter.name(),
                fetched: postings.len(),
                failure,
            });
            merged.extend(postings);
        }

        let total = merged.len();
        let (postings, dedup_dropped) = dedup_by_url(merged);

        counter!("aggregator_dedup_dropped_total").increment(dedup_dropped as u64);
        gauge!("aggregator_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

        tracing::info!(
            target: "aggregate",
            fetched = total,
            kept = postings.len(),
            dedup = dedup_dropped,
            failed = sources.iter().filter(|s| s.failure.is_some()).count(),
            "aggregation round"
        );

        Ok(AggregationReport {
            postings,
            sources,
            dedup_dropped,
        })
    }
}

/// Fetch one source; a timeout cancels only this source's call.
async fn run_source(adapter: Arc<dyn SourceAdapter>, timeout: Duration) -> SourceOutcome {
    let t0 = Instant::now();
    let outcome = match tokio::time::timeout(timeout, adapter.fetch()).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(
                source = adapter.name(),
                timeout_ms = timeout.as_millis() as u64,
                "source timed out"
            );
            counter!(
                "aggregator_source_failures_total",
                "source" => adapter.name(),
                "reason" => FailureReason::Timeout.label()
            )
            .increment(1);
            SourceOutcome::Failed(FailureReason::Timeout)
        }
    };
    histogram!("aggregator_source_fetch_ms", "source" => adapter.name())
        .record(t0.elapsed().as_secs_f64() * 1_000.0);
    outcome
}
