// src/ingest/types.rs
use chrono::NaiveDate;
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::{AggregatorError, Result};

/// Canonical, source-agnostic job posting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Posting {
    /// Identity key, never empty: `<source-slug>-<native id or index>`.
    pub id: String,
    /// Source-native id; display/reference only.
    pub external_id: String,
    pub title: String,
    pub company: String,
    /// Deduplication key across sources when non-empty.
    pub url: String,
    pub source: String,
    pub location: String,
    pub salary: String,
    pub description: String,
    pub contract_type: String,
    pub date_created: NaiveDate,
    #[serde(default)]
    pub liked: bool,
}

impl Posting {
    /// URL used for cross-source deduplication, if the posting has one.
    pub fn dedup_key(&self) -> Option<&str> {
        let url = self.url.trim();
        (!url.is_empty()).then_some(url)
    }
}

/// Outward JSON shape handed to the web layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostingDto {
    pub id: String,
    pub external_id: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub source: String,
    pub location: String,
    pub salary: String,
    pub description: String,
    #[serde(rename = "typeContrat")]
    pub contract_type: String,
    /// `dd/mm/YYYY`
    #[serde(rename = "dateCreation")]
    pub date_created: String,
    pub liked: bool,
}

impl From<&Posting> for PostingDto {
    fn from(p: &Posting) -> Self {
        Self {
            id: p.id.clone(),
            external_id: p.external_id.clone(),
            title: p.title.clone(),
            company: p.company.clone(),
            url: p.url.clone(),
            source: p.source.clone(),
            location: p.location.clone(),
            salary: p.salary.clone(),
            description: p.description.clone(),
            contract_type: p.contract_type.clone(),
            date_created: p.date_created.format("%d/%m/%Y").to_string(),
            liked: p.liked,
        }
    }
}

/// Why a source contributed nothing this round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Credentials or endpoint not configured; no network call was made.
    NotConfigured,
    Auth(String),
    Fetch(String),
    Timeout,
}

impl FailureReason {
    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::NotConfigured => "not_configured",
            FailureReason::Auth(_) => "auth",
            FailureReason::Fetch(_) => "fetch",
            FailureReason::Timeout => "timeout",
        }
    }
}

impl From<AggregatorError> for FailureReason {
    fn from(e: AggregatorError) -> Self {
        match e {
            AggregatorError::AuthFailure { message, .. } => FailureReason::Auth(message),
            AggregatorError::SourceFetchFailure { message, .. } => FailureReason::Fetch(message),
            other => FailureReason::Fetch(other.to_string()),
        }
    }
}

/// Either the postings a source produced or the tagged reason it produced none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Fetched(Vec<Posting>),
    Failed(FailureReason),
}

impl SourceOutcome {
    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            SourceOutcome::Fetched(_) => None,
            SourceOutcome::Failed(r) => Some(r),
        }
    }

    /// Postings of this outcome; a failure contributes nothing.
    pub fn into_postings(self) -> Vec<Posting> {
        match self {
            SourceOutcome::Fetched(v) => v,
            SourceOutcome::Failed(_) => Vec::new(),
        }
    }
}

/// One external job source.
///
/// Implementors provide `try_fetch`; callers use `fetch`, which never fails:
/// errors are logged, counted and folded into `SourceOutcome::Failed`.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// False when the adapter is missing credentials or endpoints.
    fn is_configured(&self) -> bool {
        true
    }

    async fn try_fetch(&self) -> Result<Vec<Posting>>;

    async fn fetch(&self) -> SourceOutcome {
        if !self.is_configured() {
            tracing::debug!(source = self.name(), "source not configured, skipping");
            return SourceOutcome::Failed(FailureReason::NotConfigured);
        }
        match self.try_fetch().await {
            Ok(postings) => {
                tracing::info!(source = self.name(), count = postings.len(), "source fetched");
                SourceOutcome::Fetched(postings)
            }
            Err(e) => {
                let reason = FailureReason::from(e);
                tracing::warn!(source = self.name(), reason = ?reason, "source failed");
                counter!(
                    "aggregator_source_failures_total",
                    "source" => self.name(),
                    "reason" => reason.label()
                )
                .increment(1);
                SourceOutcome::Failed(reason)
            }
        }
    }
}
