// src/ingest/mod.rs
pub mod aggregator;
pub mod providers;
pub mod token;
pub mod types;

use crate::ingest::types::Posting;
use chrono::NaiveDate;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;

pub use aggregator::{AggregationEngine, AggregationReport, SourceReport};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "aggregator_postings_fetched_total",
            "Postings returned by sources before deduplication."
        );
        describe_counter!(
            "aggregator_source_failures_total",
            "Source rounds that contributed nothing, by reason."
        );
        describe_counter!(
            "aggregator_dedup_dropped_total",
            "Postings dropped because their URL was already seen."
        );
        describe_histogram!(
            "aggregator_source_fetch_ms",
            "Per-source fetch time in milliseconds."
        );
        describe_gauge!(
            "aggregator_last_run_ts",
            "Unix ts when aggregation last ran."
        );
        describe_counter!("token_refresh_total", "Token refresh attempts.");
        describe_counter!("token_refresh_failures_total", "Failed token refreshes.");
        describe_counter!(
            "persistence_inserted_total",
            "Postings newly stored by reconciliation."
        );
        describe_counter!(
            "persistence_conflicts_total",
            "Batch inserts rolled back on a uniqueness violation."
        );
    });
}

/// Normalize a short text field: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Date part of an ISO-8601 timestamp (`2024-03-07T10:20:30Z`,
/// `2024-03-07T10:20:30.123Z`, `2024-03-07T10:20:30`, `2024-03-07`).
/// Time and zone are discarded.
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    let bare = s.trim_end_matches('Z');
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(bare, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(bare, "%Y-%m-%d").ok()
}

/// Drop postings whose non-empty URL was already seen earlier in the sequence.
/// Postings without a URL are always kept. Order is preserved.
/// Returns (kept, dropped_count).
pub fn dedup_by_url(postings: Vec<Posting>) -> (Vec<Posting>, usize) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(postings.len());
    let mut dropped = 0usize;

    for p in postings {
        if let Some(url) = p.dedup_key() {
            if !seen.insert(url.to_string()) {
                dropped += 1;
                continue;
            }
        }
        keep.push(p);
    }

    (keep, dropped)
}

/// The `[offset, offset + limit)` window of `postings`.
pub fn paginate(postings: Vec<Posting>, offset: usize, limit: usize) -> Vec<Posting> {
    postings.into_iter().skip(offset).take(limit).collect()
}
