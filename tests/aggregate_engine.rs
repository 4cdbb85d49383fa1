// tests/aggregate_engine.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use job_aggregator::ingest::types::{FailureReason, Posting, SourceAdapter};
use job_aggregator::{AggregationEngine, AggregatorError, Result};

enum Behaviour {
    Returns(Vec<&'static str>),
    Fail,
    Hang,
    Panic,
}

struct MockSource {
    name: &'static str,
    behaviour: Behaviour,
}

fn posting(source: &str, i: usize, url: &str) -> Posting {
    Posting {
        id: format!("{source}-{i}"),
        external_id: i.to_string(),
        title: format!("{source} job {i}"),
        company: "Acme".into(),
        url: url.into(),
        source: source.into(),
        location: String::new(),
        salary: String::new(),
        description: String::new(),
        contract_type: String::new(),
        date_created: NaiveDate::from_ymd_opt(2024, 11, 2).unwrap(),
        liked: false,
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn try_fetch(&self) -> Result<Vec<Posting>> {
        match &self.behaviour {
            Behaviour::Returns(urls) => Ok(urls
                .iter()
                .enumerate()
                .map(|(i, u)| posting(self.name, i, u))
                .collect()),
            Behaviour::Fail => Err(AggregatorError::fetch(self.name, "connection refused")),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Behaviour::Panic => {
                let records: Vec<Posting> = Vec::new();
                let third = records[3].clone();
                Ok(vec![third])
            }
        }
    }
}

fn engine(sources: Vec<MockSource>) -> AggregationEngine {
    AggregationEngine::new(
        sources
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn SourceAdapter>)
            .collect(),
        Duration::from_millis(200),
    )
}

#[tokio::test]
async fn cross_source_duplicate_is_attributed_to_first_source() {
    let e = engine(vec![
        MockSource { name: "A", behaviour: Behaviour::Returns(vec!["u1", "u2"]) },
        MockSource { name: "B", behaviour: Behaviour::Returns(vec!["u2", "u3"]) },
    ]);

    let out = e.aggregate(0, 10).await.unwrap();
    let urls: Vec<_> = out.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["u1", "u2", "u3"]);
    let u2 = out.iter().find(|p| p.url == "u2").unwrap();
    assert_eq!(u2.source, "A");
}

#[tokio::test]
async fn at_most_one_posting_per_url_and_empty_urls_survive() {
    let e = engine(vec![
        MockSource { name: "A", behaviour: Behaviour::Returns(vec!["u1", "", "u1", ""]) },
        MockSource { name: "B", behaviour: Behaviour::Returns(vec!["", "u1", "u2", "u2"]) },
    ]);

    let report = e.aggregate_report().await.unwrap();
    let non_empty: Vec<_> = report
        .postings
        .iter()
        .filter(|p| !p.url.is_empty())
        .map(|p| p.url.clone())
        .collect();
    let unique: HashSet<_> = non_empty.iter().cloned().collect();
    assert_eq!(non_empty.len(), unique.len());
    assert_eq!(report.postings.iter().filter(|p| p.url.is_empty()).count(), 3);
    assert_eq!(report.dedup_dropped, 3);
}

#[tokio::test]
async fn pagination_matches_slice_of_full_sequence() {
    let e = engine(vec![
        MockSource { name: "A", behaviour: Behaviour::Returns(vec!["u1", "u2", "u3"]) },
        MockSource { name: "B", behaviour: Behaviour::Returns(vec!["u3", "u4", ""]) },
    ]);
    let full = e.aggregate(0, usize::MAX).await.unwrap();
    let n = full.len();
    assert_eq!(n, 5);

    for (offset, limit) in [(0, 2), (2, 2), (4, 10), (5, 3), (9, 1), (0, 0)] {
        let page = e.aggregate(offset, limit).await.unwrap();
        let expected = limit.min(n.saturating_sub(offset));
        assert_eq!(page.len(), expected, "offset={offset} limit={limit}");
        let expected_ids: Vec<_> = full.iter().skip(offset).take(limit).map(|p| &p.id).collect();
        let got_ids: Vec<_> = page.iter().map(|p| &p.id).collect();
        assert_eq!(got_ids, expected_ids);
    }
}

#[tokio::test]
async fn failing_source_does_not_affect_others() {
    let healthy = engine(vec![
        MockSource { name: "A", behaviour: Behaviour::Returns(vec!["u1", "u2"]) },
        MockSource { name: "C", behaviour: Behaviour::Returns(vec!["u3"]) },
    ]);
    let degraded = engine(vec![
        MockSource { name: "A", behaviour: Behaviour::Returns(vec!["u1", "u2"]) },
        MockSource { name: "B", behaviour: Behaviour::Fail },
        MockSource { name: "C", behaviour: Behaviour::Returns(vec!["u3"]) },
    ]);

    let expected = healthy.aggregate(0, 100).await.unwrap();
    let report = degraded.aggregate_report().await.unwrap();
    assert_eq!(report.postings, expected);

    let failed: Vec<_> = report.failed_sources().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source, "B");
    assert!(matches!(failed[0].failure, Some(FailureReason::Fetch(_))));
}

#[tokio::test]
async fn timed_out_source_is_treated_as_empty() {
    let e = engine(vec![
        MockSource { name: "Slow", behaviour: Behaviour::Hang },
        MockSource { name: "A", behaviour: Behaviour::Returns(vec!["u1"]) },
    ]);

    let started = std::time::Instant::now();
    let report = e.aggregate_report().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    assert_eq!(report.postings.len(), 1);
    assert_eq!(report.sources[0].source, "Slow");
    assert_eq!(report.sources[0].failure, Some(FailureReason::Timeout));
    assert_eq!(report.sources[1].failure, None);
}

#[tokio::test]
async fn panicking_source_only_loses_its_own_postings() {
    let e = engine(vec![
        MockSource { name: "A", behaviour: Behaviour::Returns(vec!["u1"]) },
        MockSource { name: "B", behaviour: Behaviour::Panic },
        MockSource { name: "C", behaviour: Behaviour::Returns(vec!["u2"]) },
    ]);

    let page = e.aggregate(0, 10).await.unwrap();
    let urls: Vec<_> = page.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["u1", "u2"]);

    let report = e.aggregate_report().await.unwrap();
    let failed: Vec<_> = report.failed_sources().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source, "B");
    assert!(matches!(failed[0].failure, Some(FailureReason::Fetch(_))));
}
