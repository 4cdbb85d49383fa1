use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::config::AggregatorConfig;
use crate::error::{AggregatorError, Result};
use crate::ingest::types::{Posting, SourceAdapter};
use crate::ingest::{normalize_text, parse_iso_date};

pub const SOURCE_NAME: &str = "Remotive";
const ID_PREFIX: &str = "remotive";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    jobs: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawJob {
    id: Option<Value>,
    url: Option<String>,
    title: Option<String>,
    company_name: Option<String>,
    candidate_required_location: Option<String>,
    salary: Option<String>,
    description: Option<String>,
    job_type: Option<String>,
    publication_date: Option<String>,
}

/// Native ids arrive as numbers; accept strings too.
fn native_id(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn normalize(index: usize, raw: RawJob) -> Result<Posting> {
    let external_id = native_id(raw.id.as_ref());
    let date_created = raw
        .publication_date
        .as_deref()
        .and_then(parse_iso_date)
        .ok_or_else(|| {
            AggregatorError::fetch(
                SOURCE_NAME,
                format!(
                    "record {index}: bad publication_date {:?}",
                    raw.publication_date.as_deref().unwrap_or_default()
                ),
            )
        })?;

    let id = if external_id.is_empty() {
        format!("{ID_PREFIX}-{index}")
    } else {
        format!("{ID_PREFIX}-{external_id}")
    };

    Ok(Posting {
        id,
        external_id,
        title: normalize_text(raw.title.as_deref().unwrap_or_default()),
        company: normalize_text(raw.company_name.as_deref().unwrap_or_default()),
        url: raw.url.unwrap_or_default().trim().to_string(),
        source: SOURCE_NAME.to_string(),
        location: normalize_text(raw.candidate_required_location.as_deref().unwrap_or_default()),
        salary: normalize_text(raw.salary.as_deref().unwrap_or_default()),
        description: raw.description.unwrap_or_default(),
        contract_type: normalize_text(raw.job_type.as_deref().unwrap_or_default()),
        date_created,
        liked: false,
    })
}

/// Public board feed: unauthenticated GET, `{"jobs": [...]}`.
pub struct RemotiveAdapter {
    client: reqwest::Client,
    url: String,
    limit: usize,
}

impl RemotiveAdapter {
    pub fn new(client: reqwest::Client, url: impl Into<String>, limit: usize) -> Self {
        Self {
            client,
            url: url.into(),
            limit,
        }
    }

    pub fn from_config(cfg: &AggregatorConfig) -> Result<Self> {
        let client = super::build_http_client(cfg)?;
        Ok(Self::new(client, cfg.jobboard_url.clone(), cfg.job_limit))
    }

    /// Normalize a feed body. Records past `limit` are discarded unparsed;
    /// any kept record that cannot be normalized fails the whole body.
    pub fn parse_body(body: &str, limit: usize) -> Result<Vec<Posting>> {
        let feed: Feed = serde_json::from_str(body)
            .map_err(|e| AggregatorError::fetch(SOURCE_NAME, format!("invalid feed json: {e}")))?;

        feed.jobs
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, v)| {
                let raw: RawJob = serde_json::from_value(v).map_err(|e| {
                    AggregatorError::fetch(SOURCE_NAME, format!("record {i}: {e}"))
                })?;
                normalize(i, raw)
            })
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for RemotiveAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }

    async fn try_fetch(&self) -> Result<Vec<Posting>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AggregatorError::fetch(SOURCE_NAME, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AggregatorError::fetch(
                SOURCE_NAME,
                format!("feed returned {status}"),
            ));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| AggregatorError::fetch(SOURCE_NAME, e))?;
        Self::parse_body(&body, self.limit)
    }
}
