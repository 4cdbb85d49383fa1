use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::{AggregatorConfig, Environment};
use crate::error::{AggregatorError, Result};
use crate::ingest::normalize_text;
use crate::ingest::token::{ClientCredentialsIssuer, TokenCache};
use crate::ingest::types::{Posting, SourceAdapter};

pub const SOURCE_NAME: &str = "France Travail";
const ID_PREFIX: &str = "francetravail";
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";
/// Keyword used outside production to bound result volume.
pub const DEV_KEYWORDS: &str = "développeur";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    resultats: Vec<RawOffer>,
}

#[derive(Debug, Default, Deserialize)]
struct Labelled {
    libelle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Company {
    nom: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Contact {
    url_postulation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOffer {
    id: Option<String>,
    intitule: Option<String>,
    description: Option<String>,
    date_creation: Option<String>,
    entreprise: Option<Company>,
    lieu_travail: Option<Labelled>,
    salaire: Option<Labelled>,
    contact: Option<Contact>,
    type_contrat: Option<String>,
}

/// Date part of `dateCreation`; today when absent or malformed.
fn creation_date(raw: Option<&str>, today: NaiveDate) -> NaiveDate {
    raw.and_then(|s| NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT).ok())
        .map(|dt| dt.date())
        .unwrap_or(today)
}

fn normalize(index: usize, raw: RawOffer, today: NaiveDate) -> Posting {
    let external_id = raw.id.unwrap_or_default().trim().to_string();
    let id = if external_id.is_empty() {
        format!("{ID_PREFIX}-{index}")
    } else {
        format!("{ID_PREFIX}-{external_id}")
    };
    let label = |l: Option<Labelled>| normalize_text(&l.and_then(|l| l.libelle).unwrap_or_default());

    Posting {
        id,
        external_id,
        title: normalize_text(raw.intitule.as_deref().unwrap_or_default()),
        company: normalize_text(&raw.entreprise.and_then(|c| c.nom).unwrap_or_default()),
        url: raw
            .contact
            .and_then(|c| c.url_postulation)
            .unwrap_or_default()
            .trim()
            .to_string(),
        source: SOURCE_NAME.to_string(),
        location: label(raw.lieu_travail),
        salary: label(raw.salaire),
        description: raw.description.unwrap_or_default(),
        contract_type: normalize_text(raw.type_contrat.as_deref().unwrap_or_default()),
        date_created: creation_date(raw.date_creation.as_deref(), today),
        liked: false,
    }
}

/// Government job-search API behind an OAuth2 client-credentials token.
pub struct FranceTravailAdapter {
    client: reqwest::Client,
    search_url: String,
    /// `None` when credentials are not configured.
    tokens: Option<Arc<TokenCache>>,
    keywords: Option<String>,
}

impl FranceTravailAdapter {
    pub fn new(
        client: reqwest::Client,
        search_url: impl Into<String>,
        tokens: Option<Arc<TokenCache>>,
        environment: Environment,
    ) -> Self {
        Self {
            client,
            search_url: search_url.into(),
            tokens,
            keywords: keywords_for(environment).map(str::to_string),
        }
    }

    /// Builds the token cache only if both client id and secret are present.
    pub fn from_config(cfg: &AggregatorConfig) -> Result<Self> {
        let client = super::build_http_client(cfg)?;
        let tokens = cfg.francetravail_credentials().map(|(id, secret)| {
            let issuer = ClientCredentialsIssuer::new(
                SOURCE_NAME,
                client.clone(),
                cfg.francetravail_token_url.clone(),
                id,
                secret,
                cfg.francetravail_scope.clone(),
            );
            Arc::new(TokenCache::new(
                SOURCE_NAME,
                Arc::new(issuer),
                Duration::from_secs(cfg.token_safety_margin_secs),
            ))
        });
        if tokens.is_none() {
            tracing::warn!(
                source = SOURCE_NAME,
                "client credentials not set; source disabled"
            );
        }
        Ok(Self::new(
            client,
            cfg.francetravail_api_url.clone(),
            tokens,
            cfg.environment,
        ))
    }

    pub fn keywords(&self) -> Option<&str> {
        self.keywords.as_deref()
    }

    pub fn parse_body(body: &str) -> Result<Vec<Posting>> {
        Self::parse_body_at(body, Utc::now().date_naive())
    }

    /// Normalize a search body; `today` substitutes for unparseable dates.
    pub fn parse_body_at(body: &str, today: NaiveDate) -> Result<Vec<Posting>> {
        let resp: SearchResponse = serde_json::from_str(body).map_err(|e| {
            AggregatorError::fetch(SOURCE_NAME, format!("invalid search json: {e}"))
        })?;
        Ok(resp
            .resultats
            .into_iter()
            .enumerate()
            .map(|(i, raw)| normalize(i, raw, today))
            .collect())
    }
}

/// Narrow search outside production, unrestricted in production.
pub fn keywords_for(environment: Environment) -> Option<&'static str> {
    if environment.is_prod() {
        None
    } else {
        Some(DEV_KEYWORDS)
    }
}

#[async_trait]
impl SourceAdapter for FranceTravailAdapter {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn is_configured(&self) -> bool {
        self.tokens.is_some() && !self.search_url.trim().is_empty()
    }

    async fn try_fetch(&self) -> Result<Vec<Posting>> {
        let tokens = self
            .tokens
            .as_ref()
            .ok_or_else(|| AggregatorError::auth(SOURCE_NAME, "client credentials not configured"))?;
        let token = tokens.get_token().await?;

        let mut query: Vec<(&str, &str)> = vec![("accesTravailleurHandicape", "false")];
        if let Some(k) = self.keywords.as_deref() {
            query.push(("motsCles", k));
        }

        let resp = self
            .client
            .get(&self.search_url)
            .bearer_auth(&token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await
            .map_err(|e| AggregatorError::fetch(SOURCE_NAME, e))?;

        match resp.status() {
            StatusCode::NO_CONTENT => return Ok(Vec::new()),
            StatusCode::UNAUTHORIZED => {
                tokens.invalidate().await;
                return Err(AggregatorError::auth(SOURCE_NAME, "search rejected bearer token"));
            }
            s if !s.is_success() => {
                return Err(AggregatorError::fetch(
                    SOURCE_NAME,
                    format!("search returned {s}"),
                ));
            }
            _ => {}
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AggregatorError::fetch(SOURCE_NAME, e))?;
        Self::parse_body(&body)
    }
}
