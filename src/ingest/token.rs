// src/ingest/token.rs
//! Bearer-token cache for sources using the OAuth2 client-credentials grant.
//!
//! Refresh is single-flight: the slot is an async mutex held across the
//! network call, so callers arriving during a refresh wait for it and then
//! reuse the fresh token instead of issuing their own request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{AggregatorError, Result};

/// Lifetime assumed when the token endpoint does not report `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Token as returned by the issuer, before it is stamped with wall-clock times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Usable only while `now + margin < expires_at`.
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        now + margin < self.expires_at
    }
}

/// Performs the network grant. Split from the cache so the cache can be
/// exercised without a token endpoint.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self) -> Result<IssuedToken>;
}

/// `POST` of a form-encoded client-credentials grant.
pub struct ClientCredentialsIssuer {
    source: &'static str,
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

impl ClientCredentialsIssuer {
    pub fn new(
        source: &'static str,
        client: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            source,
            client,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

#[async_trait::async_trait]
impl TokenIssuer for ClientCredentialsIssuer {
    async fn issue(&self) -> Result<IssuedToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];
        // `.form()` sets content-type application/x-www-form-urlencoded.
        let resp = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AggregatorError::auth(self.source, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AggregatorError::auth(
                self.source,
                format!("token endpoint returned {status}: {body}"),
            ));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AggregatorError::auth(self.source, e))?;
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AggregatorError::auth(self.source, "missing access_token"))?;

        Ok(IssuedToken {
            access_token,
            expires_in: body.expires_in,
        })
    }
}

pub struct TokenCache {
    source: &'static str,
    issuer: Arc<dyn TokenIssuer>,
    safety_margin: chrono::Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: &'static str, issuer: Arc<dyn TokenIssuer>, safety_margin: Duration) -> Self {
        Self {
            source,
            issuer,
            safety_margin: chrono::Duration::from_std(safety_margin)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            slot: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> Result<String> {
        self.get_token_at(Utc::now()).await
    }

    /// Valid token as of `now`, refreshing when absent or inside the safety margin.
    ///
    /// A failed refresh returns `AuthFailure`; a stale cached token is never
    /// handed out as a fallback.
    pub async fn get_token_at(&self, now: DateTime<Utc>) -> Result<String> {
        let mut slot = self.slot.lock().await;
        if let Some(tok) = slot.as_ref() {
            if tok.is_usable_at(now, self.safety_margin) {
                return Ok(tok.access_token.clone());
            }
        }

        counter!("token_refresh_total", "source" => self.source).increment(1);
        let issued = match self.issuer.issue().await {
            Ok(t) => t,
            Err(e) => {
                counter!("token_refresh_failures_total", "source" => self.source).increment(1);
                tracing::warn!(source = self.source, error = %e, "token refresh failed");
                return Err(match e {
                    e @ AggregatorError::AuthFailure { .. } => e,
                    other => AggregatorError::auth(self.source, other),
                });
            }
        };

        let lifetime = issued
            .expires_in
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let fresh = CachedToken {
            access_token: issued.access_token,
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(lifetime),
        };
        tracing::info!(source = self.source, expires_in = lifetime, "token refreshed");

        // Never let an older grant overwrite a newer one.
        if slot.as_ref().is_none_or(|cur| cur.issued_at <= fresh.issued_at) {
            *slot = Some(fresh.clone());
        }
        Ok(fresh.access_token)
    }

    /// Drop the cached token, e.g. after the source rejected it with 401.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    pub async fn cached(&self) -> Option<CachedToken> {
        self.slot.lock().await.clone()
    }

    pub fn source(&self) -> &'static str {
        self.source
    }
}
