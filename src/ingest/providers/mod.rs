// src/ingest/providers/mod.rs
pub mod france_travail;
pub mod remotive;

pub use france_travail::FranceTravailAdapter;
pub use remotive::RemotiveAdapter;

use std::time::Duration;

use crate::config::AggregatorConfig;
use crate::error::Result;

/// HTTP client shared by an adapter and its token issuer.
pub fn build_http_client(cfg: &AggregatorConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&cfg.user_agent)
        .connect_timeout(Duration::from_secs(4))
        .timeout(cfg.source_timeout())
        .build()?;
    Ok(client)
}
