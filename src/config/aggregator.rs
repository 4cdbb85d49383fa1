// src/config/aggregator.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::error::{AggregatorError, Result};

pub const ENV_CONFIG_PATH: &str = "AGGREGATOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/aggregator.toml";

fn default_jobboard_url() -> String {
    "https://remotive.com/api/remote-jobs".to_string()
}
fn default_token_url() -> String {
    "https://francetravail.io/connexion/oauth2/access_token?realm=%2Fpartenaire".to_string()
}
fn default_search_url() -> String {
    "https://api.francetravail.io/partenaire/offresdemploi/v2/offres/search".to_string()
}
fn default_scope() -> String {
    "o2dsoffre api_offresdemploiv2".to_string()
}
fn default_job_limit() -> usize {
    20
}
fn default_page_size() -> usize {
    20
}
fn default_max_page_size() -> usize {
    100
}
fn default_source_timeout_secs() -> u64 {
    15
}
fn default_safety_margin_secs() -> u64 {
    60
}
fn default_database_path() -> String {
    "jobs.db".to_string()
}
fn default_user_agent() -> String {
    "job-aggregator/0.1".to_string()
}

/// Deployment environment. Controls how broad the authenticated search is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Environment::Prod,
            _ => Environment::Dev,
        }
    }

    pub fn is_prod(self) -> bool {
        self == Environment::Prod
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_jobboard_url")]
    pub jobboard_url: String,
    #[serde(default = "default_token_url")]
    pub francetravail_token_url: String,
    #[serde(default = "default_search_url")]
    pub francetravail_api_url: String,
    #[serde(default = "default_scope")]
    pub francetravail_scope: String,
    /// Optional; when absent the authenticated source is reported unavailable.
    #[serde(default)]
    pub francetravail_client_id: Option<String>,
    #[serde(default)]
    pub francetravail_client_secret: Option<String>,
    /// Max records taken from the public board per round.
    #[serde(default = "default_job_limit")]
    pub job_limit: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_safety_margin_secs")]
    pub token_safety_margin_secs: u64,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            jobboard_url: default_jobboard_url(),
            francetravail_token_url: default_token_url(),
            francetravail_api_url: default_search_url(),
            francetravail_scope: default_scope(),
            francetravail_client_id: None,
            francetravail_client_secret: None,
            job_limit: default_job_limit(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            environment: Environment::default(),
            source_timeout_secs: default_source_timeout_secs(),
            token_safety_margin_secs: default_safety_margin_secs(),
            database_path: default_database_path(),
            user_agent: default_user_agent(),
        }
    }
}

impl AggregatorConfig {
    /// Parse a TOML file. Environment overrides are NOT applied here.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AggregatorConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load config using env var + fallbacks, then apply env overrides:
    /// 1) $AGGREGATOR_CONFIG_PATH (must exist)
    /// 2) config/aggregator.toml
    /// 3) built-in defaults
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(AggregatorError::config(format!(
                    "{ENV_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                )));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = env::var("FRANCETRAVAIL_CLIENT_ID") {
            self.francetravail_client_id = Some(v);
        }
        if let Ok(v) = env::var("FRANCETRAVAIL_CLIENT_SECRET") {
            self.francetravail_client_secret = Some(v);
        }
        if let Ok(v) = env::var("JOBBOARD_URL") {
            if !v.trim().is_empty() {
                self.jobboard_url = v;
            }
        }
        if let Ok(v) = env::var("APP_ENV") {
            self.environment = Environment::parse(&v);
        }
        if let Some(n) = env::var("JOB_LIMIT").ok().and_then(|v| v.parse().ok()) {
            self.job_limit = n;
        }
        if let Ok(v) = env::var("DATABASE_PATH") {
            if !v.trim().is_empty() {
                self.database_path = v;
            }
        }
    }

    fn sanitize(&mut self) {
        // Blank credentials count as missing.
        for slot in [
            &mut self.francetravail_client_id,
            &mut self.francetravail_client_secret,
        ] {
            if slot.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *slot = None;
            }
        }
        if self.max_page_size == 0 {
            self.max_page_size = default_max_page_size();
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            self.default_page_size = default_page_size().min(self.max_page_size);
        }
        if self.source_timeout_secs == 0 {
            self.source_timeout_secs = default_source_timeout_secs();
        }
    }

    /// Client credentials, only when both halves are present.
    pub fn francetravail_credentials(&self) -> Option<(String, String)> {
        match (
            self.francetravail_client_id.as_ref(),
            self.francetravail_client_secret.as_ref(),
        ) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}
