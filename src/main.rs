//! Job aggregator service entrypoint.
//! Boots the Axum HTTP server, wiring sources, storage and metrics.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use job_aggregator::api::{self, AppState};
use job_aggregator::metrics::Metrics;
use job_aggregator::persist::{PostingStore, SqliteStore};
use job_aggregator::{AggregationEngine, AggregatorConfig};

/// Compact logs by default, JSON when LOG_FORMAT=json.
/// No-op if the runtime already installed a subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("job_aggregator=info,aggregate=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = AggregatorConfig::load_default().context("loading aggregator config")?;
    tracing::info!(
        environment = ?config.environment,
        job_limit = config.job_limit,
        credentials = config.francetravail_credentials().is_some(),
        "config loaded"
    );

    let metrics = Metrics::init(config.source_timeout_secs).context("installing metrics recorder")?;

    let engine = AggregationEngine::from_config(&config).context("building source adapters")?;
    let store: Arc<dyn PostingStore> = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("opening database {}", config.database_path))?,
    );

    let state = AppState::new(
        Arc::new(engine),
        store,
        config.default_page_size,
        config.max_page_size,
    );
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
