// tests/providers_http.rs
//
// Adapters against a local axum server standing in for the public feed,
// the OAuth2 token endpoint and the authenticated search endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::json;

use job_aggregator::ingest::providers::{FranceTravailAdapter, RemotiveAdapter};
use job_aggregator::ingest::types::{FailureReason, SourceAdapter, SourceOutcome};
use job_aggregator::{AggregatorConfig, Environment};

const REMOTIVE_BODY: &str = include_str!("fixtures/remotive_jobs.json");
const SEARCH_BODY: &str = include_str!("fixtures/francetravail_offres.json");

#[derive(Clone, Copy, PartialEq)]
enum SearchMode {
    Results,
    NoContent,
    Unauthorized,
}

struct Mock {
    token_hits: AtomicUsize,
    search_hits: AtomicUsize,
    feed_hits: AtomicUsize,
    token_ok: AtomicBool,
    search_mode: Mutex<SearchMode>,
    token_content_types: Mutex<Vec<String>>,
    forms: Mutex<Vec<HashMap<String, String>>>,
    auth_headers: Mutex<Vec<String>>,
    queries: Mutex<Vec<HashMap<String, String>>>,
}

impl Mock {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            token_hits: AtomicUsize::new(0),
            search_hits: AtomicUsize::new(0),
            feed_hits: AtomicUsize::new(0),
            token_ok: AtomicBool::new(true),
            search_mode: Mutex::new(SearchMode::Results),
            token_content_types: Mutex::new(Vec::new()),
            forms: Mutex::new(Vec::new()),
            auth_headers: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
        })
    }
}

async fn feed(State(m): State<Arc<Mock>>) -> Response {
    m.feed_hits.fetch_add(1, Ordering::SeqCst);
    (
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        REMOTIVE_BODY,
    )
        .into_response()
}

async fn token(
    State(m): State<Arc<Mock>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = m.token_hits.fetch_add(1, Ordering::SeqCst) + 1;
    let ct = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    m.token_content_types.lock().unwrap().push(ct);
    m.forms.lock().unwrap().push(form);
    if !m.token_ok.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    Json(json!({ "access_token": format!("ft-token-{n}"), "expires_in": 1499 })).into_response()
}

async fn search(
    State(m): State<Arc<Mock>>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    m.search_hits.fetch_add(1, Ordering::SeqCst);
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    m.auth_headers.lock().unwrap().push(auth);
    m.queries.lock().unwrap().push(q);
    let mode = *m.search_mode.lock().unwrap();
    match mode {
        SearchMode::Results => (
            StatusCode::PARTIAL_CONTENT,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            SEARCH_BODY,
        )
            .into_response(),
        SearchMode::NoContent => StatusCode::NO_CONTENT.into_response(),
        SearchMode::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn spawn_mock(mock: Arc<Mock>) -> String {
    let app = Router::new()
        .route("/api/remote-jobs", get(feed))
        .route("/token", post(token))
        .route("/search", get(search))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config(base: &str, with_credentials: bool, environment: Environment) -> AggregatorConfig {
    AggregatorConfig {
        jobboard_url: format!("{base}/api/remote-jobs"),
        francetravail_token_url: format!("{base}/token"),
        francetravail_api_url: format!("{base}/search"),
        francetravail_client_id: with_credentials.then(|| "client-id".to_string()),
        francetravail_client_secret: with_credentials.then(|| "s3cret".to_string()),
        job_limit: 2,
        environment,
        source_timeout_secs: 5,
        ..AggregatorConfig::default()
    }
}

#[tokio::test]
async fn remotive_fetch_truncates_and_normalizes() {
    let mock = Mock::new();
    let base = spawn_mock(mock.clone()).await;
    let adapter = RemotiveAdapter::from_config(&config(&base, false, Environment::Dev)).unwrap();

    let postings = match adapter.fetch().await {
        SourceOutcome::Fetched(v) => v,
        other => panic!("expected postings, got {other:?}"),
    };
    assert_eq!(postings.len(), 2);
    assert_eq!(postings[0].id, "remotive-1901234");
    assert_eq!(postings[0].company, "Ferrous & Co");
    assert_eq!(postings[1].title, "Platform Engineer");
    assert_eq!(mock.feed_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn france_travail_uses_cached_bearer_and_dev_keywords() {
    let mock = Mock::new();
    let base = spawn_mock(mock.clone()).await;
    let adapter =
        FranceTravailAdapter::from_config(&config(&base, true, Environment::Dev)).unwrap();

    for _ in 0..2 {
        match adapter.fetch().await {
            SourceOutcome::Fetched(v) => assert_eq!(v.len(), 3),
            other => panic!("expected postings, got {other:?}"),
        }
    }

    assert_eq!(mock.token_hits.load(Ordering::SeqCst), 1);
    assert_eq!(mock.search_hits.load(Ordering::SeqCst), 2);

    let ct = mock.token_content_types.lock().unwrap()[0].clone();
    assert!(ct.starts_with("application/x-www-form-urlencoded"), "got {ct}");
    let form = mock.forms.lock().unwrap()[0].clone();
    assert_eq!(form["grant_type"], "client_credentials");
    assert_eq!(form["client_id"], "client-id");
    assert_eq!(form["client_secret"], "s3cret");
    assert_eq!(form["scope"], "o2dsoffre api_offresdemploiv2");

    let auth = mock.auth_headers.lock().unwrap().clone();
    assert!(auth.iter().all(|h| h == "Bearer ft-token-1"));

    let q = mock.queries.lock().unwrap()[0].clone();
    assert_eq!(q["accesTravailleurHandicape"], "false");
    assert_eq!(q["motsCles"], "développeur");
}

#[tokio::test]
async fn production_search_has_no_keyword_filter() {
    let mock = Mock::new();
    let base = spawn_mock(mock.clone()).await;
    let adapter =
        FranceTravailAdapter::from_config(&config(&base, true, Environment::Prod)).unwrap();

    assert!(matches!(adapter.fetch().await, SourceOutcome::Fetched(_)));
    let q = mock.queries.lock().unwrap()[0].clone();
    assert!(!q.contains_key("motsCles"));
}

#[tokio::test]
async fn missing_credentials_skip_the_network_entirely() {
    let mock = Mock::new();
    let base = spawn_mock(mock.clone()).await;
    let adapter =
        FranceTravailAdapter::from_config(&config(&base, false, Environment::Dev)).unwrap();

    assert_eq!(
        adapter.fetch().await,
        SourceOutcome::Failed(FailureReason::NotConfigured)
    );
    assert_eq!(mock.token_hits.load(Ordering::SeqCst), 0);
    assert_eq!(mock.search_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn token_endpoint_failure_is_auth_failure_without_search() {
    let mock = Mock::new();
    mock.token_ok.store(false, Ordering::SeqCst);
    let base = spawn_mock(mock.clone()).await;
    let adapter =
        FranceTravailAdapter::from_config(&config(&base, true, Environment::Dev)).unwrap();

    assert!(matches!(
        adapter.fetch().await,
        SourceOutcome::Failed(FailureReason::Auth(_))
    ));
    assert_eq!(mock.search_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rejected_token_is_dropped_and_reissued_next_round() {
    let mock = Mock::new();
    *mock.search_mode.lock().unwrap() = SearchMode::Unauthorized;
    let base = spawn_mock(mock.clone()).await;
    let adapter =
        FranceTravailAdapter::from_config(&config(&base, true, Environment::Dev)).unwrap();

    assert!(matches!(
        adapter.fetch().await,
        SourceOutcome::Failed(FailureReason::Auth(_))
    ));

    *mock.search_mode.lock().unwrap() = SearchMode::Results;
    assert!(matches!(adapter.fetch().await, SourceOutcome::Fetched(_)));
    assert_eq!(mock.token_hits.load(Ordering::SeqCst), 2);
    let auth = mock.auth_headers.lock().unwrap().clone();
    assert_eq!(auth, vec!["Bearer ft-token-1", "Bearer ft-token-2"]);
}

#[tokio::test]
async fn no_content_means_no_results() {
    let mock = Mock::new();
    *mock.search_mode.lock().unwrap() = SearchMode::NoContent;
    let base = spawn_mock(mock.clone()).await;
    let adapter =
        FranceTravailAdapter::from_config(&config(&base, true, Environment::Dev)).unwrap();

    assert_eq!(adapter.fetch().await, SourceOutcome::Fetched(Vec::new()));
}

#[tokio::test]
async fn unreachable_feed_is_a_fetch_failure() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let adapter = RemotiveAdapter::from_config(&config(&format!("http://{addr}"), false, Environment::Dev)).unwrap();
    assert!(matches!(
        adapter.fetch().await,
        SourceOutcome::Failed(FailureReason::Fetch(_))
    ));
}
