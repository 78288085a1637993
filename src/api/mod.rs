use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::cache::MatchCounts;
use crate::live_scores::models::Match;
use crate::live_scores::FetchError;
use crate::refresh::{PollIntervals, RefreshEngine, RefreshOutcome, StatsError};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RefreshEngine>,
    /// Reported on `/health`
    pub poll_intervals: PollIntervals,
}

/// Build the Axum router for the public JSON API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/scores", get(scores_handler))
        .route("/health", get(health_handler))
        .route("/stats/:match_id", get(stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

#[derive(Debug, Serialize)]
struct ScoresResponse {
    data: Vec<Match>,
    count: usize,
    #[serde(flatten)]
    counts: MatchCounts,
    cache: CacheMeta,
    quota: QuotaMeta,
}

#[derive(Debug, Serialize)]
struct CacheMeta {
    last_fetched_at: Option<DateTime<Utc>>,
    age_seconds: Option<i64>,
    ttl_seconds: i64,
}

#[derive(Debug, Serialize)]
struct QuotaMeta {
    calls_used: u32,
    calls_limit: u32,
    calls_remaining: u32,
}

/// GET /
async fn index_handler() -> impl IntoResponse {
    Json(json!({
        "message": "Live Scores API - Quota Protected",
        "status": "online",
        "version": VERSION,
    }))
}

/// GET /scores
///
/// Serves the cached snapshot. A stale cache is refreshed inline first when
/// quota allows; whatever happens, the last good snapshot is returned.
async fn scores_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Utc::now();
    let engine = &state.engine;

    match engine.refresh_if_due(now).await {
        RefreshOutcome::Skipped(_) => {}
        outcome => debug!("/scores refresh: {:?}", outcome),
    }

    let snapshot = engine.cache().read().await;
    let quota = engine.quota().snapshot();

    Json(ScoresResponse {
        count: snapshot.matches.len(),
        counts: MatchCounts::of(&snapshot.matches),
        cache: CacheMeta {
            last_fetched_at: snapshot.last_fetched_at,
            age_seconds: snapshot.age(now).map(|age| age.num_seconds()),
            ttl_seconds: engine.settings().cache_ttl.num_seconds(),
        },
        quota: QuotaMeta {
            calls_used: quota.calls_used,
            calls_limit: quota.calls_limit,
            calls_remaining: quota.calls_remaining,
        },
        data: snapshot.matches,
    })
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Utc::now();
    let engine = &state.engine;
    let quota = engine.quota().snapshot();
    let snapshot = engine.cache().read().await;
    let counts = MatchCounts::of(&snapshot.matches);

    Json(json!({
        "status": "online",
        "engine": "livescores-api quota-protected engine",
        "api_provider": engine.provider().host(),
        "version": VERSION,
        "today": now.date_naive().format("%Y-%m-%d").to_string(),
        "quota": {
            "calls_today": quota.calls_used,
            "max_calls_per_day": quota.calls_limit,
            "calls_remaining": quota.calls_remaining,
            "quota_exhausted": quota.exhausted,
            "last_reset_at": quota.last_reset_at,
        },
        "matches": {
            "live": counts.live,
            "total_cached": snapshot.matches.len(),
        },
        "cache": {
            "ttl_seconds": engine.settings().cache_ttl.num_seconds(),
            "last_fetched_at": snapshot.last_fetched_at,
            "poll_interval_live_seconds": state.poll_intervals.live.as_secs(),
            "poll_interval_idle_seconds": state.poll_intervals.idle.as_secs(),
        },
        "server_time": now.timestamp(),
        "features": ["quota_protection", "smart_caching", "dynamic_polling", "auto_quota_reset"],
    }))
}

/// GET /stats/:match_id
async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    match state.engine.fetch_stats(&match_id, Utc::now()).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            warn!("Stats for match {} unavailable: {}", match_id, e);
            let status = match &e {
                StatsError::QuotaExhausted | StatsError::Fetch(FetchError::RateLimited) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                StatsError::InvalidId(_)
                | StatsError::Fetch(
                    FetchError::Status(_) | FetchError::Unauthorized(_) | FetchError::Unsupported(_),
                ) => StatusCode::NOT_FOUND,
                StatsError::Fetch(FetchError::Transport(_) | FetchError::Decode(_)) => {
                    StatusCode::BAD_GATEWAY
                }
            };
            Err((status, Json(json!({"error": e.to_string(), "match_id": match_id}))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FixtureCache, QuotaTracker};
    use crate::live_scores::{SportApi7, StatusPolicy};
    use crate::refresh::RefreshSettings;
    use std::collections::HashSet;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(id: i64, code: i64, kind: &str) -> Value {
        json!({
            "id": id,
            "startTimestamp": 1716040800,
            "tournament": {"id": 1, "name": "Premier League", "category": {"name": "England"}},
            "homeTeam": {"id": id * 10, "name": format!("Home {id}")},
            "awayTeam": {"id": id * 10 + 1, "name": format!("Away {id}")},
            "homeScore": {"current": 1, "period1": 1},
            "awayScore": {"current": 0, "period1": 0},
            "status": {"code": code, "type": kind}
        })
    }

    async fn mock_provider() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/sport/football/events/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [event(1, 6, "inprogress"), event(2, 31, "inprogress")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api/v1/sport/football/scheduled-events/\d{4}-\d{2}-\d{2}$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [
                    event(2, 6, "inprogress"),
                    event(3, 0, "notstarted"),
                    event(4, 100, "finished")
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/event/1/statistics"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"statistics": [{"period": "ALL"}]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/event/99/statistics"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    fn engine_for(server: &MockServer, daily_limit: u32) -> Arc<RefreshEngine> {
        let provider = SportApi7::new(
            "test-key",
            Some(&server.uri()),
            "football",
            Duration::from_secs(5),
            StatusPolicy::default(),
        )
        .unwrap();
        Arc::new(RefreshEngine::new(
            Arc::new(provider),
            FixtureCache::new(),
            QuotaTracker::new(daily_limit, Utc::now()),
            RefreshSettings {
                cache_ttl: chrono::Duration::hours(3),
                request_delay: Duration::ZERO,
                fetch_yesterday: false,
                fetch_tomorrow: false,
            },
        ))
    }

    /// Serve the router on an ephemeral port and return its base URL.
    async fn serve(engine: Arc<RefreshEngine>) -> String {
        let state = AppState {
            engine,
            poll_intervals: PollIntervals {
                live: Duration::from_secs(600),
                idle: Duration::from_secs(3600),
            },
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn get(url: &str) -> reqwest::Response {
        reqwest::Client::new()
            .get(url)
            .header("Origin", "https://frontend.example")
            .send()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_scores_after_full_refresh_is_deduplicated_union() {
        let server = mock_provider().await;
        let engine = engine_for(&server, 450);
        assert_eq!(
            engine.refresh(Utc::now()).await,
            RefreshOutcome::FullRefresh { matches: 4 }
        );
        let base = serve(engine.clone()).await;

        let resp = get(&format!("{base}/scores")).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );

        let body: Value = resp.json().await.unwrap();
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 4);
        let ids: HashSet<i64> = data.iter().map(|m| m["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, HashSet::from([1, 2, 3, 4]));

        // Match 2 came from the live feed first, at half-time.
        let two = data.iter().find(|m| m["id"] == 2).unwrap();
        assert_eq!(two["status"], "halftime");
        assert_eq!(two["date"], "live");

        assert_eq!(body["count"], 4);
        assert_eq!(body["live"], 2);
        assert_eq!(body["finished"], 1);
        assert_eq!(body["upcoming"], 1);
        assert_eq!(body["quota"]["calls_used"], 2);
        assert_eq!(body["quota"]["calls_remaining"], 448);
        assert_eq!(body["cache"]["ttl_seconds"], 3 * 3600);

        // Fresh cache: serving it again does not touch the provider.
        let before = server.received_requests().await.unwrap().len();
        get(&format!("{base}/scores")).await;
        assert_eq!(server.received_requests().await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn test_scores_refreshes_stale_cache_inline() {
        let server = mock_provider().await;
        let base = serve(engine_for(&server, 450)).await;

        let body: Value = get(&format!("{base}/scores")).await.json().await.unwrap();
        assert_eq!(body["data"].as_array().unwrap().len(), 4);
        assert!(body["cache"]["last_fetched_at"].is_string());
    }

    #[tokio::test]
    async fn test_scores_serves_snapshot_when_quota_exhausted() {
        let server = mock_provider().await;
        let engine = engine_for(&server, 450);
        engine.quota().exhaust();
        let base = serve(engine).await;

        let resp = get(&format!("{base}/scores")).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert!(body["data"].as_array().unwrap().is_empty());
        assert_eq!(body["quota"]["calls_remaining"], 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_and_health() {
        let server = mock_provider().await;
        let engine = engine_for(&server, 450);
        engine.refresh(Utc::now()).await;
        let base = serve(engine).await;

        let resp = get(&format!("{base}/")).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "online");
        assert_eq!(body["version"], VERSION);

        let resp = get(&format!("{base}/health")).await;
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["api_provider"], "sportapi7.p.rapidapi.com");
        assert_eq!(body["quota"]["calls_today"], 2);
        assert_eq!(body["quota"]["quota_exhausted"], false);
        assert_eq!(body["matches"]["live"], 2);
        assert_eq!(body["matches"]["total_cached"], 4);
        assert_eq!(body["cache"]["poll_interval_live_seconds"], 600);
        assert_eq!(body["cache"]["poll_interval_idle_seconds"], 3600);
    }

    #[tokio::test]
    async fn test_stats_proxy_status_codes() {
        let server = mock_provider().await;
        let engine = engine_for(&server, 2);
        let base = serve(engine.clone()).await;

        let resp = get(&format!("{base}/stats/1")).await;
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["statistics"][0]["period"], "ALL");

        let resp = get(&format!("{base}/stats/99")).await;
        assert_eq!(resp.status(), 404);

        // Both calls used the whole budget of two.
        let resp = get(&format!("{base}/stats/1")).await;
        assert_eq!(resp.status(), 503);
        assert_eq!(engine.quota().snapshot().calls_used, 2);
    }

    #[tokio::test]
    async fn test_stats_rejects_path_traversal_id() {
        let server = mock_provider().await;
        let engine = engine_for(&server, 450);
        let base = serve(engine.clone()).await;

        let resp = get(&format!("{base}/stats/..%2Fsport%2Ffootball%2Fevents%2Flive%3F")).await;
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert!(body.get("events").is_none());

        let resp = get(&format!("{base}/stats/1%26x%3Dy")).await;
        assert_eq!(resp.status(), 404);

        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(engine.quota().snapshot().calls_used, 0);
    }
}
