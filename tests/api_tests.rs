mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use cryptomarkets::api::router::create_router;
use cryptomarkets::config::{AppConfig, LogFormat};
use cryptomarkets::db::MarketStore;
use cryptomarkets::services::HealthMonitor;
use cryptomarkets::AppState;

use common::{build_pipeline, mixed_page, StubSource, TestPipeline};

fn test_config(api_token: Option<&str>) -> AppConfig {
    AppConfig {
        database_url: None,
        host: "127.0.0.1".into(),
        port: 0,
        gamma_api_url: "http://localhost:0".into(),
        fetch_page_size: 100,
        fetch_timeout_secs: 1,
        fetch_max_retries: 3,
        retry_base_delay_ms: 1,
        poll_interval_secs: 900,
        run_log_path: "logs/test_runs.log".into(),
        status_export_path: "logs/test_status.json".into(),
        recent_issue_limit: 5,
        log_format: LogFormat::Pretty,
        api_token: api_token.map(String::from),
    }
}

fn build_test_app(source: StubSource, api_token: Option<&str>) -> (axum::Router, TestPipeline) {
    let t = build_pipeline(source);
    let monitor = HealthMonitor::new(t.store.clone(), t.run_log.clone());

    let state = AppState {
        store: t.store.clone(),
        pipeline: t.pipeline.clone(),
        monitor,
        config: test_config(api_token),
        metrics_handle: None,
    };

    (create_router(state), t)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn run_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/api/pipeline/run");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = build_test_app(StubSource::always(mixed_page()), None);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_status_matches_monitor() {
    let (app, t) = build_test_app(StubSource::always(mixed_page()), None);
    t.pipeline.run_cycle().await;

    let response = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["market_stats"]["total"], 2);
    assert_eq!(json["market_stats"]["active"], 2);
    assert_eq!(json["data_freshness"]["status"], "FRESH");
    assert_eq!(json["status"], "RUNNING_NORMALLY");
    assert_eq!(json["pipeline_performance"]["success_rate"], "100.0%");
}

#[tokio::test]
async fn test_status_text_is_plain_report() {
    let (app, _) = build_test_app(StubSource::always(mixed_page()), None);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/status/text")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("DATA PIPELINE MONITOR"));
    assert!(text.contains("No data updates yet"));
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let (app, _) = build_test_app(StubSource::always(mixed_page()), None);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_run_cycle_open_without_token() {
    let (app, t) = build_test_app(StubSource::always(mixed_page()), None);

    let response = app.oneshot(run_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["stored"], 2);
    assert_eq!(t.store.snapshot().unwrap().len(), 2);
}

#[tokio::test]
async fn test_run_cycle_failure_is_bad_gateway() {
    let (app, _) = build_test_app(StubSource::always(Vec::new()), None);

    let response = app.oneshot(run_request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["status"], "failed");
    assert!(json["error"].as_str().unwrap().contains("no markets"));
}

#[tokio::test]
async fn test_run_cycle_requires_token_when_configured() {
    let (app, t) = build_test_app(StubSource::always(mixed_page()), Some("s3cret"));

    let missing = app.clone().oneshot(run_request(None)).await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app.clone().oneshot(run_request(Some("nope"))).await.unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(t.source.call_count(), 0);

    let ok = app.oneshot(run_request(Some("s3cret"))).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(t.source.call_count(), 1);
}

#[tokio::test]
async fn test_read_routes_stay_open_with_token() {
    let (app, _) = build_test_app(StubSource::always(mixed_page()), Some("s3cret"));

    let response = app
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_store_is_shared_with_pipeline() {
    let (_, t) = build_test_app(StubSource::always(mixed_page()), None);
    let store: Arc<dyn cryptomarkets::db::MarketStore> = t.pipeline.store().clone();

    t.pipeline.run_cycle().await;

    assert_eq!(store.stats().await.unwrap().total, 2);
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_markets_list_and_filter() {
    let (app, t) = build_test_app(StubSource::always(mixed_page()), None);
    t.pipeline.run_cycle().await;
    let mut closed = t.store.find_by_key("1002").await.unwrap().unwrap();
    closed.active = false;
    t.store.insert_record(closed).unwrap();

    let response = app.clone().oneshot(get("/markets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    let ids: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["market_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["1001", "1002"]);
    assert_eq!(json["data"][0]["liquidity"], "3200.5");

    let json = body_json(app.clone().oneshot(get("/markets?active_only=true")).await.unwrap()).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["market_id"], "1001");

    let json = body_json(app.oneshot(get("/markets?limit=1")).await.unwrap()).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_market_detail_includes_price_history() {
    let (app, t) = build_test_app(StubSource::always(mixed_page()), None);
    let first = t.pipeline.run_cycle().await;
    let second = t.pipeline.run_cycle().await;

    let response = app.oneshot(get("/markets/1001")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["market"]["market_id"], "1001");
    let history = json["data"]["price_history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["yes_price"], "0.62");

    let newest: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(history[0]["recorded_at"].clone()).unwrap();
    let oldest: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(history[1]["recorded_at"].clone()).unwrap();
    assert_eq!(newest, second.run_at);
    assert_eq!(oldest, first.run_at);
}

#[tokio::test]
async fn test_unknown_market_is_not_found() {
    let (app, _) = build_test_app(StubSource::always(mixed_page()), None);

    let response = app.oneshot(get("/markets/does-not-exist")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
