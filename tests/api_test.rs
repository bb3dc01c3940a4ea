use axum::http::StatusCode;
use shieldsim::api::{self, AppState};
use shieldsim::config::{Config, EngineMode};
use shieldsim::db::init_db;
use shieldsim::engine::{GateConfig, GateMode, HedgeConfig, RunnerConfig};
use shieldsim::orchestration::ConfigScope;
use shieldsim::{DecisionRegistry, Orchestrator, Repository};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");

    let config = Config {
        port: 0,
        database_path: db_path,
        engine_mode: EngineMode::Mock,
        engine_api_url: None,
        gate: GateConfig {
            mode: GateMode::Strict,
            block_bear_buys: true,
            ..GateConfig::default()
        },
        runner: RunnerConfig::default(),
        hedge: HedgeConfig::default(),
    };
    let orchestrator = Arc::new(Orchestrator::new(
        DecisionRegistry::with_builtins(),
        ConfigScope::new(),
    ));
    let state = AppState::new(Arc::new(Repository::new(pool)), config, orchestrator);

    TestApp {
        app: api::create_router(state),
        _temp: temp_dir,
    }
}

async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, axum::body::Bytes) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body)
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

fn rally_csv(n: usize) -> String {
    let mut csv = String::from("date,BTC\n");
    for i in 0..n {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64);
        csv.push_str(&format!("{},{}\n", day.format("%Y-%m-%d"), 100 + (i % 9) * 4 + i));
    }
    csv
}

#[tokio::test]
async fn test_health_and_ready() {
    let t = setup_test_app().await;

    let (status, body) = request(t.app.clone(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["status"], "ok");
    assert_eq!(v["engine_mode"], "MOCK");
    assert_eq!(v["sources"], serde_json::json!(["momentum", "rsi"]));

    let (status, body) = request(t.app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ready");
}

#[tokio::test]
async fn test_signal_uses_momentum_in_mock_mode() {
    let t = setup_test_app().await;
    let (status, body) = request(
        t.app,
        "POST",
        "/v1/signal",
        Some(serde_json::json!({"asset": "BTC", "prices": [100, 103, 106]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["path"], "live");
    assert_eq!(v["action"], "BUY");
    assert_eq!(v["regime"], "BULL");
}

#[tokio::test]
async fn test_signal_rejects_unknown_source_and_empty_prices() {
    let t = setup_test_app().await;
    let (status, body) = request(
        t.app.clone(),
        "POST",
        "/v1/signal",
        Some(serde_json::json!({"asset": "BTC", "prices": [1, 2], "source": "oracle"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().contains("oracle"));

    let (status, _) = request(
        t.app,
        "POST",
        "/v1/signal",
        Some(serde_json::json!({"asset": "BTC", "prices": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_filter_uses_server_gate_by_default() {
    let t = setup_test_app().await;
    let (status, body) = request(
        t.app.clone(),
        "POST",
        "/v1/filter",
        Some(serde_json::json!({"action": "BUY", "regime": "BEAR", "confidence": 0.8})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["allowed"], false);
    assert_eq!(v["reason"], "REGIME_BLOCK");
    assert_eq!(v["rail"], "regime");

    let (_, body) = request(
        t.app,
        "POST",
        "/v1/filter",
        Some(serde_json::json!({
            "action": "SELL",
            "regime": "BULL",
            "confidence": 0.8,
            "metrics": {"max_drawdown": -0.2, "equity": 80000, "total_trades": 3}
        })),
    )
    .await;
    let v = json(&body);
    assert_eq!(v["reason"], "DRAWDOWN_BREACH");
    assert_eq!(v["rail"], "drawdown");
}

#[tokio::test]
async fn test_regime_endpoint() {
    let t = setup_test_app().await;
    let prices: Vec<f64> = (0..30).map(|i| 100.0 * 1.01f64.powi(i)).collect();
    let (status, body) = request(
        t.app.clone(),
        "POST",
        "/v1/regime",
        Some(serde_json::json!({ "prices": prices })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["regime"], "STRONG_BULL");
    assert!(v["features"]["trend"].as_f64().unwrap() > 0.15);

    let (_, body) = request(
        t.app,
        "POST",
        "/v1/regime",
        Some(serde_json::json!({"prices": [100, 101]})),
    )
    .await;
    let v = json(&body);
    assert_eq!(v["regime"], "SIDEWAYS_LOW_VOL");
    assert!(v["features"].is_null());
}

#[tokio::test]
async fn test_scenario_run_is_stored_and_readable() {
    let t = setup_test_app().await;
    let (status, body) = request(
        t.app.clone(),
        "POST",
        "/v1/scenarios",
        Some(serde_json::json!({
            "datasets": [{"name": "wiggle", "csv": rally_csv(45)}],
            "plan": {"gates": ["balanced", "aggressive"], "include_hedge": true}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    let run_id = v["run_id"].as_str().unwrap().to_string();
    assert_eq!(v["report"]["datasets"][0]["treatments"].as_array().unwrap().len(), 2);

    let (status, body) = request(
        t.app.clone(),
        "GET",
        &format!("/v1/scenarios/{}", run_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["source"], "momentum");

    let (status, body) = request(
        t.app.clone(),
        "GET",
        &format!("/v1/scenarios/{}/rows", run_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<String> = json(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["scenario_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["baseline", "balanced", "aggressive", "hedge_v1"]);

    let (status, body) = request(
        t.app.clone(),
        "GET",
        &format!("/v1/scenarios/{}/report", run_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body.to_vec())
        .unwrap()
        .starts_with("# Scenario report"));

    let (status, body) = request(
        t.app.clone(),
        "GET",
        &format!("/v1/scenarios/{}/blocks.csv", run_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let csv = String::from_utf8(body.to_vec()).unwrap();
    let blocked: u64 = v["report"]["datasets"][0]["treatments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["block_events"].as_array().unwrap().len() as u64)
        .sum();
    let data_lines = csv.lines().filter(|l| !l.starts_with("dataset,")).count() as u64;
    assert_eq!(data_lines, blocked);

    let (status, body) = request(t.app, "GET", "/v1/scenarios", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)[0]["run_id"], run_id.as_str());
}

#[tokio::test]
async fn test_stress_suite_endpoint() {
    let t = setup_test_app().await;
    let (status, body) = request(t.app.clone(), "GET", "/v1/stress", None).await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    let names: Vec<&str> = v
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["crash", "health_failure", "bear_regime"]);
    assert!(v.as_array().unwrap().iter().all(|r| r["passed"] == true));

    let (status, _) = request(t.app.clone(), "GET", "/v1/stress?source=oracle", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(t.app, "GET", "/v1/scenarios/missing/blocks.csv", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scenario_errors() {
    let t = setup_test_app().await;

    let (status, _) = request(t.app.clone(), "GET", "/v1/scenarios/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = request(
        t.app.clone(),
        "POST",
        "/v1/scenarios",
        Some(serde_json::json!({
            "datasets": [{"name": "bad", "csv": "timestamp,BTC\n1,100\n2,-5\n"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].is_string());

    let (status, _) = request(
        t.app.clone(),
        "POST",
        "/v1/scenarios",
        Some(serde_json::json!({
            "datasets": [{"name": "ok", "csv": rally_csv(20)}],
            "plan": {"gates": ["reckless"]}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(t.app, "GET", "/v1/scenarios?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
