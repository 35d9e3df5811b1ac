use axum::http::StatusCode;
use bach_core::config::BachConfig;
use bach_core::store::InMemoryTaskStore;
use bach_core::PluginRegistry;
use bach_server::state::AppState;
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PLACEMENT_REPORT: &str = r#"{
  "columns": ["customer_id", "campaign_id", "ad_group_id", "placement", "placement_type", "clicks"],
  "rows": [
    [1, 10, 100, "spam.example.com/page", "WEBSITE", 40],
    [1, 10, 100, "good.example.com", "WEBSITE", 2],
    [1, 10, 100, "mobileapp::2-com.game", "MOBILE_APPLICATION", 25]
  ]
}"#;

fn app_with_endpoint(endpoint: Option<String>) -> axum::Router {
    let config = BachConfig {
        report_endpoint: endpoint,
        ..Default::default()
    };
    let state = AppState::new(
        Arc::new(PluginRegistry::from_config(&config).unwrap()),
        Arc::new(InMemoryTaskStore::new()),
    );
    bach_server::build_router(state)
}

fn app() -> axum::Router {
    app_with_endpoint(None)
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn report_file(dir: &TempDir) -> String {
    let path = dir.path().join("report.json");
    std::fs::write(&path, PLACEMENT_REPORT).unwrap();
    path.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// Health / play
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_lists_plugins() {
    let (status, json) = send(app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["areas"], serde_json::json!(["keyword", "placement"]));
}

#[tokio::test]
async fn play_runs_the_area_pipeline() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/report")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "accounts": ["1234567890"]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(PLACEMENT_REPORT)
        .create_async()
        .await;

    let app = app_with_endpoint(Some(format!("{}/report", server.url())));
    let (status, json) = send(
        app,
        "POST",
        "/",
        Some(serde_json::json!({
            "area": "placement",
            "accounts": ["1234567890"],
            "rules": ["clicks > 10"],
            "area_parameters": {"exclusion_level": "CAMPAIGN"},
            "notify": ["log"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json, "success");
    mock.assert_async().await;
}

#[tokio::test]
async fn play_with_bad_rule_is_400() {
    let (status, json) = send(
        app(),
        "POST",
        "/",
        Some(serde_json::json!({
            "area": "placement",
            "accounts": ["1"],
            "rules": ["clicks >"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("syntax error"));
}

#[tokio::test]
async fn play_with_unknown_area_is_400() {
    let (status, json) = send(
        app(),
        "POST",
        "/",
        Some(serde_json::json!({"area": "video", "accounts": ["1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("unknown area 'video'"));
}

#[tokio::test]
async fn backend_failure_is_502() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/report")
        .with_status(503)
        .create_async()
        .await;
    let app = app_with_endpoint(Some(format!("{}/report", server.url())));
    let (status, _) = send(
        app,
        "POST",
        "/",
        Some(serde_json::json!({"area": "keyword", "accounts": ["1"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn task_lifecycle() {
    let dir = TempDir::new().unwrap();
    let app = app();
    let task = serde_json::json!({
        "name": "spammy placements",
        "query": {"area": "placement"},
        "accounts": ["1"],
        "rules": ["clicks > 10", "placement_type = WEBSITE"],
        "actor": {"name": "placement_exclusion"},
        "fetcher": {"name": "file", "params": {"path": report_file(&dir)}},
        "schedule": "0 6 * * 1"
    });

    let (status, created) = send(app.clone(), "POST", "/tasks", Some(task)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, list) = send(app.clone(), "GET", "/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, fetched) = send(app.clone(), "GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "spammy placements");
    assert_eq!(fetched["schedule"], "0 6 * * 1");

    let (status, run) = send(app.clone(), "POST", &format!("/tasks/{id}/run"), None).await;
    assert_eq!(status, StatusCode::OK, "{run}");
    assert_eq!(run["result"]["actor"], "placement_exclusion");
    assert_eq!(run["result"]["report"]["rows"].as_array().unwrap().len(), 1);
    assert_eq!(run["result"]["outcomes"][0]["status"], "applied");

    let (status, _) = send(app.clone(), "DELETE", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = send(app, "GET", &format!("/tasks/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("task not found"));
}

#[tokio::test]
async fn invalid_tasks_are_rejected() {
    let app = app();
    let (status, _) = send(
        app.clone(),
        "POST",
        "/tasks",
        Some(serde_json::json!({
            "name": "bad schedule",
            "query": {"raw": "SELECT 1"},
            "accounts": ["1"],
            "schedule": "daily"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        app,
        "POST",
        "/tasks",
        Some(serde_json::json!({
            "name": "bad actor",
            "query": {"area": "placement"},
            "accounts": ["1"],
            "actor": {"name": "nope"}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn binding_error_on_run_is_422() {
    let dir = TempDir::new().unwrap();
    let app = app();
    let (_, created) = send(
        app.clone(),
        "POST",
        "/tasks",
        Some(serde_json::json!({
            "name": "typo",
            "accounts": ["1"],
            "rules": ["clickz > 10"],
            "fetcher": {"name": "file", "params": {"path": report_file(&dir)}}
        })),
    )
    .await;
    let id = created["id"].as_str().unwrap();
    let (status, json) = send(app, "POST", &format!("/tasks/{id}/run"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().unwrap().contains("clickz"));
}

#[tokio::test]
async fn unknown_task_is_404() {
    let (status, _) = send(app(), "POST", "/tasks/does-not-exist/run", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
