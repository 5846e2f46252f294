//! Integration tests for the server API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use longevity_engine::{Engine, MemoryStore};
use longevity_server::api::{create_router, AppState};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn write_bundle(dir: &Path, name: &str, log_days: f64) {
    let model = json!({
        "kind": "tree_ensemble",
        "trees": [{"nodes": [{"type": "leaf", "value": log_days}]}]
    });
    fs::write(dir.join(format!("{name}.json")), model.to_string()).unwrap();

    let metadata = json!({
        "features_used": ["rating"],
        "numerical_features": ["rating"],
    });
    fs::write(
        dir.join(format!("{name}_metadata.json")),
        metadata.to_string(),
    )
    .unwrap();
}

fn setup_test_app(dir: &Path) -> Router {
    let engine = Arc::new(Engine::discover(vec![dir.to_path_buf()], None));
    let state = Arc::new(AppState::new(engine, Arc::new(MemoryStore::new())));
    create_router(state)
}

fn predict_request(user: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/predict")
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(user: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_healthz_returns_ok() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let response = app
        .oneshot(get_request("anonymous", "/healthz"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_readyz_ready_once_bundles_discovered() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let response = app
        .oneshot(get_request("anonymous", "/readyz"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let readiness = body_json(response).await;
    assert_eq!(readiness["ready"], true);
    assert_eq!(readiness["bundles"], 1);
}

#[tokio::test]
async fn test_readyz_unavailable_with_empty_catalog() {
    let dir = TempDir::new().unwrap();
    let app = setup_test_app(dir.path());

    let response = app
        .oneshot(get_request("anonymous", "/readyz"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_list_models_reports_default() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let response = app
        .oneshot(get_request("anonymous", "/api/v1/models"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["default_model"], "rf_model");
    assert_eq!(body["models"].as_array().unwrap().len(), 1);
    assert_eq!(body["models"][0]["name"], "rf_model");
    assert_eq!(body["models"][0]["is_default"], true);
}

#[tokio::test]
async fn test_predict_returns_conversions_and_saves_history() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let request_body = json!({
        "app_name": "Study Planner",
        "features": {"rating": 4.5},
    });
    let response = app
        .clone()
        .oneshot(predict_request("tester", request_body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["saved_id"], 1);

    let prediction = &body["prediction"];
    let days = prediction["predicted_longevity_days"].as_f64().unwrap();
    let months = prediction["predicted_longevity_months"].as_f64().unwrap();
    assert!((days - 500.0).abs() < 1e-6);
    assert!((months - days / 30.44).abs() < 1e-9);
    assert_eq!(prediction["model_used"], "rf_model");
    assert_eq!(prediction["warnings"].as_array().unwrap().len(), 0);
    assert_eq!(prediction["interpretation"]["category"], "Average");

    let response = app
        .oneshot(get_request("tester", "/api/v1/predictions"))
        .await
        .unwrap();
    let history = body_json(response).await;
    let records = history.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["id"], 1);
    assert_eq!(records[0]["app_name"], "Study Planner");
}

#[tokio::test]
async fn test_predict_unknown_model_is_not_found() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let request_body = json!({
        "app_name": "Study Planner",
        "features": {"rating": 4.5},
        "model_name": "mystery_model",
    });
    let response = app
        .oneshot(predict_request("tester", request_body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("mystery_model"));
}

#[tokio::test]
async fn test_history_scoped_per_user() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let request_body = json!({
        "app_name": "Study Planner",
        "features": {"rating": 4.5},
    });
    app.clone()
        .oneshot(predict_request("alice", request_body))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("bob", "/api/v1/predictions"))
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_get_then_delete_prediction() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let request_body = json!({
        "app_name": "Study Planner",
        "features": {"rating": 4.5},
    });
    app.clone()
        .oneshot(predict_request("tester", request_body))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get_request("tester", "/api/v1/predictions/1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = body_json(response).await;
    assert_eq!(record["id"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/v1/predictions/1")
                .header("x-user-id", "tester")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("tester", "/api/v1/predictions/1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_aggregate_saved_predictions() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let request_body = json!({
        "app_name": "Study Planner",
        "features": {"rating": 4.5},
    });
    for _ in 0..2 {
        app.clone()
            .oneshot(predict_request("tester", request_body.clone()))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(get_request("tester", "/api/v1/predictions/stats"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["last_30_days"], 2);
    assert!((stats["average_days"].as_f64().unwrap() - 500.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_engine_families() {
    let dir = TempDir::new().unwrap();
    write_bundle(dir.path(), "rf_model", 500.0f64.ln_1p());
    let app = setup_test_app(dir.path());

    let request_body = json!({
        "app_name": "Study Planner",
        "features": {"rating": 4.5},
    });
    app.clone()
        .oneshot(predict_request("tester", request_body))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("anonymous", "/metrics"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("longevity_engine_predictions_total"));
    assert!(text.contains("longevity_engine_prediction_latency_seconds"));
}
