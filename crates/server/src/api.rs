//! HTTP API for predictions, model listing, history, and observability

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use longevity_engine::{Engine, EngineError, PredictionRequest, PredictionStore};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<dyn PredictionStore>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, store: Arc<dyn PredictionStore>) -> Self {
        Self { engine, store }
    }
}

/// Pagination query parameters for the history listing
#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

/// Caller identity from the `x-user-id` header; absent or empty means
/// anonymous
fn user_id(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| "anonymous".to_string())
}

fn error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::ModelNotFound { .. } | EngineError::RecordNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        EngineError::FeatureValidation { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let warnings = match &error {
        EngineError::Prediction { warnings, .. } => warnings.clone(),
        _ => Vec::new(),
    };
    (
        status,
        Json(json!({"error": error.to_string(), "warnings": warnings})),
    )
        .into_response()
}

/// Run a prediction and persist it to the caller's history. A storage
/// failure is logged but never fails the prediction itself.
async fn predict(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PredictionRequest>,
) -> Response {
    let user = user_id(&headers);

    match state.engine.predict(&request).await {
        Ok(result) => {
            let saved_id = match state.store.save(&user, &result).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, user = %user, "Failed to persist prediction");
                    None
                }
            };
            (
                StatusCode::OK,
                Json(json!({"prediction": result, "saved_id": saved_id})),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Every loadable model in the catalog plus the current default
async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let models = state.engine.list_models().await;
    let default_model = state.engine.default_model().await;
    (
        StatusCode::OK,
        Json(json!({"models": models, "default_model": default_model})),
    )
        .into_response()
}

async fn list_predictions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(page): Query<PageParams>,
) -> Response {
    let user = user_id(&headers);
    match state.store.list(&user, page.offset, page.limit).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_prediction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    let user = user_id(&headers);
    match state.store.get(&user, id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_prediction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Response {
    let user = user_id(&headers);
    match state.store.delete(&user, id).await {
        Ok(()) => (StatusCode::OK, Json(json!({"deleted": id}))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn prediction_stats(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let user = user_id(&headers);
    match state.store.stats(&user).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Health check response - returns 200 whenever the process is serving
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let bundles = state.engine.bundle_count().await;
    (
        StatusCode::OK,
        Json(json!({"status": "healthy", "bundles": bundles})),
    )
}

/// Readiness check response - returns 200 once at least one bundle is
/// discovered, 503 otherwise
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let bundles = state.engine.bundle_count().await;
    let ready = bundles > 0;

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(json!({"ready": ready, "bundles": bundles})))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/models", get(list_models))
        .route("/api/v1/predictions", get(list_predictions))
        .route("/api/v1/predictions/stats", get(prediction_stats))
        .route(
            "/api/v1/predictions/:id",
            get(get_prediction).delete(delete_prediction),
        )
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
