//! Observability infrastructure for the prediction engine
//!
//! Provides:
//! - Prometheus metrics (prediction latency, model load time, per-model counters)
//! - Structured JSON logging helpers for significant engine events

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for per-request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for artifact loads, which include ONNX graph optimization
const LOAD_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct EngineMetricsInner {
    prediction_latency_seconds: Histogram,
    model_load_seconds: Histogram,
    predictions_total: IntCounterVec,
    prediction_errors_total: IntCounter,
    model_load_errors_total: IntCounter,
    bundles_loaded: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "longevity_engine_prediction_latency_seconds",
                "Time spent serving one prediction request end to end",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            model_load_seconds: register_histogram!(
                "longevity_engine_model_load_seconds",
                "Time spent loading and parsing one model bundle",
                LOAD_BUCKETS.to_vec()
            )
            .expect("Failed to register model_load_seconds"),

            predictions_total: register_int_counter_vec!(
                "longevity_engine_predictions_total",
                "Total predictions served, labeled by model name",
                &["model"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter!(
                "longevity_engine_prediction_errors_total",
                "Total prediction requests that failed"
            )
            .expect("Failed to register prediction_errors_total"),

            model_load_errors_total: register_int_counter!(
                "longevity_engine_model_load_errors_total",
                "Total bundle load attempts that failed"
            )
            .expect("Failed to register model_load_errors_total"),

            bundles_loaded: register_int_gauge!(
                "longevity_engine_bundles_loaded",
                "Number of model bundles currently loaded in the cache"
            )
            .expect("Failed to register bundles_loaded"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record one prediction request latency observation
    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Record one bundle load duration observation
    pub fn observe_model_load(&self, duration_secs: f64) {
        self.inner().model_load_seconds.observe(duration_secs);
    }

    /// Count a served prediction against the model that produced it
    pub fn inc_predictions(&self, model: &str) {
        self.inner().predictions_total.with_label_values(&[model]).inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors_total.inc();
    }

    pub fn inc_model_load_errors(&self) {
        self.inner().model_load_errors_total.inc();
    }

    /// Update the count of bundles resident in the cache
    pub fn set_bundles_loaded(&self, count: i64) {
        self.inner().bundles_loaded.set(count);
    }
}

/// Structured logger for engine events
///
/// Provides consistent JSON-formatted logging for predictions and
/// lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log a served prediction
    pub fn log_prediction(
        &self,
        app_name: &str,
        model: &str,
        predicted_days: f64,
        warning_count: usize,
    ) {
        info!(
            event = "prediction_generated",
            service = %self.service,
            app_name = %app_name,
            model = %model,
            predicted_days = predicted_days,
            warning_count = warning_count,
            "Generated longevity prediction"
        );
    }

    /// Log a failed prediction request
    pub fn log_prediction_failed(&self, app_name: &str, error: &str) {
        warn!(
            event = "prediction_failed",
            service = %self.service,
            app_name = %app_name,
            error = %error,
            "Prediction request failed"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, bundles: usize, default_model: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            bundles = bundles,
            default_model = %default_model,
            "Longevity prediction service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Longevity prediction service shutting down"
        );
    }
}
