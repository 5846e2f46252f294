//! Core data models for the longevity prediction engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Validation metrics recorded for a bundle's winning model at training time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BestModelInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub test_rmse: Option<f64>,
    #[serde(default)]
    pub test_r2: Option<f64>,
}

/// Metadata record shipped beside a model artifact
///
/// Only the fields the engine consumes are modeled; unknown fields in the
/// JSON file are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered feature list used at training time
    #[serde(default)]
    pub features_used: Vec<String>,
    #[serde(default)]
    pub categorical_features: Vec<String>,
    #[serde(default)]
    pub numerical_features: Vec<String>,
    #[serde(default)]
    pub best_model: Option<BestModelInfo>,
    /// Sequence length for recurrent bundles
    #[serde(default)]
    pub lookback: Option<usize>,
}

impl ModelMetadata {
    /// A bundle is only usable for prediction when its metadata declares the
    /// feature schema.
    pub fn has_features(&self) -> bool {
        !self.features_used.is_empty()
    }

    pub fn is_categorical(&self, feature: &str) -> bool {
        self.categorical_features.iter().any(|f| f == feature)
    }
}

/// Inbound prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub app_name: String,
    /// Raw feature map; values are coerced and defaulted by the engine
    pub features: HashMap<String, serde_json::Value>,
    /// Explicit model name; the catalog default is used when absent
    #[serde(default)]
    pub model_name: Option<String>,
    /// Carried through to the result and storage; the comparison itself
    /// depends on an external app-data source
    #[serde(default)]
    pub compare_competitors: bool,
}

/// One base model's contribution to a combined prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasePrediction {
    /// Stacking role token (rf, xgb, nn, lstm)
    pub role: String,
    /// Bundle name that produced this value
    pub model: String,
    /// Raw log-space output fed to the meta-model
    pub log_days: f64,
    /// The same output clipped and inverse-transformed to days
    pub days: f64,
}

/// Interpretation band for a predicted lifespan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongevityInterpretation {
    pub category: String,
    pub description: String,
    pub expected_lifespan: String,
    pub success_probability: String,
}

/// A submitted feature ranked by its stored importance weight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub feature: String,
    pub value: serde_json::Value,
    pub importance: f64,
    pub impact: String,
}

/// Rule-based advice derived from the submitted features
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub area: String,
    pub issue: String,
    pub recommendation: String,
}

/// Prediction output returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub app_name: String,
    pub model_used: String,
    pub predicted_longevity_days: f64,
    pub predicted_longevity_months: f64,
    pub predicted_longevity_years: f64,
    /// One entry per defaulted feature, in declared feature order
    pub warnings: Vec<String>,
    /// Present only for combined-model predictions, in stacking order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_predictions: Option<Vec<BasePrediction>>,
    pub interpretation: LongevityInterpretation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributing_factors: Option<Vec<ContributingFactor>>,
    pub recommendations: Vec<Recommendation>,
    pub compare_competitors: bool,
    pub analyzed_at: DateTime<Utc>,
}

/// Catalog row advertised to callers choosing a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stacking role token when the bundle name carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_metrics: Option<BestModelInfo>,
    pub is_default: bool,
}

/// A saved prediction, scoped to the user who requested it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: u64,
    pub user_id: String,
    pub app_name: String,
    pub model_used: String,
    pub predicted_longevity_days: f64,
    pub created_at: DateTime<Utc>,
    pub result: PredictionResult,
}

/// Aggregate numbers over a user's saved predictions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: u64,
    pub last_30_days: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_days: Option<f64>,
}
