//! Prediction orchestration
//!
//! The [`Engine`] ties the pieces together: resolve the requested model (or
//! the catalog default), default-and-warn the raw features once, fan out to
//! every base model for the combined path, and apply the shared numeric
//! contract to whatever raw value comes back. Catalog and cache live in an
//! immutable snapshot swapped atomically on refresh, so in-flight requests
//! always see one consistent generation.

use crate::artifact::{ArtifactLoader, FsLoader, LoadedBundle, ModelCache, ModelInput};
use crate::catalog::{Catalog, EnsembleRole};
use crate::ensemble::{self, STACKING_ORDER};
use crate::error::{EngineError, Result};
use crate::insights;
use crate::models::{BasePrediction, ModelSummary, PredictionRequest, PredictionResult};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::preprocess::{self, DefaultedRow};
use crate::sequence::SequenceSynthesizer;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::info;

/// One immutable generation of catalog plus loaded-model cache
struct EngineState {
    catalog: Catalog,
    cache: ModelCache,
    generation: u64,
}

/// The prediction engine
pub struct Engine {
    state: RwLock<Arc<EngineState>>,
    loader: Arc<dyn ArtifactLoader>,
    search_paths: Vec<PathBuf>,
    default_override: Option<String>,
    sequence_seed: Option<u64>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl Engine {
    /// Discover bundles from the search paths using the filesystem loader
    pub fn discover(search_paths: Vec<PathBuf>, default_override: Option<String>) -> Self {
        Self::with_loader(Arc::new(FsLoader), search_paths, default_override)
    }

    /// Discover bundles with a custom artifact loader
    pub fn with_loader(
        loader: Arc<dyn ArtifactLoader>,
        search_paths: Vec<PathBuf>,
        default_override: Option<String>,
    ) -> Self {
        let metrics = EngineMetrics::new();
        let catalog = Catalog::discover(&search_paths, default_override.as_deref());
        let state = EngineState {
            catalog,
            cache: ModelCache::new(Arc::clone(&loader), metrics.clone()),
            generation: 1,
        };
        Self {
            state: RwLock::new(Arc::new(state)),
            loader,
            search_paths,
            default_override,
            sequence_seed: None,
            metrics,
            logger: StructuredLogger::new("longevity-engine"),
        }
    }

    /// Fix the synthetic-history noise seed, for reproducible recurrent
    /// predictions
    pub fn with_sequence_seed(mut self, seed: u64) -> Self {
        self.sequence_seed = Some(seed);
        self
    }

    async fn snapshot(&self) -> Arc<EngineState> {
        Arc::clone(&*self.state.read().await)
    }

    /// Rescan the search paths and swap in a fresh catalog and an empty
    /// cache. In-flight requests keep the generation they started with.
    pub async fn refresh(&self) -> usize {
        let catalog = Catalog::discover(&self.search_paths, self.default_override.as_deref());
        let bundles = catalog.len();

        let mut state = self.state.write().await;
        let generation = state.generation + 1;
        *state = Arc::new(EngineState {
            catalog,
            cache: ModelCache::new(Arc::clone(&self.loader), self.metrics.clone()),
            generation,
        });
        self.metrics.set_bundles_loaded(0);
        info!(generation, bundles, "Model catalog refreshed");
        bundles
    }

    /// Number of bundles in the current catalog
    pub async fn bundle_count(&self) -> usize {
        self.snapshot().await.catalog.len()
    }

    /// Name of the current default model
    pub async fn default_model(&self) -> Option<String> {
        self.snapshot()
            .await
            .catalog
            .default_model()
            .map(String::from)
    }

    /// Advertised models: every discovered bundle except those whose load
    /// already failed this generation
    pub async fn list_models(&self) -> Vec<ModelSummary> {
        let state = self.snapshot().await;
        let failed = state.cache.failed_names();
        state
            .catalog
            .summaries()
            .into_iter()
            .filter(|s| !failed.contains(&s.name))
            .collect()
    }

    /// Serve one prediction request
    pub async fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        let start = Instant::now();
        let state = self.snapshot().await;
        let result = self.predict_inner(&state, request).await;

        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        match &result {
            Ok(r) => {
                self.metrics.inc_predictions(&r.model_used);
                self.logger.log_prediction(
                    &r.app_name,
                    &r.model_used,
                    r.predicted_longevity_days,
                    r.warnings.len(),
                );
            }
            Err(e) => {
                self.metrics.inc_prediction_errors();
                self.logger
                    .log_prediction_failed(&request.app_name, &e.to_string());
            }
        }
        result
    }

    async fn predict_inner(
        &self,
        state: &EngineState,
        request: &PredictionRequest,
    ) -> Result<PredictionResult> {
        let name = match request.model_name.as_deref() {
            Some(name) => name,
            None => state
                .catalog
                .default_model()
                .ok_or_else(|| EngineError::ModelNotFound {
                    name: "default".to_string(),
                })?,
        };
        let handle = state.catalog.resolve(name)?;
        let bundle = state.cache.get_or_load(handle).await?;

        let (row, warnings) = preprocess::prepare(&request.features, &handle.metadata);

        let (log_days, base_predictions) = if handle.role == Some(EnsembleRole::Meta) {
            let meta = bundle.model.as_linear().ok_or_else(|| EngineError::Prediction {
                reason: format!("combined model '{name}' is not a linear meta-model"),
                warnings: warnings.clone(),
            })?;
            let (stacked, bases) = self.predict_bases(state, &row, &warnings).await?;
            let raw =
                ensemble::combine(&stacked, meta).map_err(|e| with_warnings(e, &warnings))?;
            (raw, Some(bases))
        } else {
            let raw = self
                .run_bundle(&bundle, &row)
                .map_err(|e| with_warnings(e, &warnings))?;
            (raw, None)
        };

        if !log_days.is_finite() {
            return Err(EngineError::Prediction {
                reason: format!("model '{name}' produced a non-finite value"),
                warnings,
            });
        }

        let estimate = ensemble::finalize(log_days);
        let values = row.values();
        let interpretation = insights::interpret(estimate.days);
        let contributing_factors =
            insights::contributing_factors(bundle.importances.as_ref(), &values);
        let recommendations = insights::recommendations(&values);

        Ok(PredictionResult {
            app_name: request.app_name.clone(),
            model_used: bundle.name.clone(),
            predicted_longevity_days: estimate.days,
            predicted_longevity_months: estimate.months,
            predicted_longevity_years: estimate.years,
            warnings,
            base_predictions,
            interpretation,
            contributing_factors,
            recommendations,
            compare_competitors: request.compare_competitors,
            analyzed_at: Utc::now(),
        })
    }

    /// Run every base model in stacking order over the same defaulted row.
    /// Any missing or failing base is fatal for the request: the meta-model
    /// was fit on a fixed arity, so a partial ensemble is incorrect.
    async fn predict_bases(
        &self,
        state: &EngineState,
        row: &DefaultedRow,
        warnings: &[String],
    ) -> Result<(Vec<f64>, Vec<BasePrediction>)> {
        let mut stacked = Vec::with_capacity(STACKING_ORDER.len());
        let mut bases = Vec::with_capacity(STACKING_ORDER.len());

        for role in STACKING_ORDER {
            let handle = state.catalog.bundle_for_role(role).ok_or_else(|| {
                EngineError::Prediction {
                    reason: format!(
                        "combined model requires a '{}' base model in the catalog",
                        role.token()
                    ),
                    warnings: warnings.to_vec(),
                }
            })?;
            let bundle = state.cache.get_or_load(handle).await.map_err(|e| {
                EngineError::Prediction {
                    reason: format!("base model '{}' failed to load: {}", handle.name, reason_of(e)),
                    warnings: warnings.to_vec(),
                }
            })?;
            let raw = self.run_bundle(&bundle, row).map_err(|e| EngineError::Prediction {
                reason: format!("base model '{}' failed: {}", handle.name, reason_of(e)),
                warnings: warnings.to_vec(),
            })?;
            if !raw.is_finite() {
                return Err(EngineError::Prediction {
                    reason: format!("base model '{}' produced a non-finite value", handle.name),
                    warnings: warnings.to_vec(),
                });
            }

            bases.push(BasePrediction {
                role: role.token().to_string(),
                model: handle.name.clone(),
                log_days: raw,
                days: ensemble::finalize(raw).days,
            });
            stacked.push(raw);
        }

        Ok((stacked, bases))
    }

    /// Transform the row with the bundle's stored preprocessing and run its
    /// model, synthesizing history windows for recurrent bundles
    fn run_bundle(&self, bundle: &LoadedBundle, row: &DefaultedRow) -> Result<f64> {
        let matrix = bundle.transform(row)?;
        let input = if bundle.model.needs_windows() {
            let synthesizer = match self.sequence_seed {
                Some(seed) => SequenceSynthesizer::new(bundle.lookback).with_seed(seed),
                None => SequenceSynthesizer::new(bundle.lookback),
            };
            ModelInput::Windows(synthesizer.synthesize(&matrix))
        } else {
            ModelInput::Matrix(matrix)
        };
        let outputs = bundle.model.predict(&input)?;
        outputs.first().copied().ok_or_else(|| {
            EngineError::prediction(format!("model '{}' returned no output", bundle.name))
        })
    }
}

/// Attach the request's validation warnings to a prediction failure so
/// callers still see what was defaulted
fn with_warnings(error: EngineError, warnings: &[String]) -> EngineError {
    match error {
        EngineError::Prediction {
            reason,
            warnings: existing,
        } if existing.is_empty() => EngineError::Prediction {
            reason,
            warnings: warnings.to_vec(),
        },
        other => other,
    }
}

fn reason_of(error: EngineError) -> String {
    match error {
        EngineError::Prediction { reason, .. } => reason,
        EngineError::IncompleteArtifact { reason, .. } => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::{DAYS_PER_MONTH, MAX_LONGEVITY_DAYS};
    use serde_json::json;
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const FULL_FEATURES: &[&str] = &[
        "rating",
        "size_mb",
        "log_installs",
        "log_reviews",
        "price_numeric",
        "is_free",
        "has_iap",
        "days_since_update",
        "app_age_days",
        "is_mature",
        "developer_apps_count",
        "avg_sentiment",
        "category",
    ];

    fn write_model(dir: &Path, name: &str, model: serde_json::Value, features: &[&str]) {
        fs::write(dir.join(format!("{name}.json")), model.to_string()).unwrap();
        let metadata = json!({
            "features_used": features,
            "categorical_features": features.iter().filter(|f| **f == "category").collect::<Vec<_>>(),
            "numerical_features": features.iter().filter(|f| **f != "category").collect::<Vec<_>>(),
        });
        fs::write(
            dir.join(format!("{name}_metadata.json")),
            metadata.to_string(),
        )
        .unwrap();
    }

    fn leaf_model(value: f64) -> serde_json::Value {
        json!({
            "kind": "tree_ensemble",
            "trees": [{"nodes": [{"type": "leaf", "value": value}]}]
        })
    }

    fn linear_model(coefficients: Vec<f64>, intercept: f64) -> serde_json::Value {
        json!({
            "kind": "linear",
            "coefficients": coefficients,
            "intercept": intercept,
        })
    }

    fn full_request() -> PredictionRequest {
        let features = json!({
            "rating": 4.5,
            "size_mb": 25,
            "log_installs": (1_000_000.0f64).ln_1p(),
            "log_reviews": (5_000.0f64).ln_1p(),
            "price_numeric": 0.0,
            "is_free": 1,
            "has_iap": 1,
            "days_since_update": 30,
            "app_age_days": 365,
            "is_mature": 0,
            "developer_apps_count": 5,
            "avg_sentiment": 4.2,
            "category": "Education",
        });
        PredictionRequest {
            app_name: "Study Planner".to_string(),
            features: serde_json::from_value(features).unwrap(),
            model_name: None,
            compare_competitors: false,
        }
    }

    fn request_for(model: &str, features: serde_json::Value) -> PredictionRequest {
        PredictionRequest {
            app_name: "Test App".to_string(),
            features: serde_json::from_value(features).unwrap(),
            model_name: Some(model.to_string()),
            compare_competitors: false,
        }
    }

    fn ensemble_fixture(dir: &Path) {
        write_model(dir, "rf_model", leaf_model(2.0), &["rating"]);
        write_model(
            dir,
            "xgb_model",
            json!({"kind": "gradient_boosting", "base_score": 3.0, "learning_rate": 0.1, "trees": []}),
            &["rating"],
        );
        write_model(dir, "nn_model", linear_model(vec![0.0], 4.0), &["rating"]);
        write_model(dir, "lstm_model", linear_model(vec![0.0], 5.0), &["rating"]);
        write_model(
            dir,
            "ensemble_model",
            linear_model(vec![0.05, 0.10, 0.15, 0.20], 0.3),
            &["rating"],
        );
    }

    #[tokio::test]
    async fn test_end_to_end_complete_input() {
        let dir = TempDir::new().unwrap();
        write_model(
            dir.path(),
            "rf_model",
            leaf_model(500.0f64.ln_1p()),
            FULL_FEATURES,
        );
        fs::write(
            dir.path().join("feature_importance.json"),
            json!({"rating": 0.5, "avg_sentiment": 0.3}).to_string(),
        )
        .unwrap();

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let result = engine.predict(&full_request()).await.unwrap();

        assert!(result.warnings.is_empty());
        assert!(result.predicted_longevity_days.is_finite());
        assert!(result.predicted_longevity_days >= 0.0);
        assert!((result.predicted_longevity_days - 500.0).abs() < 1e-6);
        assert_eq!(result.model_used, "rf_model");
        assert_eq!(result.interpretation.category, "Average");
        assert!(result.base_predictions.is_none());

        let factors = result.contributing_factors.unwrap();
        assert_eq!(factors[0].feature, "rating");
        assert_eq!(result.recommendations.len(), 2);
    }

    #[tokio::test]
    async fn test_combined_model_stacks_in_declared_order() {
        let dir = TempDir::new().unwrap();
        ensemble_fixture(dir.path());

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let result = engine
            .predict(&request_for("ensemble_model", json!({"rating": 4.0})))
            .await
            .unwrap();

        // 0.05*2 + 0.10*3 + 0.15*4 + 0.20*5 + 0.3 = 2.3; any other stacking
        // order changes the value
        assert!((result.predicted_longevity_days - 2.3f64.exp_m1()).abs() < 1e-9);

        let bases = result.base_predictions.unwrap();
        let roles: Vec<&str> = bases.iter().map(|b| b.role.as_str()).collect();
        assert_eq!(roles, vec!["rf", "xgb", "nn", "lstm"]);
        let logs: Vec<f64> = bases.iter().map(|b| b.log_days).collect();
        assert_eq!(logs, vec![2.0, 3.0, 4.0, 5.0]);
        assert!((bases[0].days - 2.0f64.exp_m1()).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_ensemble_is_fatal() {
        let dir = TempDir::new().unwrap();
        ensemble_fixture(dir.path());
        fs::remove_file(dir.path().join("lstm_model.json")).unwrap();
        fs::remove_file(dir.path().join("lstm_model_metadata.json")).unwrap();

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let err = engine
            .predict(&request_for("ensemble_model", json!({})))
            .await
            .unwrap_err();

        match err {
            EngineError::Prediction { reason, warnings } => {
                assert!(reason.contains("lstm"));
                // Validation warnings still reported alongside the failure
                assert_eq!(warnings, vec!["rating: missing, defaulted".to_string()]);
            }
            other => panic!("expected Prediction error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_model_name_fails() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "rf_model", leaf_model(5.0), &["rating"]);

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let err = engine
            .predict(&request_for("mystery_model", json!({"rating": 4.0})))
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::ModelNotFound { name } if name == "mystery_model"));
    }

    #[tokio::test]
    async fn test_empty_catalog_has_no_default() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);

        let mut request = full_request();
        request.model_name = None;
        let err = engine.predict(&request).await.unwrap_err();
        assert!(matches!(err, EngineError::ModelNotFound { name } if name == "default"));
    }

    #[tokio::test]
    async fn test_output_clipped_to_day_bounds() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "rf_model", leaf_model(15.0), &["rating"]);
        write_model(dir.path(), "xgb_model", leaf_model(-3.0), &["rating"]);

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);

        let high = engine
            .predict(&request_for("rf_model", json!({"rating": 4.0})))
            .await
            .unwrap();
        assert!((high.predicted_longevity_days - MAX_LONGEVITY_DAYS).abs() < 1e-6);
        assert!(high.predicted_longevity_days <= MAX_LONGEVITY_DAYS);

        let low = engine
            .predict(&request_for("xgb_model", json!({"rating": 4.0})))
            .await
            .unwrap();
        assert_eq!(low.predicted_longevity_days, 0.0);
        assert_eq!(low.interpretation.category, "Poor");
    }

    #[tokio::test]
    async fn test_unit_conversions_hold_exactly() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "rf_model", leaf_model(1000.0f64.ln_1p()), &["rating"]);

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let result = engine
            .predict(&request_for("rf_model", json!({"rating": 4.0})))
            .await
            .unwrap();

        assert_eq!(
            result.predicted_longevity_months,
            result.predicted_longevity_days / DAYS_PER_MONTH
        );
        assert_eq!(
            result.predicted_longevity_years,
            result.predicted_longevity_months / 12.0
        );
    }

    #[tokio::test]
    async fn test_missing_features_warn_in_declared_order() {
        let dir = TempDir::new().unwrap();
        write_model(
            dir.path(),
            "rf_model",
            leaf_model(5.0),
            &["rating", "size_mb", "category"],
        );

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let result = engine
            .predict(&request_for("rf_model", json!({"size_mb": "huge"})))
            .await
            .unwrap();

        assert_eq!(
            result.warnings,
            vec![
                "rating: missing, defaulted".to_string(),
                "size_mb: malformed numerical value, defaulted".to_string(),
                "category: missing, defaulted".to_string(),
            ]
        );
        assert!(result.predicted_longevity_days.is_finite());
    }

    #[tokio::test]
    async fn test_corrupt_bundle_excluded_from_list_after_failure() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "rf_model", leaf_model(5.0), &["rating"]);
        fs::write(dir.path().join("xgb_model.json"), "not json").unwrap();
        fs::write(
            dir.path().join("xgb_model_metadata.json"),
            json!({"features_used": ["rating"]}).to_string(),
        )
        .unwrap();

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        assert_eq!(engine.list_models().await.len(), 2);

        let err = engine
            .predict(&request_for("xgb_model", json!({"rating": 4.0})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::IncompleteArtifact { .. }));

        let names: Vec<String> = engine
            .list_models()
            .await
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["rf_model".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_swaps_catalog_wholesale() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "rf_model", leaf_model(5.0), &["rating"]);

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        assert_eq!(engine.bundle_count().await, 1);

        write_model(dir.path(), "xgb_model", leaf_model(6.0), &["rating"]);
        let bundles = engine.refresh().await;

        assert_eq!(bundles, 2);
        assert_eq!(engine.bundle_count().await, 2);
        let result = engine
            .predict(&request_for("xgb_model", json!({"rating": 4.0})))
            .await
            .unwrap();
        assert_eq!(result.model_used, "xgb_model");
    }

    #[tokio::test]
    async fn test_explicit_default_override_is_used() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "rf_model", leaf_model(2.0), &["rating"]);
        write_model(dir.path(), "xgb_model", leaf_model(3.0), &["rating"]);

        let engine = Engine::discover(
            vec![dir.path().to_path_buf()],
            Some("xgb_model".to_string()),
        );
        assert_eq!(engine.default_model().await.as_deref(), Some("xgb_model"));

        let mut request = request_for("unused", json!({"rating": 4.0}));
        request.model_name = None;
        let result = engine.predict(&request).await.unwrap();
        assert_eq!(result.model_used, "xgb_model");
    }

    #[tokio::test]
    async fn test_competitor_flag_carried_through() {
        let dir = TempDir::new().unwrap();
        write_model(dir.path(), "rf_model", leaf_model(5.0), &["rating"]);

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let mut request = request_for("rf_model", json!({"rating": 4.0}));
        request.compare_competitors = true;

        let result = engine.predict(&request).await.unwrap();
        assert!(result.compare_competitors);
    }

    #[tokio::test]
    async fn test_base_predictions_report_both_scales() {
        let dir = TempDir::new().unwrap();
        ensemble_fixture(dir.path());

        let engine = Engine::discover(vec![dir.path().to_path_buf()], None);
        let result = engine
            .predict(&request_for("ensemble_model", json!({"rating": 4.0})))
            .await
            .unwrap();

        for base in result.base_predictions.unwrap() {
            assert!((base.days - base.log_days.exp_m1()).abs() < 1e-9);
            assert!(base.days <= MAX_LONGEVITY_DAYS);
        }

        let models: HashMap<String, bool> = engine
            .list_models()
            .await
            .into_iter()
            .map(|s| (s.name, s.is_default))
            .collect();
        assert!(models.contains_key("ensemble_model"));
    }
}
