//! Format adapters and the shared model cache
//!
//! Every primary artifact format loads into a [`LoadedModel`] exposing one
//! `predict` capability, so the orchestrator and combiner never branch on
//! format. Loads go through [`ModelCache`]: each bundle is loaded at most
//! once per catalog generation, concurrent requests for the same bundle
//! collapse to a single in-flight load, and load failures are cached so a
//! corrupt bundle is reported once and then excluded.

pub mod network;
pub mod tabular;

use crate::catalog::{ArtifactFormat, BundleHandle, EnsembleRole};
use crate::error::{EngineError, Result};
use crate::models::ModelMetadata;
use crate::observability::EngineMetrics;
use crate::preprocess::{self, DefaultedRow, FittedPreprocessor, FittedScaler};
use dashmap::DashMap;
use ndarray::{Array2, Array3};
use network::{DenseNetwork, SequenceNetwork};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tabular::{LinearModel, TabularModel};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Input accepted by a loaded model's predict call
pub enum ModelInput {
    /// Flat feature matrix, one row per sample
    Matrix(Array2<f64>),
    /// Synthesized history windows for recurrent models
    Windows(Array3<f64>),
}

/// A loaded primary artifact behind the shared predict capability
#[derive(Debug)]
pub enum LoadedModel {
    Tabular(TabularModel),
    Dense(DenseNetwork),
    Sequence(SequenceNetwork),
}

impl LoadedModel {
    /// Predict one log-space value per input sample
    pub fn predict(&self, input: &ModelInput) -> Result<Vec<f64>> {
        match (self, input) {
            (Self::Tabular(m), ModelInput::Matrix(x)) => m.predict(x),
            (Self::Dense(m), ModelInput::Matrix(x)) => m.predict(x),
            (Self::Sequence(m), ModelInput::Windows(x)) => m.predict(x),
            (Self::Sequence(_), ModelInput::Matrix(_)) => Err(EngineError::prediction(
                "recurrent model requires history windows, got a flat matrix",
            )),
            (_, ModelInput::Windows(_)) => Err(EngineError::prediction(
                "model takes a flat matrix, got history windows",
            )),
        }
    }

    /// Whether predict expects synthesized history windows
    pub fn needs_windows(&self) -> bool {
        matches!(self, Self::Sequence(_))
    }

    /// The linear meta-model, when this artifact is one
    pub fn as_linear(&self) -> Option<&LinearModel> {
        match self {
            Self::Tabular(m) => m.as_linear(),
            _ => None,
        }
    }
}

/// A fully loaded bundle: model weights plus parsed companions
///
/// Immutable once loaded; shared read-only across requests via `Arc`.
#[derive(Debug)]
pub struct LoadedBundle {
    pub name: String,
    pub model: LoadedModel,
    /// SHA256 of the primary artifact bytes, for identification in logs
    pub checksum: String,
    pub metadata: ModelMetadata,
    pub importances: Option<HashMap<String, f64>>,
    pub preprocessor: Option<FittedPreprocessor>,
    pub scaler: Option<FittedScaler>,
    pub lookback: usize,
}

impl LoadedBundle {
    /// Apply this bundle's stored preprocessing to a defaulted row
    pub fn transform(&self, row: &DefaultedRow) -> Result<Array2<f64>> {
        preprocess::transform(
            row,
            self.preprocessor.as_ref(),
            self.scaler.as_ref(),
            &self.metadata,
        )
    }
}

/// Loads a bundle's artifacts into memory. Implemented by the filesystem
/// loader in production and by in-memory fakes in tests.
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, handle: &BundleHandle) -> Result<LoadedBundle>;
}

/// Default loader: reads artifacts from the paths recorded at discovery
pub struct FsLoader;

impl ArtifactLoader for FsLoader {
    fn load(&self, handle: &BundleHandle) -> Result<LoadedBundle> {
        let start = Instant::now();

        if !handle.metadata.has_features() {
            return Err(incomplete(&handle.name, "metadata features_used is empty"));
        }

        let preprocessor = read_companion(
            handle.preprocessor_path.as_deref(),
            &handle.name,
            "preprocessor",
            FittedPreprocessor::from_slice,
        );
        let scaler = read_companion(
            handle.scaler_path.as_deref(),
            &handle.name,
            "scaler",
            FittedScaler::from_slice,
        );
        let importances = read_companion(
            handle.importance_path.as_deref(),
            &handle.name,
            "feature_importance",
            parse_importances,
        );

        // Networks are pinned to the width the stored transform produces
        let expected_width = preprocessor
            .as_ref()
            .map(FittedPreprocessor::output_width)
            .or_else(|| scaler.as_ref().map(|s| s.features.len()))
            .unwrap_or(handle.metadata.features_used.len());

        let bytes = fs::read(&handle.artifact_path)
            .map_err(|e| incomplete(&handle.name, format!("failed to read artifact: {e}")))?;
        let checksum = compute_checksum(&bytes);

        let model = match handle.format {
            ArtifactFormat::Json => TabularModel::from_slice(&bytes)
                .map(LoadedModel::Tabular)
                .map_err(|e| incomplete(&handle.name, format!("failed to parse model JSON: {e}")))?,
            ArtifactFormat::Onnx => match handle.role {
                Some(EnsembleRole::SequenceNetwork) => {
                    SequenceNetwork::from_bytes(&bytes, handle.lookback(), expected_width)
                        .map(LoadedModel::Sequence)
                        .map_err(|e| {
                            incomplete(&handle.name, format!("failed to load ONNX graph: {e}"))
                        })?
                }
                _ => DenseNetwork::from_bytes(&bytes, expected_width)
                    .map(LoadedModel::Dense)
                    .map_err(|e| {
                        incomplete(&handle.name, format!("failed to load ONNX graph: {e}"))
                    })?,
            },
        };

        debug!(
            bundle = %handle.name,
            checksum = %checksum,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded model bundle"
        );

        Ok(LoadedBundle {
            name: handle.name.clone(),
            model,
            checksum,
            metadata: handle.metadata.clone(),
            importances,
            preprocessor,
            scaler,
            lookback: handle.lookback(),
        })
    }
}

fn incomplete(name: &str, reason: impl Into<String>) -> EngineError {
    EngineError::IncompleteArtifact {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Read and parse an optional companion file. Companions degrade
/// gracefully: a missing or malformed file logs a warning and the bundle
/// continues without it.
fn read_companion<T>(
    path: Option<&Path>,
    bundle: &str,
    kind: &str,
    parse: fn(&[u8]) -> Result<T>,
) -> Option<T> {
    let path = path?;
    let result = fs::read(path)
        .map_err(EngineError::from)
        .and_then(|bytes| parse(&bytes));
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                bundle = %bundle,
                companion = %kind,
                path = %path.display(),
                error = %e,
                "Failed to load companion, continuing without it"
            );
            None
        }
    }
}

fn parse_importances(bytes: &[u8]) -> Result<HashMap<String, f64>> {
    serde_json::from_slice(bytes).map_err(EngineError::from)
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// A load attempt that failed. Cached so repeat requests for a corrupt
/// bundle fail fast instead of re-reading the artifact.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub name: String,
    pub reason: String,
}

impl LoadFailure {
    fn from_error(name: &str, error: EngineError) -> Self {
        let reason = match error {
            EngineError::IncompleteArtifact { reason, .. } => reason,
            other => other.to_string(),
        };
        Self {
            name: name.to_string(),
            reason,
        }
    }
}

impl From<LoadFailure> for EngineError {
    fn from(failure: LoadFailure) -> Self {
        EngineError::IncompleteArtifact {
            name: failure.name,
            reason: failure.reason,
        }
    }
}

type LoadCell = Arc<OnceCell<std::result::Result<Arc<LoadedBundle>, LoadFailure>>>;

/// Per-generation model cache with single-flight loading
///
/// Bundles load lazily on first use. Concurrent callers for the same bundle
/// await one shared load; the outcome (success or failure) is cached for
/// the life of the cache.
pub struct ModelCache {
    loader: Arc<dyn ArtifactLoader>,
    cells: DashMap<String, LoadCell>,
    metrics: EngineMetrics,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ArtifactLoader>, metrics: EngineMetrics) -> Self {
        Self {
            loader,
            cells: DashMap::new(),
            metrics,
        }
    }

    /// Get the loaded bundle, loading it on first call. The blocking parse
    /// runs on the blocking thread pool.
    pub async fn get_or_load(&self, handle: &BundleHandle) -> Result<Arc<LoadedBundle>> {
        let cell = self
            .cells
            .entry(handle.name.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async {
                let loader = Arc::clone(&self.loader);
                let metrics = self.metrics.clone();
                let owned = handle.clone();
                let name = owned.name.clone();
                let start = Instant::now();

                match tokio::task::spawn_blocking(move || loader.load(&owned)).await {
                    Ok(Ok(bundle)) => {
                        metrics.observe_model_load(start.elapsed().as_secs_f64());
                        Ok(Arc::new(bundle))
                    }
                    Ok(Err(e)) => {
                        metrics.inc_model_load_errors();
                        warn!(bundle = %name, error = %e, "Bundle load failed");
                        Err(LoadFailure::from_error(&name, e))
                    }
                    Err(e) => {
                        metrics.inc_model_load_errors();
                        Err(LoadFailure {
                            name,
                            reason: format!("load task failed: {e}"),
                        })
                    }
                }
            })
            .await;

        match result {
            Ok(bundle) => {
                self.metrics.set_bundles_loaded(self.loaded_count() as i64);
                Ok(Arc::clone(bundle))
            }
            Err(failure) => Err(failure.clone().into()),
        }
    }

    /// Bundles currently resident in the cache
    pub fn loaded_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|entry| matches!(entry.value().get(), Some(Ok(_))))
            .count()
    }

    /// Names of bundles whose load attempt failed, for exclusion from the
    /// advertised catalog list
    pub fn failed_names(&self) -> Vec<String> {
        self.cells
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .get()
                    .and_then(|r| r.as_ref().err())
                    .map(|f| f.name.clone())
            })
            .collect()
    }
}
