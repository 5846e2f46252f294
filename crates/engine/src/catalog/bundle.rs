//! Bundle handles: the catalog's per-model unit of artifact paths and metadata

use crate::error::Result;
use crate::models::ModelMetadata;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File suffixes that mark a companion file rather than a primary artifact
const COMPANION_SUFFIXES: &[&str] = &["_scaler", "_preprocessor", "_feature_importance", "_metadata"];

/// Base names reserved for directory-wide companion fallbacks
const COMPANION_FALLBACKS: &[&str] = &["scaler", "preprocessor", "feature_importance", "model_metadata"];

/// Default sequence length for recurrent bundles without a metadata override
pub const DEFAULT_LOOKBACK: usize = 5;

/// Position of a bundle in the ensemble stacking order, derived from the
/// leading token of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnsembleRole {
    TreeEnsemble,
    GradientBoosting,
    DenseNetwork,
    SequenceNetwork,
    Meta,
}

impl EnsembleRole {
    /// Parse the role from a bundle name like `rf_model` or `lstm_model`
    pub fn from_name(name: &str) -> Option<Self> {
        let token = name.split('_').next().unwrap_or(name);
        match token {
            "rf" => Some(Self::TreeEnsemble),
            "xgb" => Some(Self::GradientBoosting),
            "nn" => Some(Self::DenseNetwork),
            "lstm" => Some(Self::SequenceNetwork),
            "ensemble" => Some(Self::Meta),
            _ => None,
        }
    }

    /// Short token used in names, logs, and serialized results
    pub fn token(&self) -> &'static str {
        match self {
            Self::TreeEnsemble => "rf",
            Self::GradientBoosting => "xgb",
            Self::DenseNetwork => "nn",
            Self::SequenceNetwork => "lstm",
            Self::Meta => "ensemble",
        }
    }
}

/// Native serialization format, selected by primary artifact extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Tagged JSON export (tree ensembles, gradient boosting, linear)
    Json,
    /// ONNX graph (dense and recurrent networks)
    Onnx,
}

impl ArtifactFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "json" => Some(Self::Json),
            "onnx" => Some(Self::Onnx),
            _ => None,
        }
    }
}

/// One discovered model bundle: primary artifact path, resolved companion
/// paths, and parsed metadata. Weights are loaded lazily through the cache.
#[derive(Debug, Clone)]
pub struct BundleHandle {
    pub name: String,
    pub artifact_path: PathBuf,
    pub format: ArtifactFormat,
    pub role: Option<EnsembleRole>,
    pub scaler_path: Option<PathBuf>,
    pub preprocessor_path: Option<PathBuf>,
    pub importance_path: Option<PathBuf>,
    pub metadata: ModelMetadata,
}

impl BundleHandle {
    /// Build a handle for a primary artifact, resolving companions by the
    /// suffix conventions: `<name>_<companion>.<ext>` first, then the
    /// directory-wide fallback.
    pub fn from_artifact(dir: &Path, name: &str, artifact_path: PathBuf, format: ArtifactFormat) -> Self {
        let scaler_path = resolve_companion(dir, name, "scaler", &["json"]);
        let preprocessor_path = resolve_companion(dir, name, "preprocessor", &["json"]);
        let importance_path = first_existing(&[
            dir.join(format!("{name}_feature_importance.json")),
            dir.join("feature_importance.json"),
        ]);
        let metadata_path = first_existing(&[
            dir.join(format!("{name}_metadata.json")),
            dir.join("model_metadata.json"),
        ]);

        let metadata = metadata_path
            .as_deref()
            .map(load_metadata)
            .transpose()
            .unwrap_or_else(|e| {
                warn!(bundle = %name, error = %e, "Failed to parse bundle metadata, treating as absent");
                None
            })
            .unwrap_or_default();

        Self {
            name: name.to_string(),
            artifact_path,
            format,
            role: EnsembleRole::from_name(name),
            scaler_path,
            preprocessor_path,
            importance_path,
            metadata,
        }
    }

    /// Sequence length used when synthesizing lookback history
    pub fn lookback(&self) -> usize {
        self.metadata.lookback.unwrap_or(DEFAULT_LOOKBACK)
    }
}

/// A file stem is a primary artifact candidate unless the suffix conventions
/// mark it as a companion.
pub(super) fn is_companion_stem(stem: &str) -> bool {
    COMPANION_SUFFIXES.iter().any(|s| stem.ends_with(s))
        || COMPANION_FALLBACKS.contains(&stem)
}

fn resolve_companion(dir: &Path, name: &str, companion: &str, exts: &[&str]) -> Option<PathBuf> {
    for ext in exts {
        if let Some(found) = first_existing(&[
            dir.join(format!("{name}_{companion}.{ext}")),
            dir.join(format!("{companion}.{ext}")),
        ]) {
            return Some(found);
        }
    }
    None
}

fn first_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|p| p.is_file()).cloned()
}

fn load_metadata(path: &Path) -> Result<ModelMetadata> {
    let content = fs::read_to_string(path)?;
    let metadata: ModelMetadata = serde_json::from_str(&content)?;
    debug!(path = %path.display(), features = metadata.features_used.len(), "Loaded bundle metadata");
    Ok(metadata)
}
