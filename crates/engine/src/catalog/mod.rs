//! Artifact catalog
//!
//! Scans model directories, groups files into named bundles by the suffix
//! conventions, and elects a default model from stored validation metrics.
//! Discovery records paths and metadata only; weights are loaded lazily
//! through the model cache.

mod bundle;

pub use bundle::{ArtifactFormat, BundleHandle, EnsembleRole, DEFAULT_LOOKBACK};

use crate::error::{EngineError, Result};
use crate::models::ModelSummary;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Immutable snapshot of the discovered model bundles
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    bundles: BTreeMap<String, BundleHandle>,
    default_model: Option<String>,
}

impl Catalog {
    /// Scan the given directories and build a catalog.
    ///
    /// Discovery is best-effort per bundle: unreadable directories and
    /// malformed companions are logged and skipped, never fatal. When the
    /// same bundle name appears in several directories the first directory
    /// wins. `default_override` pins the default model when it resolves;
    /// otherwise the bundle with the best stored validation metric is
    /// elected.
    pub fn discover(paths: &[PathBuf], default_override: Option<&str>) -> Self {
        let mut bundles: BTreeMap<String, BundleHandle> = BTreeMap::new();

        for dir in paths {
            if let Err(e) = scan_directory(dir, &mut bundles) {
                warn!(dir = %dir.display(), error = %e, "Skipping model directory");
            }
        }

        let default_model = elect_default(&bundles, default_override);

        info!(
            bundles = bundles.len(),
            default = default_model.as_deref().unwrap_or("none"),
            "Model catalog built"
        );

        Self {
            bundles,
            default_model,
        }
    }

    /// Look up a bundle by name
    pub fn resolve(&self, name: &str) -> Result<&BundleHandle> {
        self.bundles.get(name).ok_or_else(|| EngineError::ModelNotFound {
            name: name.to_string(),
        })
    }

    /// The first bundle carrying the given ensemble role, in name order
    pub fn bundle_for_role(&self, role: EnsembleRole) -> Option<&BundleHandle> {
        self.bundles.values().find(|b| b.role == Some(role))
    }

    /// Name of the elected default model
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn bundles(&self) -> impl Iterator<Item = &BundleHandle> {
        self.bundles.values()
    }

    /// Advertised catalog rows, in name order
    pub fn summaries(&self) -> Vec<ModelSummary> {
        self.bundles
            .values()
            .map(|b| ModelSummary {
                name: b.name.clone(),
                description: b.metadata.description.clone(),
                role: b.role.map(|r| r.token().to_string()),
                validation_metrics: b.metadata.best_model.clone(),
                is_default: self.default_model.as_deref() == Some(b.name.as_str()),
            })
            .collect()
    }
}

fn scan_directory(dir: &Path, bundles: &mut BTreeMap<String, BundleHandle>) -> Result<()> {
    let entries = fs::read_dir(dir)?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(format) = ArtifactFormat::from_extension(ext) else {
            continue;
        };
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if bundle::is_companion_stem(stem) {
            continue;
        }

        if bundles.contains_key(stem) {
            debug!(bundle = %stem, dir = %dir.display(), "Bundle already discovered in an earlier directory");
            continue;
        }

        let handle = BundleHandle::from_artifact(dir, stem, path.clone(), format);
        debug!(
            bundle = %stem,
            artifact = %path.display(),
            role = handle.role.map(|r| r.token()).unwrap_or("none"),
            "Discovered model bundle"
        );
        bundles.insert(stem.to_string(), handle);
    }

    Ok(())
}

/// Pick the default bundle once at build time: the configured override when
/// it resolves, otherwise lowest validation RMSE, then highest R² among
/// bundles without an RMSE, then first by name. Bundles without a declared
/// feature schema are never elected.
fn elect_default(bundles: &BTreeMap<String, BundleHandle>, default_override: Option<&str>) -> Option<String> {
    if let Some(name) = default_override {
        if bundles.contains_key(name) {
            return Some(name.to_string());
        }
        warn!(model = %name, "Configured default model not found in catalog, falling back to metric election");
    }

    let candidates: Vec<&BundleHandle> = bundles
        .values()
        .filter(|b| b.metadata.has_features())
        .collect();

    let by_rmse = candidates
        .iter()
        .filter_map(|b| {
            b.metadata
                .best_model
                .as_ref()
                .and_then(|m| m.test_rmse)
                .map(|rmse| (b.name.as_str(), rmse))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((name, _)) = by_rmse {
        return Some(name.to_string());
    }

    let by_r2 = candidates
        .iter()
        .filter_map(|b| {
            b.metadata
                .best_model
                .as_ref()
                .and_then(|m| m.test_r2)
                .map(|r2| (b.name.as_str(), r2))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((name, _)) = by_r2 {
        return Some(name.to_string());
    }

    candidates.first().map(|b| b.name.clone())
}
