//! Error taxonomy for the prediction engine

use thiserror::Error;

/// Errors surfaced by the catalog, loaders, and the prediction orchestrator
#[derive(Debug, Error)]
pub enum EngineError {
    /// Requested model name is not present in the catalog
    #[error("model '{name}' not found in catalog")]
    ModelNotFound { name: String },

    /// A bundle's primary artifact is missing or failed to parse at load time
    #[error("bundle '{name}' could not be loaded: {reason}")]
    IncompleteArtifact { name: String, reason: String },

    /// Input validation failed and no reasonable default exists
    #[error("feature validation failed: {reason}")]
    FeatureValidation { reason: String },

    /// A native predict call failed, or a combined-model sub-prediction failed.
    /// Carries any validation warnings gathered before the failure so callers
    /// can still report them.
    #[error("prediction failed: {reason}")]
    Prediction {
        reason: String,
        warnings: Vec<String>,
    },

    /// Stored prediction record does not exist for this user
    #[error("prediction record {id} not found")]
    RecordNotFound { id: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl EngineError {
    /// Build a prediction error with no accumulated warnings
    pub fn prediction(reason: impl Into<String>) -> Self {
        Self::Prediction {
            reason: reason.into(),
            warnings: Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
