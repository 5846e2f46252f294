//! Core engine for app longevity prediction
//!
//! This crate provides the core functionality for:
//! - Model bundle discovery and default election
//! - Loading serialized tree, boosting, linear, and ONNX network artifacts
//! - Reconstructing stored preprocessing (impute, scale, one-hot)
//! - Synthetic history windows for recurrent models
//! - Stacked ensemble combination and the day-scale numeric contract
//! - Interpretation, contributing factors, and recommendations
//! - Prediction history storage

pub mod artifact;
pub mod catalog;
pub mod ensemble;
pub mod error;
pub mod insights;
pub mod models;
pub mod observability;
pub mod predict;
pub mod preprocess;
pub mod sequence;
pub mod store;

pub use error::{EngineError, Result};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use predict::Engine;
pub use store::{MemoryStore, PredictionStore};
