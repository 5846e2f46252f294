//! Preprocessing reconstruction
//!
//! Replays the preprocessing that was fitted at training time. Two stages:
//! defaulting (absent or malformed raw values are substituted and recorded
//! as warnings) and transformation (stored imputation, scaling, and one-hot
//! encoding applied exactly as fitted). The engine never re-fits anything.

use crate::error::{EngineError, Result};
use crate::models::ModelMetadata;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Fitted parameters for one numerical feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedNumeric {
    pub feature: String,
    /// Imputation value for rows missing this feature entirely
    pub median: f64,
    pub mean: f64,
    pub scale: f64,
}

/// Fitted parameters for one categorical feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedCategorical {
    pub feature: String,
    pub most_frequent: String,
    /// Categories seen at training time, in one-hot column order
    pub categories: Vec<String>,
}

/// A full fitted preprocessing pipeline exported beside a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    #[serde(default)]
    pub numerical: Vec<FittedNumeric>,
    #[serde(default)]
    pub categorical: Vec<FittedCategorical>,
}

impl FittedPreprocessor {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(EngineError::from)
    }

    /// Width of the transformed matrix this pipeline produces
    pub fn output_width(&self) -> usize {
        self.numerical.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }
}

/// A standalone standard scaler, used by bundles exported without a full
/// preprocessing pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedScaler {
    /// Column order of the scaled matrix
    pub features: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl FittedScaler {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let scaler: Self = serde_json::from_slice(bytes)?;
        if scaler.mean.len() != scaler.features.len() || scaler.scale.len() != scaler.features.len() {
            return Err(EngineError::prediction(format!(
                "scaler declares {} features but {} means and {} scales",
                scaler.features.len(),
                scaler.mean.len(),
                scaler.scale.len()
            )));
        }
        Ok(scaler)
    }
}

/// A raw request row after defaulting: every declared feature present, with
/// a coerced float or categorical string value
#[derive(Debug, Clone, Default)]
pub struct DefaultedRow {
    pub numeric: BTreeMap<String, f64>,
    pub categorical: BTreeMap<String, String>,
}

impl DefaultedRow {
    /// The effective values, for reporting which inputs drove a prediction
    pub fn values(&self) -> BTreeMap<String, Value> {
        let mut out = BTreeMap::new();
        for (feature, value) in &self.numeric {
            out.insert(
                feature.clone(),
                serde_json::Number::from_f64(*value)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
        }
        for (feature, value) in &self.categorical {
            out.insert(feature.clone(), Value::String(value.clone()));
        }
        out
    }
}

enum Coerced {
    Number(f64),
    Missing,
    Malformed(&'static str),
}

fn coerce_numeric(value: &Value) -> Coerced {
    match value {
        Value::Null => Coerced::Missing,
        Value::Bool(b) => Coerced::Number(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => match n.as_f64() {
            Some(v) if v.is_finite() => Coerced::Number(v),
            _ => Coerced::Malformed("not a number"),
        },
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Coerced::Number(v),
            Ok(_) => Coerced::Malformed("not a number"),
            Err(_) => Coerced::Malformed("malformed numerical value"),
        },
        _ => Coerced::Malformed("malformed numerical value"),
    }
}

fn coerce_categorical(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Defaulting stage: walk `metadata.features_used` in order and produce a
/// fully-populated row plus one warning per substitution.
///
/// Absent or null numerical features become `0`, absent categorical features
/// become the `"unknown"` sentinel, and malformed numerical values become
/// `0`. Extra request features not declared in the metadata are ignored.
pub fn prepare(
    raw: &HashMap<String, Value>,
    metadata: &ModelMetadata,
) -> (DefaultedRow, Vec<String>) {
    let mut row = DefaultedRow::default();
    let mut warnings = Vec::new();

    for feature in &metadata.features_used {
        let value = raw.get(feature);
        if metadata.is_categorical(feature) {
            match value.and_then(coerce_categorical) {
                Some(v) => {
                    row.categorical.insert(feature.clone(), v);
                }
                None => {
                    let reason = match value {
                        None | Some(Value::Null) => "missing",
                        _ => "malformed categorical value",
                    };
                    warnings.push(format!("{feature}: {reason}, defaulted"));
                    row.categorical.insert(feature.clone(), "unknown".to_string());
                }
            }
        } else {
            match value.map(coerce_numeric).unwrap_or(Coerced::Missing) {
                Coerced::Number(v) => {
                    row.numeric.insert(feature.clone(), v);
                }
                Coerced::Missing => {
                    warnings.push(format!("{feature}: missing, defaulted"));
                    row.numeric.insert(feature.clone(), 0.0);
                }
                Coerced::Malformed(reason) => {
                    warnings.push(format!("{feature}: {reason}, defaulted"));
                    row.numeric.insert(feature.clone(), 0.0);
                }
            }
        }
    }

    (row, warnings)
}

/// Transformation stage: apply the bundle's stored transform to a defaulted
/// row, producing the single-row numeric matrix its model consumes.
///
/// Resolution order follows what the bundle shipped with: a full fitted
/// preprocessor, else a standalone scaler, else the raw numeric row in
/// declared feature order.
pub fn transform(
    row: &DefaultedRow,
    preprocessor: Option<&FittedPreprocessor>,
    scaler: Option<&FittedScaler>,
    metadata: &ModelMetadata,
) -> Result<Array2<f64>> {
    if let Some(pre) = preprocessor {
        return apply_preprocessor(row, pre);
    }
    if let Some(scaler) = scaler {
        return apply_scaler(row, scaler);
    }
    passthrough(row, metadata)
}

fn apply_preprocessor(row: &DefaultedRow, pre: &FittedPreprocessor) -> Result<Array2<f64>> {
    let mut data = Vec::with_capacity(pre.output_width());

    for numeric in &pre.numerical {
        let value = row.numeric.get(&numeric.feature).copied().unwrap_or(numeric.median);
        data.push(standardize(value, numeric.mean, numeric.scale));
    }
    for categorical in &pre.categorical {
        let value = row
            .categorical
            .get(&categorical.feature)
            .unwrap_or(&categorical.most_frequent);
        // Unseen categories produce an all-zero indicator block
        for category in &categorical.categories {
            data.push(if category == value { 1.0 } else { 0.0 });
        }
    }

    matrix(data)
}

fn apply_scaler(row: &DefaultedRow, scaler: &FittedScaler) -> Result<Array2<f64>> {
    let mut data = Vec::with_capacity(scaler.features.len());
    for (i, feature) in scaler.features.iter().enumerate() {
        let value = row.numeric.get(feature).copied().unwrap_or(0.0);
        data.push(standardize(value, scaler.mean[i], scaler.scale[i]));
    }
    matrix(data)
}

fn passthrough(row: &DefaultedRow, metadata: &ModelMetadata) -> Result<Array2<f64>> {
    let mut data = Vec::with_capacity(metadata.features_used.len());
    for feature in &metadata.features_used {
        data.push(row.numeric.get(feature).copied().unwrap_or(0.0));
    }
    matrix(data)
}

fn standardize(value: f64, mean: f64, scale: f64) -> f64 {
    // Fitted scalers store 1.0 for zero-variance columns, but guard anyway
    let scale = if scale == 0.0 { 1.0 } else { scale };
    (value - mean) / scale
}

fn matrix(data: Vec<f64>) -> Result<Array2<f64>> {
    let width = data.len();
    Array2::from_shape_vec((1, width), data)
        .map_err(|e| EngineError::prediction(format!("failed to shape feature matrix: {e}")))
}
