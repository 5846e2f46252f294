//! Tabular model artifacts: tagged-JSON exports evaluated natively
//!
//! The training pipeline exports tree ensembles, gradient-boosted trees, and
//! linear (meta) regressors as tagged JSON. Each variant evaluates a numeric
//! feature matrix row by row.

use crate::error::{EngineError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// One node of a serialized decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A decision tree as a flat node array, rooted at index 0
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk the tree for one feature row. Rows go left when the feature is
    /// `<=` the split threshold, matching the exporter.
    fn evaluate(&self, row: &[f64]) -> Result<f64> {
        let mut index = 0usize;
        // A well-formed tree terminates in at most `nodes.len()` steps;
        // anything longer means a cycle in the node array.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(*value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = row.get(*feature).copied().ok_or_else(|| {
                        EngineError::prediction(format!(
                            "tree references feature index {} but row has {} features",
                            feature,
                            row.len()
                        ))
                    })?;
                    index = if value <= *threshold { *left } else { *right };
                }
                None => {
                    return Err(EngineError::prediction(format!(
                        "tree node index {} out of bounds",
                        index
                    )))
                }
            }
        }
        Err(EngineError::prediction("tree walk did not terminate"))
    }
}

/// Averaged ensemble of decision trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsembleModel {
    pub trees: Vec<DecisionTree>,
}

impl TreeEnsembleModel {
    fn evaluate(&self, row: &[f64]) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(EngineError::prediction("tree ensemble has no trees"));
        }
        let mut sum = 0.0;
        for tree in &self.trees {
            sum += tree.evaluate(row)?;
        }
        Ok(sum / self.trees.len() as f64)
    }
}

/// Additive boosted trees with a base score and shrinkage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingModel {
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<DecisionTree>,
}

impl GradientBoostingModel {
    fn evaluate(&self, row: &[f64]) -> Result<f64> {
        let mut sum = self.base_score;
        for tree in &self.trees {
            sum += self.learning_rate * tree.evaluate(row)?;
        }
        Ok(sum)
    }
}

/// Linear regressor; also the meta-model format for the stacking ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearModel {
    pub fn evaluate(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.coefficients.len() {
            return Err(EngineError::prediction(format!(
                "linear model expects {} features, got {}",
                self.coefficients.len(),
                row.len()
            )));
        }
        let dot: f64 = self
            .coefficients
            .iter()
            .zip(row.iter())
            .map(|(c, v)| c * v)
            .sum();
        Ok(dot + self.intercept)
    }
}

/// Tagged union over the JSON-exported model kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TabularModel {
    TreeEnsemble(TreeEnsembleModel),
    GradientBoosting(GradientBoostingModel),
    Linear(LinearModel),
}

impl TabularModel {
    /// Parse a tagged-JSON artifact
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(EngineError::from)
    }

    /// Predict one value per matrix row
    pub fn predict(&self, matrix: &Array2<f64>) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(matrix.nrows());
        for row in matrix.rows() {
            let row = row.as_slice().ok_or_else(|| {
                EngineError::prediction("feature matrix is not contiguous")
            })?;
            let value = match self {
                Self::TreeEnsemble(m) => m.evaluate(row)?,
                Self::GradientBoosting(m) => m.evaluate(row)?,
                Self::Linear(m) => m.evaluate(row)?,
            };
            out.push(value);
        }
        Ok(out)
    }

    /// The meta-model variant, when this artifact is one
    pub fn as_linear(&self) -> Option<&LinearModel> {
        match self {
            Self::Linear(m) => Some(m),
            _ => None,
        }
    }
}
