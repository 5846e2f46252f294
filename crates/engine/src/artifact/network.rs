//! ONNX network inference using tract
//!
//! Loads the exported dense and recurrent regressors via tract-onnx with
//! pinned input shapes, and runs them one sample at a time.

use crate::error::{EngineError, Result};
use ndarray::{Array2, Array3};
use tract_onnx::prelude::*;

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Feed-forward network taking a flat `[1, n_features]` input
#[derive(Debug)]
pub struct DenseNetwork {
    plan: TractPlan,
    n_features: usize,
}

impl DenseNetwork {
    /// Parse and optimize an ONNX graph with the input pinned to one row
    pub fn from_bytes(bytes: &[u8], n_features: usize) -> TractResult<Self> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))?
            .with_input_fact(0, f32::fact([1, n_features]).into())?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self { plan, n_features })
    }

    /// Predict one value per matrix row
    pub fn predict(&self, matrix: &Array2<f64>) -> Result<Vec<f64>> {
        if matrix.ncols() != self.n_features {
            return Err(EngineError::prediction(format!(
                "network expects {} features, got {}",
                self.n_features,
                matrix.ncols()
            )));
        }
        let mut out = Vec::with_capacity(matrix.nrows());
        for row in matrix.rows() {
            let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
            let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.n_features), data)
                .unwrap()
                .into();
            out.push(run_single(&self.plan, input)?);
        }
        Ok(out)
    }
}

/// Recurrent network taking a `[1, lookback, n_features]` history window
#[derive(Debug)]
pub struct SequenceNetwork {
    plan: TractPlan,
    lookback: usize,
    n_features: usize,
}

impl SequenceNetwork {
    pub fn from_bytes(bytes: &[u8], lookback: usize, n_features: usize) -> TractResult<Self> {
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))?
            .with_input_fact(0, f32::fact([1, lookback, n_features]).into())?
            .into_optimized()?
            .into_runnable()?;
        Ok(Self {
            plan,
            lookback,
            n_features,
        })
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Predict one value per history window in the `[samples, lookback,
    /// n_features]` batch
    pub fn predict(&self, windows: &Array3<f64>) -> Result<Vec<f64>> {
        let shape = windows.dim();
        if shape.1 != self.lookback || shape.2 != self.n_features {
            return Err(EngineError::prediction(format!(
                "network expects windows of {}x{}, got {}x{}",
                self.lookback, self.n_features, shape.1, shape.2
            )));
        }
        let mut out = Vec::with_capacity(shape.0);
        for window in windows.outer_iter() {
            let data: Vec<f32> = window.iter().map(|v| *v as f32).collect();
            let input: Tensor =
                tract_ndarray::Array3::from_shape_vec((1, self.lookback, self.n_features), data)
                    .unwrap()
                    .into();
            out.push(run_single(&self.plan, input)?);
        }
        Ok(out)
    }
}

/// Run one pinned-shape sample and pull the first scalar out of the result
fn run_single(plan: &TractPlan, input: Tensor) -> Result<f64> {
    let result = plan
        .run(tvec!(input.into()))
        .map_err(|e| EngineError::prediction(format!("model execution failed: {e}")))?;
    let output = result
        .first()
        .ok_or_else(|| EngineError::prediction("model produced no output"))?;
    let view = output
        .to_array_view::<f32>()
        .map_err(|e| EngineError::prediction(format!("model output is not f32: {e}")))?;
    let value = view
        .iter()
        .next()
        .ok_or_else(|| EngineError::prediction("model output is empty"))?;
    Ok(*value as f64)
}
