//! Synthetic sequence history for recurrent models
//!
//! True per-app time series are not available at inference time, so the
//! recurrent model's lookback window is synthesized from the single input
//! row: a deterministic shrinking trend plus bounded gaussian perturbation.
//! Older steps drift further from the input; the most recent step
//! approaches the raw row. The output is a stand-in for real history, not
//! a measurement.

use ndarray::{Array2, Array3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Trend applied at full time distance
const TREND_SCALE: f64 = 0.1;

/// Noise standard deviation at full time distance
const NOISE_SCALE: f64 = 0.05;

/// Relative distance of a step from the present: 1.0 at the oldest step,
/// nearest zero at the most recent step.
pub fn time_factor(lookback: usize, step: usize) -> f64 {
    (lookback - step) as f64 / lookback as f64
}

/// Builds `[samples, lookback, features]` history tensors from flat rows
pub struct SequenceSynthesizer {
    lookback: usize,
    seed: Option<u64>,
}

impl SequenceSynthesizer {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            seed: None,
        }
    }

    /// Fix the noise seed for reproducible output
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Synthesize one history window per input row
    pub fn synthesize(&self, rows: &Array2<f64>) -> Array3<f64> {
        let (samples, features) = rows.dim();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut out = Array3::zeros((samples, self.lookback, features));
        for (i, row) in rows.rows().into_iter().enumerate() {
            for step in 0..self.lookback {
                let factor = time_factor(self.lookback, step);
                for (j, &value) in row.iter().enumerate() {
                    let noise = gaussian(&mut rng) * NOISE_SCALE * factor;
                    out[[i, step, j]] = value * (1.0 + TREND_SCALE * factor) + noise;
                }
            }
        }
        out
    }
}

/// Standard normal sample via the Box-Muller transform
fn gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
