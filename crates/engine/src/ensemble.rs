//! Ensemble combination and the longevity numeric contract
//!
//! Training targets are `log1p(days)`. Every model's raw output passes
//! through the same clip and inverse transform: clip to
//! `[log1p(0), log1p(10000)]`, then `expm1`, bounding every prediction to
//! `[0, 10000]` days no matter which model produced the value. The
//! combined model stacks base outputs in a fixed order and maps them
//! through a linear meta-model fit on that same arity.

use crate::artifact::tabular::LinearModel;
use crate::catalog::EnsembleRole;
use crate::error::Result;

/// Hard upper bound on predicted longevity, in days
pub const MAX_LONGEVITY_DAYS: f64 = 10_000.0;

/// Average month length used for unit conversion
pub const DAYS_PER_MONTH: f64 = 30.44;

/// Order in which base model outputs are stacked for the meta-model
pub const STACKING_ORDER: [EnsembleRole; 4] = [
    EnsembleRole::TreeEnsemble,
    EnsembleRole::GradientBoosting,
    EnsembleRole::DenseNetwork,
    EnsembleRole::SequenceNetwork,
];

/// A finalized longevity value in all reported units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LongevityEstimate {
    pub days: f64,
    pub months: f64,
    pub years: f64,
}

/// Clip a raw log-space output to the supported target range
pub fn clip_log_days(raw: f64) -> f64 {
    raw.clamp(0.0, MAX_LONGEVITY_DAYS.ln_1p())
}

/// Convert a raw log-space output into days and derived units
pub fn finalize(raw_log_days: f64) -> LongevityEstimate {
    // expm1 of the clipped bound can overshoot MAX by an ulp
    let days = clip_log_days(raw_log_days)
        .exp_m1()
        .clamp(0.0, MAX_LONGEVITY_DAYS);
    let months = days / DAYS_PER_MONTH;
    let years = months / 12.0;
    LongevityEstimate {
        days,
        months,
        years,
    }
}

/// Map base outputs, already stacked in [`STACKING_ORDER`], through the
/// linear meta-model. Fails if the meta-model was fit on a different arity.
pub fn combine(base_outputs: &[f64], meta: &LinearModel) -> Result<f64> {
    meta.evaluate(base_outputs)
}
