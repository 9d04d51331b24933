//! Metrics
//!
//! Point, interval, and probabilistic evaluation metrics computed on the
//! held-out split.
use serde::{Deserialize, Serialize};

use crate::utils::mean;

/// Root mean squared error.
pub fn root_mean_squared_error(y: &[f64], yhat: &[f64]) -> f64 {
    let mse = y
        .iter()
        .zip(yhat)
        .map(|(y_, yhat_)| {
            let s = *y_ - *yhat_;
            s * s
        })
        .sum::<f64>()
        / y.len() as f64;
    mse.sqrt()
}

/// Coefficient of determination of the predictions.
pub fn r2_score(y: &[f64], yhat: &[f64]) -> f64 {
    let y_mean = mean(y);
    let ss_res: f64 = y
        .iter()
        .zip(yhat)
        .map(|(y_, yhat_)| {
            let s = *y_ - *yhat_;
            s * s
        })
        .sum();
    let ss_tot: f64 = y.iter().map(|y_| (*y_ - y_mean) * (*y_ - y_mean)).sum();
    1.0 - ss_res / ss_tot
}

/// Prediction Interval Coverage Probability: the fraction of observations
/// falling inside `[lo, hi]`.
pub fn interval_coverage(y: &[f64], lo: &[f64], hi: &[f64]) -> f64 {
    let covered = y
        .iter()
        .zip(lo)
        .zip(hi)
        .filter(|((y_, lo_), hi_)| **y_ >= **lo_ && **y_ <= **hi_)
        .count();
    covered as f64 / y.len() as f64
}

/// Mean prediction interval width.
pub fn interval_sharpness(lo: &[f64], hi: &[f64]) -> f64 {
    mean(&lo.iter().zip(hi).map(|(lo_, hi_)| *hi_ - *lo_).collect::<Vec<f64>>())
}

/// Average pinball loss at the given quantile level.
pub fn quantile_loss(y: &[f64], yhat: &[f64], alpha: f64) -> f64 {
    let total: f64 = y
        .iter()
        .zip(yhat)
        .map(|(y_, yhat_)| {
            let s = *y_ - *yhat_;
            if s >= 0.0 {
                alpha * s
            } else {
                (alpha - 1.0) * s
            }
        })
        .sum();
    total / y.len() as f64
}

/// Continuous Ranked Probability Score of a finite ensemble forecast,
/// averaged over observations.
///
/// For each observation `y_i` with ensemble members `x_i1..x_im`:
///
/// `crps_i = mean_j |x_ij - y_i| - 0.5 * mean_{j,k} |x_ij - x_ik|`
///
/// * `y` - Observed values.
/// * `members` - Ensemble members, one slice per member, aligned with `y`.
pub fn crps_ensemble(y: &[f64], members: &[&[f64]]) -> f64 {
    let m = members.len() as f64;
    let per_obs: Vec<f64> = y
        .iter()
        .enumerate()
        .map(|(i, y_)| {
            let spread_to_obs: f64 = members.iter().map(|x| (x[i] - y_).abs()).sum::<f64>() / m;
            let spread_internal: f64 = members
                .iter()
                .map(|xa| members.iter().map(|xb| (xa[i] - xb[i]).abs()).sum::<f64>())
                .sum::<f64>()
                / (m * m);
            spread_to_obs - 0.5 * spread_internal
        })
        .collect();
    mean(&per_obs)
}

/// Summary of interval calibration and risk metrics for one model run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalMetrics {
    /// RMSE of the median predictions.
    pub rmse: f64,
    /// R-squared of the median predictions.
    pub r2: f64,
    /// Prediction Interval Coverage Probability.
    pub picp: f64,
    /// Mean interval width.
    pub sharpness: f64,
    /// Coverage/width trade-off, PICP divided by sharpness.
    pub cwt: f64,
    /// Ensemble CRPS over the quantile members.
    pub crps: f64,
}

impl IntervalMetrics {
    /// Compute all interval metrics from observed values and the three
    /// quantile predictions.
    pub fn calculate(y: &[f64], lo: &[f64], med: &[f64], hi: &[f64]) -> Self {
        let picp = interval_coverage(y, lo, hi);
        let sharpness = interval_sharpness(lo, hi);
        IntervalMetrics {
            rmse: root_mean_squared_error(y, med),
            r2: r2_score(y, med),
            picp,
            sharpness,
            cwt: picp / sharpness,
            crps: crps_ensemble(y, &[lo, med, hi]),
        }
    }
}
