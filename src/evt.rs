//! Extreme-value tails
//!
//! Maximum-likelihood fits of the Generalized Extreme Value (GEV)
//! distribution over residuals and of the Generalized Pareto Distribution
//! (GPD) over peaks-over-threshold excesses, plus the VaR/CVaR tail risk
//! measures.
//!
//! Shape parameters follow the `scipy.stats` sign conventions
//! (`genextreme` / `genpareto`), so serialized parameters are directly
//! comparable with the dashboards the report feeds.
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::RiskError;
use crate::optimize::{nelder_mead, NelderMeadConfig};
use crate::utils::{mean, percentile, std_dev};

/// Shape values closer to zero than this are treated as the Gumbel /
/// exponential limit.
const SHAPE_EPS: f64 = 1e-6;
/// Minimum sample size for a GEV fit.
const MIN_GEV_SAMPLE: usize = 8;
/// Minimum number of threshold excesses for a GPD fit: one more than the
/// two free parameters. A 0.95 threshold over a small test split leaves
/// very few excesses, and runs on ordinary mid-sized uploads still have to
/// produce a tail fit.
const MIN_POT_SAMPLE: usize = 3;

/// Euler-Mascheroni constant, for the Gumbel moment starting point.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Fitted GEV distribution, `scipy.stats.genextreme` parameterization:
/// the density support requires `1 - shape * (x - loc) / scale > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GevFit {
    pub shape: f64,
    pub loc: f64,
    pub scale: f64,
}

impl GevFit {
    /// Fit by maximum likelihood over the whole sample.
    pub fn fit(sample: &[f64]) -> Result<Self, RiskError> {
        if sample.len() < MIN_GEV_SAMPLE {
            return Err(RiskError::NotEnoughData("GEV".to_string(), sample.len()));
        }
        let sd = std_dev(sample);
        if !(sd > 0.0) {
            return Err(RiskError::FitNotConverged(
                "GEV".to_string(),
                "sample has no variance".to_string(),
            ));
        }

        // Gumbel moment estimators seed the search.
        let scale0 = sd * 6.0_f64.sqrt() / std::f64::consts::PI;
        let loc0 = mean(sample) - EULER_GAMMA * scale0;
        let x0 = [0.1, loc0, scale0.ln()];

        let nll = |p: &[f64]| {
            let (shape, loc, scale) = (p[0], p[1], p[2].exp());
            -sample.iter().map(|&x| gev_log_pdf(x, shape, loc, scale)).sum::<f64>()
        };
        let res = nelder_mead(nll, &x0, &NelderMeadConfig::default());
        if !res.fx.is_finite() {
            return Err(RiskError::FitNotConverged(
                "GEV".to_string(),
                "no feasible parameters found".to_string(),
            ));
        }
        if !res.converged {
            warn!("GEV fit stopped at the iteration limit; parameters may be rough.");
        }
        Ok(GevFit {
            shape: res.x[0],
            loc: res.x[1],
            scale: res.x[2].exp(),
        })
    }

    /// Probability density at `x`; zero outside the support.
    pub fn pdf(&self, x: f64) -> f64 {
        gev_log_pdf(x, self.shape, self.loc, self.scale).exp()
    }

    /// Density sampled over a grid of points, for plotting.
    pub fn density_curve(&self, grid: &[f64]) -> Vec<f64> {
        grid.iter().map(|&x| self.pdf(x)).collect()
    }
}

fn gev_log_pdf(x: f64, shape: f64, loc: f64, scale: f64) -> f64 {
    if !(scale > 0.0) {
        return f64::NEG_INFINITY;
    }
    let z = (x - loc) / scale;
    if shape.abs() < SHAPE_EPS {
        // Gumbel limit.
        return -scale.ln() - z - (-z).exp();
    }
    let t = 1.0 - shape * z;
    if t <= 0.0 {
        return f64::NEG_INFINITY;
    }
    -scale.ln() + (1.0 / shape - 1.0) * t.ln() - t.powf(1.0 / shape)
}

/// Fitted GPD over threshold excesses, `scipy.stats.genpareto`
/// parameterization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpdFit {
    pub shape: f64,
    /// Always zero for excess fits; serialized so the parameters keep the
    /// full `(shape, loc, scale)` tuple shape.
    #[serde(default)]
    pub loc: f64,
    pub scale: f64,
}

impl GpdFit {
    /// Fit by maximum likelihood over nonnegative excesses.
    pub fn fit(excesses: &[f64]) -> Result<Self, RiskError> {
        if excesses.len() < MIN_POT_SAMPLE {
            return Err(RiskError::NotEnoughData("GPD".to_string(), excesses.len()));
        }
        let m = mean(excesses);
        let sd = std_dev(excesses);
        if !(m > 0.0) || !(sd > 0.0) {
            return Err(RiskError::FitNotConverged(
                "GPD".to_string(),
                "excesses have no spread above the threshold".to_string(),
            ));
        }

        // Method-of-moments starting point.
        let ratio = (m * m) / (sd * sd);
        let shape0 = (0.5 * (1.0 - ratio)).clamp(-0.4, 0.4);
        let scale0 = m * (1.0 - shape0);
        let x0 = [shape0, scale0.ln()];

        let nll = |p: &[f64]| {
            let (shape, scale) = (p[0], p[1].exp());
            -excesses.iter().map(|&x| gpd_log_pdf(x, shape, scale)).sum::<f64>()
        };
        let res = nelder_mead(nll, &x0, &NelderMeadConfig::default());
        if !res.fx.is_finite() {
            return Err(RiskError::FitNotConverged(
                "GPD".to_string(),
                "no feasible parameters found".to_string(),
            ));
        }
        if !res.converged {
            warn!("GPD fit stopped at the iteration limit; parameters may be rough.");
        }
        Ok(GpdFit {
            shape: res.x[0],
            loc: 0.0,
            scale: res.x[1].exp(),
        })
    }

    /// Probability density at excess `x`; zero below the threshold.
    pub fn pdf(&self, x: f64) -> f64 {
        gpd_log_pdf(x - self.loc, self.shape, self.scale).exp()
    }

    /// Density sampled over a residual grid, shifted by the peaks-over-
    /// threshold `threshold`; zero below it.
    pub fn density_curve(&self, grid: &[f64], threshold: f64) -> Vec<f64> {
        grid.iter().map(|&x| self.pdf(x - threshold)).collect()
    }
}

fn gpd_log_pdf(x: f64, shape: f64, scale: f64) -> f64 {
    if !(scale > 0.0) || x < 0.0 {
        return f64::NEG_INFINITY;
    }
    if shape.abs() < SHAPE_EPS {
        // Exponential limit.
        return -scale.ln() - x / scale;
    }
    let t = 1.0 + shape * x / scale;
    if t <= 0.0 {
        return f64::NEG_INFINITY;
    }
    -scale.ln() - (1.0 + 1.0 / shape) * t.ln()
}

/// Peaks-over-threshold level: the percentile of the residuals above which
/// excesses are collected.
pub fn pot_threshold(residuals: &[f64], level: f64) -> f64 {
    percentile(residuals, level)
}

/// Excesses above a threshold, exclusive at the threshold itself.
pub fn excesses(residuals: &[f64], threshold: f64) -> Vec<f64> {
    residuals.iter().filter(|&&r| r > threshold).map(|&r| r - threshold).collect()
}

/// Value at Risk: the `level` percentile of the residual distribution.
pub fn value_at_risk(residuals: &[f64], level: f64) -> f64 {
    percentile(residuals, level)
}

/// Conditional Value at Risk: the mean residual at or beyond the VaR.
pub fn conditional_value_at_risk(residuals: &[f64], level: f64) -> f64 {
    let var = value_at_risk(residuals, level);
    let tail: Vec<f64> = residuals.iter().copied().filter(|&r| r >= var).collect();
    mean(&tail)
}
