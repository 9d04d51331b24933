//! Causal effects
//!
//! Doubly-robust (AIPW) treatment-effect estimation: a logistic-regression
//! propensity model, per-unit pseudo-outcomes, and region-level averages.
use hashbrown::HashMap;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::data::Matrix;
use crate::errors::RiskError;
use crate::utils::solve_symmetric;

/// Propensity clamp keeping the inverse weights bounded.
const PROPENSITY_CLAMP: f64 = 1e-3;

/// Binary logistic regression fit by Newton-Raphson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Per-feature coefficients.
    pub coefficients: Vec<f64>,
    /// Intercept term.
    pub intercept: f64,
    /// Maximum Newton iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the step's max coefficient change.
    pub tol: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        LogisticRegression {
            coefficients: Vec::new(),
            intercept: 0.0,
            max_iter: 200,
            tol: 1e-6,
        }
    }
}

impl LogisticRegression {
    /// Fit the model on a 0/1 target.
    ///
    /// Missing feature values (NaN) are treated as zero; the one-hot and
    /// numeric columns the pipeline produces keep this benign. Failing to
    /// converge within `max_iter` logs a warning and keeps the last iterate,
    /// matching how scikit-learn behaves at its iteration limit.
    pub fn fit(&mut self, data: &Matrix<f64>, target: &[f64]) -> Result<(), RiskError> {
        if data.rows != target.len() {
            return Err(RiskError::InvalidParameter(
                "target".to_string(),
                format!("{} values", data.rows),
                target.len().to_string(),
            ));
        }
        if target.iter().any(|t| *t != 0.0 && *t != 1.0) {
            return Err(RiskError::InvalidParameter(
                "target".to_string(),
                "0/1 treatment indicators".to_string(),
                "non-binary values".to_string(),
            ));
        }

        let d = data.cols + 1; // intercept last
        let mut beta = vec![0.0; d];
        // Small ridge keeps the hessian invertible under separation.
        let ridge = 1e-6;

        let mut converged = false;
        for _ in 0..self.max_iter {
            let eta: Vec<f64> = (0..data.rows).map(|i| self.linear_term(data, i, &beta)).collect();
            let p: Vec<f64> = eta.iter().map(|e| 1.0 / (1.0 + (-e).exp())).collect();

            // Gradient of the negative log-likelihood and its hessian.
            let mut grad = vec![0.0; d];
            let mut hess = vec![0.0; d * d];
            for i in 0..data.rows {
                let r = p[i] - target[i];
                let w = (p[i] * (1.0 - p[i])).max(1e-10);
                let xi = |j: usize| {
                    if j == d - 1 {
                        1.0
                    } else {
                        let v = *data.get(i, j);
                        if v.is_nan() {
                            0.0
                        } else {
                            v
                        }
                    }
                };
                for j in 0..d {
                    let xj = xi(j);
                    grad[j] += r * xj;
                    for k in 0..=j {
                        hess[j * d + k] += w * xj * xi(k);
                    }
                }
            }
            for j in 0..d {
                grad[j] += ridge * beta[j];
                hess[j * d + j] += ridge;
                for k in 0..j {
                    hess[k * d + j] = hess[j * d + k];
                }
            }

            let step = solve_symmetric(&hess, &grad)?;
            let mut max_change = 0.0_f64;
            for j in 0..d {
                beta[j] -= step[j];
                max_change = max_change.max(step[j].abs());
            }
            if max_change < self.tol {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!("Propensity model reached max_iter={} before converging.", self.max_iter);
        }

        self.intercept = beta[d - 1];
        beta.truncate(d - 1);
        self.coefficients = beta;
        Ok(())
    }

    fn linear_term(&self, data: &Matrix<f64>, row: usize, beta: &[f64]) -> f64 {
        let d = data.cols;
        let mut eta = beta[d];
        for j in 0..d {
            let v = *data.get(row, j);
            if !v.is_nan() {
                eta += beta[j] * v;
            }
        }
        eta
    }

    /// Predicted treatment probabilities.
    pub fn predict_proba(&self, data: &Matrix<f64>) -> Vec<f64> {
        (0..data.rows)
            .map(|i| {
                let mut eta = self.intercept;
                for j in 0..data.cols {
                    let v = *data.get(i, j);
                    if !v.is_nan() {
                        eta += self.coefficients[j] * v;
                    }
                }
                1.0 / (1.0 + (-eta).exp())
            })
            .collect()
    }
}

/// Average treatment effect of one region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionEffect {
    /// Region label.
    pub region: String,
    /// Mean AIPW pseudo-outcome over the region's units.
    pub ate: f64,
}

/// Per-unit AIPW (doubly robust) pseudo-outcomes.
///
/// `gamma_i = (mu1 - mu0) + w_i (y_i - mu1) / e_i - (1 - w_i)(y_i - mu0) / (1 - e_i)`
///
/// Propensities are clamped away from zero and one so the inverse weights
/// stay bounded.
pub fn doubly_robust_effects(
    y: &[f64],
    mu1: &[f64],
    mu0: &[f64],
    treatment: &[f64],
    propensity: &[f64],
) -> Vec<f64> {
    y.iter()
        .enumerate()
        .map(|(i, yi)| {
            let m1 = mu1[i];
            let m0 = mu0[i];
            let e = propensity[i].clamp(PROPENSITY_CLAMP, 1.0 - PROPENSITY_CLAMP);
            let w = treatment[i];

            (m1 - m0) + w * (yi - m1) / e - (1.0 - w) * (yi - m0) / (1.0 - e)
        })
        .collect()
}

/// Group pseudo-outcomes by region label and average them, sorted by region
/// name for stable output.
pub fn region_average_effects(regions: &[String], effects: &[f64]) -> Vec<RegionEffect> {
    let mut sums: HashMap<&String, (f64, usize)> = HashMap::new();
    for (region, tau) in regions.iter().zip(effects) {
        let entry = sums.entry(region).or_insert((0.0, 0));
        entry.0 += tau;
        entry.1 += 1;
    }
    let mut out: Vec<RegionEffect> = sums
        .into_iter()
        .map(|(region, (total, count))| RegionEffect {
            region: region.clone(),
            ate: total / count as f64,
        })
        .collect();
    out.sort_by(|a, b| a.region.cmp(&b.region));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logistic_recovers_direction() {
        // Treatment probability increases with the single feature; the two
        // classes overlap so the likelihood has a finite maximum.
        let x: Vec<f64> = (0..40).map(|i| i as f64 / 10.0).collect();
        let w: Vec<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let treated = if i % 7 == 0 { *v <= 2.0 } else { *v > 2.0 };
                if treated {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        let m = Matrix::new(&x, 40, 1);
        let mut lr = LogisticRegression::default();
        lr.fit(&m, &w).unwrap();

        assert!(lr.coefficients[0] > 0.0);
        let p = lr.predict_proba(&m);
        assert!(p[0] < 0.5);
        assert!(p[39] > 0.5);
    }

    #[test]
    fn test_logistic_balanced_intercept() {
        // With a constant feature only the intercept matters: half treated
        // means a probability of one half everywhere.
        let x = vec![1.0; 10];
        let w = vec![0., 0., 0., 0., 0., 1., 1., 1., 1., 1.];
        let m = Matrix::new(&x, 10, 1);
        let mut lr = LogisticRegression::default();
        lr.fit(&m, &w).unwrap();
        let p = lr.predict_proba(&m);
        assert!((p[0] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_logistic_rejects_non_binary_target() {
        let x = vec![1.0, 2.0];
        let w = vec![0.0, 2.0];
        let m = Matrix::new(&x, 2, 1);
        let mut lr = LogisticRegression::default();
        assert!(matches!(lr.fit(&m, &w), Err(RiskError::InvalidParameter(_, _, _))));
    }

    #[test]
    fn test_doubly_robust_on_outcome_model() {
        // Treated unit observed exactly at mu1: the correction term vanishes
        // and the pseudo-outcome is the plain model difference.
        let y = vec![1.2];
        let mu1 = vec![1.2];
        let mu0 = vec![1.0];
        let gamma = doubly_robust_effects(&y, &mu1, &mu0, &[1.0], &[0.5]);
        assert!((gamma[0] - 0.2).abs() < 1e-12);

        // Control unit observed above mu0 drags the effect down.
        let gamma = doubly_robust_effects(&[1.5], &mu1, &mu0, &[0.0], &[0.5]);
        assert!((gamma[0] - (0.2 - 0.5 / 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_propensity_clamping() {
        let gamma = doubly_robust_effects(&[2.0], &[1.0], &[0.0], &[1.0], &[0.0]);
        // e clamps to 1e-3 rather than dividing by zero.
        assert!((gamma[0] - (1.0 + 1.0 / 1e-3)).abs() < 1e-9);
    }

    #[test]
    fn test_region_average_sorted() {
        let regions: Vec<String> = ["Asia", "Africa", "Asia", "Europe"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let effects = vec![1.0, 2.0, 3.0, 4.0];
        let out = region_average_effects(&regions, &effects);
        assert_eq!(
            out,
            vec![
                RegionEffect {
                    region: "Africa".to_string(),
                    ate: 2.0
                },
                RegionEffect {
                    region: "Asia".to_string(),
                    ate: 2.0
                },
                RegionEffect {
                    region: "Europe".to_string(),
                    ate: 4.0
                },
            ]
        );
    }
}
