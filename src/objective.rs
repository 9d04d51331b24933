//! Objective functions
//!
//! Loss functions used by the gradient booster and the propensity model.
//! Each objective exposes its per-sample loss, gradient/hessian pair, and
//! the constant prediction that minimizes it.
use serde::{Deserialize, Serialize};

use crate::utils::{mean, percentile};

/// Behaviour shared by all objective functions.
pub trait ObjectiveFunction: Send + Sync {
    /// Per-sample loss values.
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64>;
    /// Per-sample gradients, and hessians when they are not constant.
    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Option<Vec<f64>>);
    /// The constant prediction minimizing the loss, used as the base score.
    fn initial_value(&self, y: &[f64]) -> f64;
}

/// Learning objective of a [`crate::booster::GradientBooster`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub enum Objective {
    /// Squared error, for point regression.
    SquaredLoss,
    /// Pinball loss, for quantile regression.
    QuantileLoss {
        /// Quantile level in `(0, 1)`.
        quantile: f64,
    },
    /// Logistic loss, for binary targets. Predictions are in log-odds space.
    LogLoss,
}

impl ObjectiveFunction for Objective {
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64> {
        match self {
            Objective::SquaredLoss => SquaredLoss {}.loss(y, yhat),
            Objective::QuantileLoss { quantile } => QuantileLoss { quantile: *quantile }.loss(y, yhat),
            Objective::LogLoss => LogLoss {}.loss(y, yhat),
        }
    }

    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Option<Vec<f64>>) {
        match self {
            Objective::SquaredLoss => SquaredLoss {}.gradient(y, yhat),
            Objective::QuantileLoss { quantile } => QuantileLoss { quantile: *quantile }.gradient(y, yhat),
            Objective::LogLoss => LogLoss {}.gradient(y, yhat),
        }
    }

    fn initial_value(&self, y: &[f64]) -> f64 {
        match self {
            Objective::SquaredLoss => SquaredLoss {}.initial_value(y),
            Objective::QuantileLoss { quantile } => QuantileLoss { quantile: *quantile }.initial_value(y),
            Objective::LogLoss => LogLoss {}.initial_value(y),
        }
    }
}

/// Squared error loss.
#[derive(Default)]
pub struct SquaredLoss {}

impl ObjectiveFunction for SquaredLoss {
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let s = *y_ - *yhat_;
                s * s
            })
            .collect()
    }

    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Option<Vec<f64>>) {
        let grad = y.iter().zip(yhat).map(|(y_, yhat_)| *yhat_ - *y_).collect();
        (grad, None)
    }

    fn initial_value(&self, y: &[f64]) -> f64 {
        mean(y)
    }
}

/// Pinball loss for a single quantile level.
pub struct QuantileLoss {
    /// Quantile level in `(0, 1)`.
    pub quantile: f64,
}

impl ObjectiveFunction for QuantileLoss {
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let s = *y_ - *yhat_;
                if s >= 0.0 {
                    self.quantile * s
                } else {
                    (self.quantile - 1.0) * s
                }
            })
            .collect()
    }

    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Option<Vec<f64>>) {
        let grad = y
            .iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                if *yhat_ - *y_ >= 0.0 {
                    1.0 - self.quantile
                } else {
                    -self.quantile
                }
            })
            .collect();
        (grad, None)
    }

    fn initial_value(&self, y: &[f64]) -> f64 {
        percentile(y, self.quantile)
    }
}

/// Logistic loss over a 0/1 target, parameterized in log-odds space.
#[derive(Default)]
pub struct LogLoss {}

impl ObjectiveFunction for LogLoss {
    fn loss(&self, y: &[f64], yhat: &[f64]) -> Vec<f64> {
        y.iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let p = 1.0 / (1.0 + (-*yhat_).exp());
                -(*y_ * p.ln() + (1.0 - *y_) * (1.0 - p).ln())
            })
            .collect()
    }

    fn gradient(&self, y: &[f64], yhat: &[f64]) -> (Vec<f64>, Option<Vec<f64>>) {
        let (grad, hess) = y
            .iter()
            .zip(yhat)
            .map(|(y_, yhat_)| {
                let p = 1.0 / (1.0 + (-*yhat_).exp());
                (p - *y_, p * (1.0 - p))
            })
            .unzip();
        (grad, Some(hess))
    }

    fn initial_value(&self, y: &[f64]) -> f64 {
        let ytot: f64 = y.iter().sum();
        let ntot = y.len() as f64;
        f64::ln(ytot / (ntot - ytot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::precision_round;

    #[test]
    fn test_squared_init() {
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        assert_eq!(SquaredLoss {}.initial_value(&y), 0.5);
        let y = vec![-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
        assert_eq!(SquaredLoss {}.initial_value(&y), 0.0);
    }

    #[test]
    fn test_quantile_init() {
        let y = vec![1.0, 2.0, 9.0, 3.2, 4.0];
        let med = QuantileLoss { quantile: 0.5 }.initial_value(&y);
        assert_eq!(med, 3.2);
        let hi = QuantileLoss { quantile: 1.0 }.initial_value(&y);
        assert_eq!(hi, 9.0);
    }

    #[test]
    fn test_quantile_grad_direction() {
        let y = vec![1.0, 1.0];
        let yhat = vec![0.0, 2.0];
        let (g, h) = QuantileLoss { quantile: 0.9 }.gradient(&y, &yhat);
        // Under-prediction pulls up hard at high quantiles.
        let g: Vec<f64> = g.iter().map(|v| precision_round(*v, 6)).collect();
        assert_eq!(g, vec![-0.9, 0.1]);
        assert!(h.is_none());
    }

    #[test]
    fn test_logloss_init() {
        let y = vec![0., 0., 0., 0., 1., 1.];
        assert_eq!(LogLoss {}.initial_value(&y), f64::ln(2. / 4.));
    }

    #[test]
    fn test_logloss_loss_ordering() {
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let yhat1 = vec![-1.0, -1.0, -1.0, 1.0, 1.0, 1.0];
        let yhat2 = vec![0.0, 0.0, -1.0, 1.0, 0.0, 1.0];
        let l1: f64 = LogLoss {}.loss(&y, &yhat1).iter().sum();
        let l2: f64 = LogLoss {}.loss(&y, &yhat2).iter().sum();
        assert!(l1 < l2);
    }

    #[test]
    fn test_objective_dispatch() {
        let y = vec![1.0, 2.0, 3.0];
        let q = Objective::QuantileLoss { quantile: 0.5 };
        assert_eq!(q.initial_value(&y), 2.0);
        let s = Objective::SquaredLoss;
        assert_eq!(s.initial_value(&y), 2.0);
    }
}
