//! Gradient Booster
//!
//! A fixed-round gradient boosting machine over [`crate::tree::Tree`]s:
//! many shallow trees, a small learning rate, and NaN-aware split search.
use hashbrown::HashMap;
use log::info;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::Matrix;
use crate::errors::RiskError;
use crate::objective::{Objective, ObjectiveFunction};
use crate::tree::{Tree, TreeParams};

fn default_n_rounds() -> usize {
    300
}
fn default_learning_rate() -> f64 {
    0.05
}
fn default_max_depth() -> usize {
    6
}
fn default_min_samples_leaf() -> usize {
    20
}
fn default_lambda() -> f64 {
    1.0
}
fn default_subsample() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    42
}
fn default_log_iterations() -> usize {
    0
}

/// Configuration for the [`GradientBooster`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoosterConfig {
    /// Learning objective.
    pub objective: Objective,
    /// Number of boosting rounds.
    #[serde(default = "default_n_rounds")]
    pub n_rounds: usize,
    /// Step size applied to each tree's leaf weights.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Maximum depth of each tree.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Minimum number of samples in each leaf.
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// L2 regularization on leaf weights.
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Fraction of rows sampled for each tree; 1.0 disables sampling.
    #[serde(default = "default_subsample")]
    pub subsample: f64,
    /// Seed for row sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Logging frequency (every N rounds); zero disables round logging.
    #[serde(default = "default_log_iterations")]
    pub log_iterations: usize,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        BoosterConfig {
            objective: Objective::SquaredLoss,
            n_rounds: default_n_rounds(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            lambda: default_lambda(),
            subsample: default_subsample(),
            seed: default_seed(),
            log_iterations: default_log_iterations(),
        }
    }
}

impl BoosterConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        if let Objective::QuantileLoss { quantile } = self.objective {
            if !(quantile > 0.0 && quantile < 1.0) {
                return Err(RiskError::InvalidParameter(
                    "quantile".to_string(),
                    "a value strictly between 0 and 1".to_string(),
                    quantile.to_string(),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.subsample) || self.subsample == 0.0 {
            return Err(RiskError::InvalidParameter(
                "subsample".to_string(),
                "a value in (0, 1]".to_string(),
                self.subsample.to_string(),
            ));
        }
        if self.learning_rate <= 0.0 {
            return Err(RiskError::InvalidParameter(
                "learning_rate".to_string(),
                "a positive value".to_string(),
                self.learning_rate.to_string(),
            ));
        }
        Ok(())
    }
}

/// Save and load serde-backed models and configs as JSON.
pub trait JsonIO: Serialize + DeserializeOwned + Sized {
    /// Dump as a JSON string.
    fn json_dump(&self) -> Result<String, RiskError> {
        serde_json::to_string(self).map_err(|e| RiskError::UnableToWrite(e.to_string()))
    }

    /// Load from a JSON string.
    fn from_json(json_str: &str) -> Result<Self, RiskError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| RiskError::UnableToRead(e.to_string()))
    }

    /// Save as a JSON file.
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), RiskError> {
        fs::write(path, self.json_dump()?).map_err(|e| RiskError::UnableToWrite(e.to_string()))
    }

    /// Load from a JSON file.
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, RiskError> {
        let json_str = fs::read_to_string(path).map_err(|e| RiskError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl JsonIO for BoosterConfig {}

/// Gradient boosting machine.
#[derive(Clone, Serialize, Deserialize)]
pub struct GradientBooster {
    /// Booster configuration.
    pub cfg: BoosterConfig,
    /// The constant prediction every tree corrects.
    pub base_score: f64,
    /// Fitted trees.
    pub trees: Vec<Tree>,
    /// Free-form metadata carried with the model.
    pub metadata: HashMap<String, String>,
}

impl JsonIO for GradientBooster {}

impl Default for GradientBooster {
    fn default() -> Self {
        GradientBooster {
            cfg: BoosterConfig::default(),
            base_score: f64::NAN,
            trees: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

impl GradientBooster {
    pub fn new(cfg: BoosterConfig) -> Result<Self, RiskError> {
        cfg.validate()?;
        Ok(GradientBooster {
            cfg,
            base_score: f64::NAN,
            trees: Vec::new(),
            metadata: HashMap::new(),
        })
    }

    /// Set the objective, builder style.
    pub fn set_objective(mut self, objective: Objective) -> Self {
        self.cfg.objective = objective;
        self
    }

    /// Fit the booster on a provided dataset.
    ///
    /// * `data` - Feature matrix.
    /// * `y` - Target values, one per matrix row.
    pub fn fit(&mut self, data: &Matrix<f64>, y: &[f64]) -> Result<(), RiskError> {
        if data.rows != y.len() {
            return Err(RiskError::InvalidParameter(
                "y".to_string(),
                format!("{} values", data.rows),
                y.len().to_string(),
            ));
        }
        if data.rows == 0 {
            return Err(RiskError::EmptyDataset("target".to_string()));
        }
        self.trees.clear();

        let params = TreeParams {
            max_depth: self.cfg.max_depth,
            min_samples_leaf: self.cfg.min_samples_leaf,
            lambda: self.cfg.lambda,
            eta: self.cfg.learning_rate,
        };
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);

        self.base_score = self.cfg.objective.initial_value(y);
        let mut yhat = vec![self.base_score; y.len()];

        for round in 0..self.cfg.n_rounds {
            let (grad, hess) = self.cfg.objective.gradient(y, &yhat);

            let index: Vec<usize> = if self.cfg.subsample < 1.0 {
                (0..data.rows).filter(|_| rng.gen::<f64>() < self.cfg.subsample).collect()
            } else {
                (0..data.rows).collect()
            };
            if index.is_empty() {
                continue;
            }

            let mut tree = Tree::new();
            tree.fit(data, index, &grad, hess.as_deref(), &params);

            // Root that cannot be split means the gradients carry no more signal.
            if tree.nodes.len() == 1 && round > 0 {
                break;
            }

            for (p, t) in yhat.iter_mut().zip(tree.predict(data, true)) {
                *p += t;
            }

            if self.cfg.log_iterations > 0 && round % self.cfg.log_iterations == 0 {
                let loss = self.cfg.objective.loss(y, &yhat);
                info!(
                    "round {:0?}, tree.nodes: {:1?}, tree.depth: {:2?}, loss: {:3?}",
                    round,
                    tree.nodes.len(),
                    tree.depth,
                    loss.iter().sum::<f64>() / loss.len() as f64,
                );
            }

            self.trees.push(tree);
        }
        Ok(())
    }

    /// Predict with the fitted booster. For `LogLoss` the output is in
    /// log-odds space; see [`GradientBooster::predict_proba`].
    pub fn predict(&self, data: &Matrix<f64>, parallel: bool) -> Vec<f64> {
        let mut out = vec![self.base_score; data.rows];
        for tree in &self.trees {
            for (p, t) in out.iter_mut().zip(tree.predict(data, parallel)) {
                *p += t;
            }
        }
        out
    }

    /// Predicted probabilities for a `LogLoss` booster.
    pub fn predict_proba(&self, data: &Matrix<f64>, parallel: bool) -> Vec<f64> {
        self.predict(data, parallel)
            .iter()
            .map(|lo| 1.0 / (1.0 + (-lo).exp()))
            .collect()
    }

    /// Get reference to the fitted trees.
    pub fn get_prediction_trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Insert metadata
    /// * `key` - String value for the metadata key.
    /// * `value` - value to assign to the metadata key.
    pub fn insert_metadata(&mut self, key: String, value: String) {
        self.metadata.insert(key, value);
    }

    /// Get Metadata
    /// * `key` - Get the associated value for the metadata key.
    pub fn get_metadata(&self, key: &str) -> Option<String> {
        self.metadata.get(key).cloned()
    }
}
