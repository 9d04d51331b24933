//! Pipeline
//!
//! The batch run behind one dataset upload: split, fit the three quantile
//! boosters, score interval and risk metrics, fit the residual tails, and
//! estimate the doubly-robust region effects, returning a [`RiskReport`].
use log::info;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::booster::{BoosterConfig, GradientBooster, JsonIO};
use crate::causal::{doubly_robust_effects, region_average_effects, LogisticRegression};
use crate::data::Matrix;
use crate::dataset::Dataset;
use crate::errors::RiskError;
use crate::evt::{conditional_value_at_risk, excesses, pot_threshold, value_at_risk, GevFit, GpdFit};
use crate::metrics::IntervalMetrics;
use crate::objective::Objective;
use crate::report::{DensityCurve, RiskReport};
use crate::utils::{linspace, precision_round};

/// Region labels assigned when the dataset carries no region column.
const DEFAULT_REGIONS: [&str; 4] = ["Asia", "Africa", "Europe", "America"];

fn default_target_column() -> String {
    "Crop_Yield_MT_per_HA".to_string()
}
fn default_lower_quantile() -> f64 {
    0.1
}
fn default_upper_quantile() -> f64 {
    0.9
}
fn default_test_fraction() -> f64 {
    0.2
}
fn default_seed() -> u64 {
    42
}
fn default_pot_threshold_level() -> f64 {
    0.95
}
fn default_var_level() -> f64 {
    0.99
}
fn default_effect_offset() -> f64 {
    0.02
}
fn default_density_points() -> usize {
    200
}

/// Configuration of a full pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the target column in the input CSV.
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// Lower prediction-interval quantile.
    #[serde(default = "default_lower_quantile")]
    pub lower_quantile: f64,
    /// Upper prediction-interval quantile.
    #[serde(default = "default_upper_quantile")]
    pub upper_quantile: f64,
    /// Fraction of rows held out for evaluation.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Seed for the split and for any synthesized assignments.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Residual percentile used as the peaks-over-threshold threshold.
    #[serde(default = "default_pot_threshold_level")]
    pub pot_threshold_level: f64,
    /// Residual percentile used for VaR / CVaR.
    #[serde(default = "default_var_level")]
    pub var_level: f64,
    /// Offset added to / subtracted from the median for the treated and
    /// control outcome surrogates.
    #[serde(default = "default_effect_offset")]
    pub effect_offset: f64,
    /// Number of grid points in the tail density curves.
    #[serde(default = "default_density_points")]
    pub density_points: usize,
    /// Booster settings shared by the three quantile fits.
    #[serde(default)]
    pub booster: BoosterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            target_column: default_target_column(),
            lower_quantile: default_lower_quantile(),
            upper_quantile: default_upper_quantile(),
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            pot_threshold_level: default_pot_threshold_level(),
            var_level: default_var_level(),
            effect_offset: default_effect_offset(),
            density_points: default_density_points(),
            booster: BoosterConfig::default(),
        }
    }
}

impl JsonIO for PipelineConfig {}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        let in_unit = |v: f64| v > 0.0 && v < 1.0;
        if !in_unit(self.lower_quantile) || !in_unit(self.upper_quantile) || self.lower_quantile >= self.upper_quantile {
            return Err(RiskError::InvalidParameter(
                "lower_quantile/upper_quantile".to_string(),
                "0 < lower < upper < 1".to_string(),
                format!("{}/{}", self.lower_quantile, self.upper_quantile),
            ));
        }
        for (name, v) in [
            ("pot_threshold_level", self.pot_threshold_level),
            ("var_level", self.var_level),
        ] {
            if !in_unit(v) {
                return Err(RiskError::InvalidParameter(
                    name.to_string(),
                    "a value in (0, 1)".to_string(),
                    v.to_string(),
                ));
            }
        }
        if self.density_points < 2 {
            return Err(RiskError::InvalidParameter(
                "density_points".to_string(),
                "at least 2".to_string(),
                self.density_points.to_string(),
            ));
        }
        self.booster.validate()
    }
}

/// The crop-yield risk pipeline.
pub struct RiskPipeline {
    pub cfg: PipelineConfig,
}

impl Default for RiskPipeline {
    fn default() -> Self {
        RiskPipeline {
            cfg: PipelineConfig::default(),
        }
    }
}

impl RiskPipeline {
    pub fn new(cfg: PipelineConfig) -> Result<Self, RiskError> {
        cfg.validate()?;
        Ok(RiskPipeline { cfg })
    }

    /// Load a CSV and run the full pipeline on it.
    pub fn run_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<RiskReport, RiskError> {
        let dataset = Dataset::from_csv_path(path, &self.cfg.target_column)?;
        self.run(&dataset)
    }

    fn fit_quantile(
        &self,
        quantile: f64,
        train: &Matrix<f64>,
        y_train: &[f64],
        test: &Matrix<f64>,
    ) -> Result<Vec<f64>, RiskError> {
        let cfg = BoosterConfig {
            objective: Objective::QuantileLoss { quantile },
            ..self.cfg.booster.clone()
        };
        let mut booster = GradientBooster::new(cfg)?;
        booster.fit(train, y_train)?;
        info!("fit quantile {} booster with {} trees", quantile, booster.trees.len());
        Ok(booster.predict(test, false))
    }

    /// Run the full pipeline on a preprocessed dataset.
    pub fn run(&self, dataset: &Dataset) -> Result<RiskReport, RiskError> {
        self.cfg.validate()?;

        let split = dataset.train_test_split(self.cfg.test_fraction, self.cfg.seed)?;
        let x_train = dataset.gather(&split.train);
        let y_train = dataset.gather_target(&split.train);
        let x_test = dataset.gather(&split.test);
        let y_test = dataset.gather_target(&split.test);
        let train_matrix = Matrix::new(&x_train, split.train.len(), dataset.cols);
        let test_matrix = Matrix::new(&x_test, split.test.len(), dataset.cols);
        info!(
            "split {} rows into {} train / {} test",
            dataset.rows,
            split.train.len(),
            split.test.len()
        );

        // One booster per quantile, fit in parallel.
        let fit = |quantile: f64| self.fit_quantile(quantile, &train_matrix, &y_train, &test_matrix);
        let ((lo_fit, med_fit), hi_fit) = rayon::join(
            || rayon::join(|| fit(self.cfg.lower_quantile), || fit(0.5)),
            || fit(self.cfg.upper_quantile),
        );
        let (q_lo, q_med, q_hi) = (lo_fit?, med_fit?, hi_fit?);

        let metrics = IntervalMetrics::calculate(&y_test, &q_lo, &q_med, &q_hi);
        info!("interval metrics: picp {:.3}, crps {:.3}", metrics.picp, metrics.crps);

        // Residual tails.
        let residuals: Vec<f64> = y_test.iter().zip(&q_med).map(|(y, m)| y - m).collect();
        let gev_params = GevFit::fit(&residuals)?;
        let threshold = pot_threshold(&residuals, self.cfg.pot_threshold_level);
        let tail_excesses = excesses(&residuals, threshold);
        let pot_params = GpdFit::fit(&tail_excesses)?;
        let var = value_at_risk(&residuals, self.cfg.var_level);
        let cvar = conditional_value_at_risk(&residuals, self.cfg.var_level);
        info!(
            "tail fits: gev shape {:.3}, gpd shape {:.3} over {} excesses",
            gev_params.shape,
            pot_params.shape,
            tail_excesses.len()
        );

        // Region and treatment assignments for the held-out rows; synthesized
        // when the dataset does not carry them.
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let regions: Vec<String> = match &dataset.regions {
            Some(all) => split.test.iter().map(|&i| all[i].clone()).collect(),
            None => (0..split.test.len())
                .map(|_| DEFAULT_REGIONS[rng.gen_range(0..DEFAULT_REGIONS.len())].to_string())
                .collect(),
        };
        let treatment: Vec<f64> = match &dataset.treatment {
            Some(all) => split.test.iter().map(|&i| all[i]).collect(),
            None => (0..split.test.len()).map(|_| rng.gen_range(0..2) as f64).collect(),
        };

        // Doubly-robust effects with the fixed-offset outcome surrogates.
        let mut propensity_model = LogisticRegression::default();
        propensity_model.fit(&test_matrix, &treatment)?;
        let propensity = propensity_model.predict_proba(&test_matrix);
        let mu1: Vec<f64> = q_med.iter().map(|m| m + self.cfg.effect_offset).collect();
        let mu0: Vec<f64> = q_med.iter().map(|m| m - self.cfg.effect_offset).collect();
        let effects = doubly_robust_effects(&y_test, &mu1, &mu0, &treatment, &propensity);
        let region_ate = region_average_effects(&regions, &effects);
        info!("estimated treatment effects over {} regions", region_ate.len());

        // Chart-ready tail curves over the residual range.
        let r_min = residuals.iter().copied().fold(f64::INFINITY, f64::min);
        let r_max = residuals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let grid = linspace(r_min, r_max, self.cfg.density_points);
        let tail_curves = vec![
            DensityCurve {
                label: "GEV".to_string(),
                density: gev_params.density_curve(&grid),
                x: grid.clone(),
            },
            DensityCurve {
                label: "POT".to_string(),
                density: pot_params.density_curve(&grid, threshold),
                x: grid,
            },
        ];

        Ok(RiskReport {
            observed: y_test,
            q10: q_lo,
            q50: q_med,
            q90: q_hi,
            residuals,
            gev_params,
            pot_params,
            threshold,
            tail_curves,
            rmse: precision_round(metrics.rmse, 3),
            r2: precision_round(metrics.r2, 3),
            picp: precision_round(metrics.picp, 3),
            sharpness: precision_round(metrics.sharpness, 3),
            cwt: precision_round(metrics.cwt, 3),
            crps: precision_round(metrics.crps, 3),
            var_99: precision_round(var, 3),
            cvar_99: precision_round(cvar, 3),
            region_ate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    /// Synthetic crop-yield CSV with a region column, a categorical input,
    /// numeric inputs, and a few missing targets.
    fn synthetic_csv(rows: usize) -> String {
        let mut rng = StdRng::seed_from_u64(7);
        let mut csv = String::from("Region,Rainfall_mm,Soil,Temp_C,Crop_Yield_MT_per_HA\n");
        for i in 0..rows {
            let region = DEFAULT_REGIONS[i % 4];
            let rainfall = 60.0 + (i % 100) as f64;
            let soil = if i % 3 == 0 { "clay" } else { "loam" };
            let temp = 15.0 + (i % 17) as f64 / 2.0;
            if i % 97 == 0 {
                // Occasional missing target, dropped at load time.
                writeln!(csv, "{},{},{},{},", region, rainfall, soil, temp).unwrap();
                continue;
            }
            let noise: f64 = rng.gen_range(-0.4..0.4);
            let yield_t = 1.5 + 0.01 * rainfall + 0.05 * (i % 4) as f64 + noise;
            writeln!(csv, "{},{},{},{},{:.4}", region, rainfall, soil, temp, yield_t).unwrap();
        }
        csv
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            booster: BoosterConfig {
                n_rounds: 30,
                max_depth: 3,
                min_samples_leaf: 10,
                ..BoosterConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let csv = synthetic_csv(600);
        let dataset = Dataset::from_reader(csv.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        let pipeline = RiskPipeline::new(fast_config()).unwrap();
        let report = pipeline.run(&dataset).unwrap();

        let n_test = ((dataset.rows as f64) * 0.2).ceil() as usize;
        assert_eq!(report.observed.len(), n_test);
        assert_eq!(report.q10.len(), n_test);
        assert_eq!(report.q50.len(), n_test);
        assert_eq!(report.q90.len(), n_test);
        assert_eq!(report.residuals.len(), n_test);

        assert!((0.0..=1.0).contains(&report.picp));
        assert!(report.sharpness.is_finite());
        assert!(report.crps >= 0.0);
        assert!(report.cvar_99 >= report.var_99);
        assert!(report.threshold.is_finite());
        assert!(report.pot_params.scale > 0.0);
        assert!(report.gev_params.scale > 0.0);

        // All four regions appear in a 120-row test split, sorted by name.
        let names: Vec<&str> = report.region_ate.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(names, vec!["Africa", "America", "Asia", "Europe"]);

        assert_eq!(report.tail_curves.len(), 2);
        assert_eq!(report.tail_curves[0].x.len(), 200);
        // The POT curve is zero below its threshold.
        let pot = &report.tail_curves[1];
        for (x, d) in pot.x.iter().zip(&pot.density) {
            if *x < report.threshold {
                assert_eq!(*d, 0.0);
            }
        }
    }

    #[test]
    fn test_pipeline_synthesizes_region_and_treatment() {
        // No Region or Treatment column: both are drawn from the run seed,
        // and a mid-sized upload still yields a tail fit from the few
        // excesses its test split leaves.
        let mut rng = StdRng::seed_from_u64(11);
        let mut csv = String::from("Rainfall_mm,Temp_C,Crop_Yield_MT_per_HA\n");
        for i in 0..300 {
            let rainfall = 50.0 + (i % 90) as f64;
            let temp = 12.0 + (i % 23) as f64 / 3.0;
            let noise: f64 = rng.gen_range(-0.3..0.3);
            writeln!(csv, "{},{},{:.4}", rainfall, temp, 1.0 + 0.012 * rainfall + noise).unwrap();
        }
        let dataset = Dataset::from_reader(csv.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        assert!(dataset.regions.is_none());
        assert!(dataset.treatment.is_none());

        let report = RiskPipeline::new(fast_config()).unwrap().run(&dataset).unwrap();
        assert!(!report.region_ate.is_empty());
        assert!(report.region_ate.len() <= DEFAULT_REGIONS.len());
        for effect in &report.region_ate {
            assert!(DEFAULT_REGIONS.contains(&effect.region.as_str()));
            assert!(effect.ate.is_finite());
        }
        assert!(report.pot_params.scale > 0.0);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let csv = synthetic_csv(400);
        let dataset = Dataset::from_reader(csv.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        let pipeline = RiskPipeline::new(fast_config()).unwrap();
        let a = pipeline.run(&dataset).unwrap();
        let b = pipeline.run(&dataset).unwrap();
        assert_eq!(a.rmse, b.rmse);
        assert_eq!(a.q50, b.q50);
        assert_eq!(a.region_ate, b.region_ate);
    }

    #[test]
    fn test_pipeline_writes_outputs() {
        use tempfile::tempdir;

        let csv = synthetic_csv(400);
        let dataset = Dataset::from_reader(csv.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        let report = RiskPipeline::new(fast_config()).unwrap().run(&dataset).unwrap();

        let dir = tempdir().unwrap();
        let pred_path = dir.path().join("predictions.csv");
        let report_path = dir.path().join("report.json");
        report.save_predictions_csv(&pred_path).unwrap();
        report.save(&report_path).unwrap();

        let text = std::fs::read_to_string(&pred_path).unwrap();
        assert!(text.starts_with("Observed,Q10,Q50,Q90"));
        let loaded = RiskReport::load(&report_path).unwrap();
        assert_eq!(loaded.q50, report.q50);
    }

    #[test]
    fn test_invalid_quantile_order_rejected() {
        let cfg = PipelineConfig {
            lower_quantile: 0.9,
            upper_quantile: 0.1,
            ..fast_config()
        };
        assert!(RiskPipeline::new(cfg).is_err());
    }
}
