//! Report
//!
//! The flat result record produced by one pipeline run, serialized for the
//! dashboard: predictions, residuals, tail fits, risk metrics, and region
//! effects, plus the predictions CSV dump.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::booster::JsonIO;
use crate::causal::RegionEffect;
use crate::errors::RiskError;
use crate::evt::{GevFit, GpdFit};

/// A named density curve sampled over a grid, ready for plotting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityCurve {
    /// Curve label, e.g. `GEV` or `POT`.
    pub label: String,
    /// Grid of evaluation points.
    pub x: Vec<f64>,
    /// Density at each grid point.
    pub density: Vec<f64>,
}

/// Everything one model run feeds to the dashboard.
///
/// A report only exists as the output of a completed pipeline run, so every
/// field is always populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    /// Observed test-set target values.
    pub observed: Vec<f64>,
    /// Lower-quantile predictions.
    pub q10: Vec<f64>,
    /// Median predictions.
    pub q50: Vec<f64>,
    /// Upper-quantile predictions.
    pub q90: Vec<f64>,
    /// Median-model residuals, `observed - q50`.
    pub residuals: Vec<f64>,

    /// GEV fit over all residuals.
    pub gev_params: GevFit,
    /// GPD fit over the peaks-over-threshold excesses.
    pub pot_params: GpdFit,
    /// Peaks-over-threshold threshold.
    pub threshold: f64,
    /// Tail density curves over the residual range.
    pub tail_curves: Vec<DensityCurve>,

    /// RMSE of the median predictions, rounded to three decimals.
    pub rmse: f64,
    /// R-squared of the median predictions.
    pub r2: f64,
    /// Prediction interval coverage probability.
    pub picp: f64,
    /// Mean interval width.
    pub sharpness: f64,
    /// Coverage/width trade-off.
    pub cwt: f64,
    /// Ensemble CRPS.
    pub crps: f64,
    /// Value at Risk of the residuals.
    pub var_99: f64,
    /// Conditional Value at Risk of the residuals.
    pub cvar_99: f64,

    /// Average treatment effect per region, sorted by region name.
    pub region_ate: Vec<RegionEffect>,
}

impl JsonIO for RiskReport {}

impl RiskReport {
    /// Write the `Observed,Q10,Q50,Q90` predictions table to a CSV writer.
    pub fn write_predictions_csv<W: Write>(&self, writer: W) -> Result<(), RiskError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer
            .write_record(["Observed", "Q10", "Q50", "Q90"])
            .map_err(|e| RiskError::UnableToWrite(e.to_string()))?;
        for i in 0..self.observed.len() {
            csv_writer
                .write_record([
                    self.observed[i].to_string(),
                    self.q10[i].to_string(),
                    self.q50[i].to_string(),
                    self.q90[i].to_string(),
                ])
                .map_err(|e| RiskError::UnableToWrite(e.to_string()))?;
        }
        csv_writer.flush().map_err(|e| RiskError::UnableToWrite(e.to_string()))
    }

    /// Write the predictions table to a CSV file.
    pub fn save_predictions_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), RiskError> {
        let file = File::create(path).map_err(|e| RiskError::UnableToWrite(e.to_string()))?;
        self.write_predictions_csv(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RiskReport {
        RiskReport {
            observed: vec![3.0, 2.0],
            q10: vec![2.0, 1.0],
            q50: vec![3.1, 2.2],
            q90: vec![4.0, 3.0],
            residuals: vec![-0.1, -0.2],
            gev_params: GevFit {
                shape: 0.05,
                loc: -0.1,
                scale: 0.2,
            },
            pot_params: GpdFit {
                shape: 0.1,
                loc: 0.0,
                scale: 0.15,
            },
            threshold: 0.3,
            tail_curves: vec![DensityCurve {
                label: "GEV".to_string(),
                x: vec![-0.5, 0.0, 0.5],
                density: vec![0.1, 0.9, 0.2],
            }],
            rmse: 0.158,
            r2: 0.9,
            picp: 1.0,
            sharpness: 2.0,
            cwt: 0.5,
            crps: 0.08,
            var_99: 0.2,
            cvar_99: 0.25,
            region_ate: vec![RegionEffect {
                region: "Asia".to_string(),
                ate: 0.04,
            }],
        }
    }

    #[test]
    fn test_report_json_roundtrip() {
        let report = sample_report();
        let json = report.json_dump().unwrap();
        let loaded = RiskReport::from_json(&json).unwrap();
        assert_eq!(loaded.observed, report.observed);
        assert_eq!(loaded.rmse, report.rmse);
        assert_eq!(loaded.region_ate, report.region_ate);
        assert_eq!(loaded.gev_params.scale, report.gev_params.scale);
    }

    #[test]
    fn test_predictions_csv_layout() {
        let report = sample_report();
        let mut buf: Vec<u8> = Vec::new();
        report.write_predictions_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Observed,Q10,Q50,Q90"));
        assert_eq!(lines.next(), Some("3,2,3.1,4"));
        assert_eq!(lines.next(), Some("2,1,2.2,3"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_report_file_roundtrip() {
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = sample_report();
        report.save(&path).unwrap();
        let loaded = RiskReport::load(&path).unwrap();
        assert_eq!(loaded.threshold, report.threshold);
    }
}
