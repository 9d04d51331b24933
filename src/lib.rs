//! AgroRisk: crop-yield risk modeling.
//!
//! A batch pipeline over tabular crop-yield data: gradient-boosted quantile
//! regression for prediction intervals, interval and probabilistic scoring,
//! extreme-value fits (GEV and peaks-over-threshold GPD) on the residual
//! tails with VaR/CVaR, and doubly-robust regional treatment-effect
//! estimates, all serialized into a single report.
//!
//! ```no_run
//! use agrorisk::{JsonIO, PipelineConfig, RiskPipeline};
//!
//! let pipeline = RiskPipeline::new(PipelineConfig::default())?;
//! let report = pipeline.run_csv_path("yields.csv")?;
//! report.save_predictions_csv("predictions.csv")?;
//! report.save("report.json")?;
//! # Ok::<(), agrorisk::errors::RiskError>(())
//! ```
pub mod booster;
pub mod causal;
pub mod data;
pub mod dataset;
pub mod errors;
pub mod evt;
pub mod metrics;
pub mod objective;
pub mod optimize;
pub mod pipeline;
pub mod report;
pub mod tree;
pub mod utils;

pub use booster::{BoosterConfig, GradientBooster, JsonIO};
pub use data::Matrix;
pub use dataset::Dataset;
pub use errors::RiskError;
pub use metrics::IntervalMetrics;
pub use objective::Objective;
pub use pipeline::{PipelineConfig, RiskPipeline};
pub use report::RiskReport;
