//! Errors
//!
//! Custom error types used throughout the `agrorisk` crate.
use thiserror::Error;

/// Errors that can occur while loading data, fitting models, or writing results.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Unable to read an input file or stream.
    #[error("Unable to read input: {0}")]
    UnableToRead(String),
    /// Unable to write an output file.
    #[error("Unable to write output: {0}")]
    UnableToWrite(String),
    /// A CSV record could not be parsed.
    #[error("Malformed record at line {0}: {1}")]
    MalformedRecord(u64, String),
    /// A required column is absent from the dataset.
    #[error("Required column {0} not found in the dataset.")]
    MissingColumn(String),
    /// No usable rows remain after filtering.
    #[error("No rows with a non-missing {0} value remain in the dataset.")]
    EmptyDataset(String),
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// A distribution or model fit did not converge.
    #[error("{0} fit failed to converge: {1}")]
    FitNotConverged(String, String),
    /// Too few observations to fit a distribution or model.
    #[error("Not enough data to fit {0}: {1} observations provided.")]
    NotEnoughData(String, usize),
}
