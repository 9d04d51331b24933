//! Dataset
//!
//! CSV ingestion and preprocessing for the crop-yield pipeline: target
//! filtering, one-hot encoding of categorical columns, missing-value
//! handling, and the seeded train/test split.
use hashbrown::HashMap;
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::data::{gather_rows, Matrix};
use crate::errors::RiskError;

/// Column name whose values, when present, label the ATE regions.
pub const REGION_COLUMN: &str = "Region";
/// Column name whose values, when present, give the 0/1 treatment indicator.
pub const TREATMENT_COLUMN: &str = "Treatment";

/// A preprocessed tabular dataset.
///
/// Features are held column-major with one column per numeric input and one
/// 0/1 column per categorical level. Rows with a missing target have already
/// been dropped; missing feature values are NaN.
#[derive(Debug)]
pub struct Dataset {
    /// Expanded feature names; categorical levels are named `column_value`.
    pub feature_names: Vec<String>,
    /// Column-major feature values.
    data: Vec<f64>,
    /// Number of rows.
    pub rows: usize,
    /// Number of expanded feature columns.
    pub cols: usize,
    /// Target values, one per row.
    pub target: Vec<f64>,
    /// Region labels, when the source had a region column.
    pub regions: Option<Vec<String>>,
    /// Treatment indicators, when the source had a treatment column.
    pub treatment: Option<Vec<f64>>,
}

/// Row indices of a train/test split.
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

enum RawColumn {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Dataset {
    /// Load a dataset from a CSV file on disk.
    ///
    /// * `path` - CSV file with a header row.
    /// * `target_column` - Name of the target column.
    pub fn from_csv_path<P: AsRef<Path>>(path: P, target_column: &str) -> Result<Self, RiskError> {
        let file = File::open(&path).map_err(|e| RiskError::UnableToRead(e.to_string()))?;
        Self::from_reader(file, target_column)
    }

    /// Load a dataset from any CSV reader.
    pub fn from_reader<R: Read>(reader: R, target_column: &str) -> Result<Self, RiskError> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(|e| RiskError::UnableToRead(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let target_idx = headers
            .iter()
            .position(|h| h == target_column)
            .ok_or_else(|| RiskError::MissingColumn(target_column.to_string()))?;

        // Materialize raw string columns, keeping only rows with a parseable target.
        let n_cols = headers.len();
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); n_cols];
        let mut target: Vec<f64> = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| RiskError::MalformedRecord(line as u64 + 2, e.to_string()))?;
            if record.len() != n_cols {
                return Err(RiskError::MalformedRecord(
                    line as u64 + 2,
                    format!("expected {} fields, found {}", n_cols, record.len()),
                ));
            }
            let t = parse_value(record.get(target_idx).unwrap_or(""));
            if t.is_nan() {
                continue;
            }
            target.push(t);
            for (col, field) in record.iter().enumerate() {
                raw[col].push(field.trim().to_string());
            }
        }
        if target.is_empty() {
            return Err(RiskError::EmptyDataset(target_column.to_string()));
        }
        let rows = target.len();

        // Passthrough columns for the causal stage.
        let regions = headers
            .iter()
            .position(|h| h == REGION_COLUMN)
            .map(|idx| raw[idx].clone());
        let treatment = headers.iter().position(|h| h == TREATMENT_COLUMN).map(|idx| {
            raw[idx]
                .iter()
                .map(|v| if parse_value(v) > 0.0 { 1.0 } else { 0.0 })
                .collect::<Vec<f64>>()
        });

        // Expand the remaining columns: numeric pass through with NaN for
        // missing, categoricals one-hot encode over their sorted levels.
        let mut feature_names = Vec::new();
        let mut data: Vec<f64> = Vec::new();
        for (idx, name) in headers.iter().enumerate() {
            if idx == target_idx {
                continue;
            }
            match classify_column(&raw[idx]) {
                RawColumn::Numeric(values) => {
                    feature_names.push(name.clone());
                    data.extend(values);
                }
                RawColumn::Categorical(values) => {
                    let mut levels: Vec<&String> = {
                        let mut seen: HashMap<&String, ()> = HashMap::new();
                        values.iter().filter(|v| !v.is_empty() && seen.insert(*v, ()).is_none()).collect()
                    };
                    levels.sort();
                    for level in levels {
                        feature_names.push(format!("{}_{}", name, level));
                        data.extend(values.iter().map(|v| if v == level { 1.0 } else { 0.0 }));
                    }
                }
            }
        }
        let cols = feature_names.len();

        info!(
            "loaded dataset: {} rows, {} expanded feature columns, target {}",
            rows, cols, target_column
        );

        Ok(Dataset {
            feature_names,
            data,
            rows,
            cols,
            target,
            regions,
            treatment,
        })
    }

    /// Borrow the features as a column-major matrix.
    pub fn matrix(&self) -> Matrix<f64> {
        Matrix::new(&self.data, self.rows, self.cols)
    }

    /// Gather the feature rows at `indices` into an owned column-major buffer.
    pub fn gather(&self, indices: &[usize]) -> Vec<f64> {
        gather_rows(&self.matrix(), indices)
    }

    /// Gather the target values at `indices`.
    pub fn gather_target(&self, indices: &[usize]) -> Vec<f64> {
        indices.iter().map(|&i| self.target[i]).collect()
    }

    /// Seeded random train/test split over row indices.
    ///
    /// * `test_fraction` - Fraction of rows assigned to the test set.
    /// * `seed` - RNG seed; a given seed always yields the same split.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<TrainTestSplit, RiskError> {
        if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
            return Err(RiskError::InvalidParameter(
                "test_fraction".to_string(),
                "a value in (0, 1)".to_string(),
                test_fraction.to_string(),
            ));
        }
        let mut index: Vec<usize> = (0..self.rows).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        index.shuffle(&mut rng);

        let n_test = ((self.rows as f64) * test_fraction).ceil() as usize;
        let n_test = n_test.clamp(1, self.rows - 1);
        let test = index[..n_test].to_vec();
        let train = index[n_test..].to_vec();
        Ok(TrainTestSplit { train, test })
    }
}

/// Parse a CSV field to f64, mapping empty and non-numeric values to NaN.
fn parse_value(field: &str) -> f64 {
    let field = field.trim();
    if field.is_empty() {
        return f64::NAN;
    }
    field.parse::<f64>().unwrap_or(f64::NAN)
}

fn classify_column(values: &[String]) -> RawColumn {
    let numeric = values.iter().all(|v| v.is_empty() || v.parse::<f64>().is_ok());
    if numeric {
        RawColumn::Numeric(values.iter().map(|v| parse_value(v)).collect())
    } else {
        RawColumn::Categorical(values.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Region,Rainfall_mm,Fertilizer,Crop_Yield_MT_per_HA
Asia,120.5,organic,3.2
Africa,80.0,mineral,2.1
Asia,95.0,organic,
Europe,110.0,mineral,4.0
America,,organic,3.5
";

    #[test]
    fn test_rows_with_missing_target_dropped() {
        let ds = Dataset::from_reader(CSV.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        assert_eq!(ds.rows, 4);
        assert_eq!(ds.target, vec![3.2, 2.1, 4.0, 3.5]);
    }

    #[test]
    fn test_one_hot_expansion() {
        let ds = Dataset::from_reader(CSV.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        assert_eq!(
            ds.feature_names,
            vec![
                "Region_Africa",
                "Region_America",
                "Region_Asia",
                "Region_Europe",
                "Rainfall_mm",
                "Fertilizer_mineral",
                "Fertilizer_organic",
            ]
        );
        let m = ds.matrix();
        // First kept row is Asia / 120.5 / organic.
        assert_eq!(m.get_row(0), vec![0.0, 0.0, 1.0, 0.0, 120.5, 0.0, 1.0]);
        // Missing rainfall becomes NaN.
        assert!(m.get(3, 4).is_nan());
    }

    #[test]
    fn test_region_passthrough() {
        let ds = Dataset::from_reader(CSV.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        let regions = ds.regions.as_ref().unwrap();
        assert_eq!(regions, &vec!["Asia", "Africa", "Europe", "America"]);
        assert!(ds.treatment.is_none());
    }

    #[test]
    fn test_treatment_passthrough() {
        let csv = "\
Treatment,Rainfall_mm,Crop_Yield_MT_per_HA
1,100.0,3.0
0,90.0,2.5
2,80.0,2.0
,70.0,1.5
";
        let ds = Dataset::from_reader(csv.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        let treatment = ds.treatment.as_ref().unwrap();
        // Anything positive counts as treated; zero and missing do not.
        assert_eq!(treatment, &vec![1.0, 0.0, 1.0, 0.0]);
        assert!(ds.regions.is_none());
    }

    #[test]
    fn test_missing_target_column() {
        let err = Dataset::from_reader(CSV.as_bytes(), "Yield").unwrap_err();
        assert!(matches!(err, RiskError::MissingColumn(_)));
    }

    #[test]
    fn test_all_targets_missing() {
        let csv = "a,b\n1.0,\n2.0,\n";
        let err = Dataset::from_reader(csv.as_bytes(), "b").unwrap_err();
        assert!(matches!(err, RiskError::EmptyDataset(_)));
    }

    #[test]
    fn test_ragged_record_rejected() {
        let csv = "a,b\n1.0,2.0\n3.0\n";
        let err = Dataset::from_reader(csv.as_bytes(), "b").unwrap_err();
        assert!(matches!(err, RiskError::MalformedRecord(3, _)));
    }

    #[test]
    fn test_train_test_split_deterministic() {
        let ds = Dataset::from_reader(CSV.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        let s1 = ds.train_test_split(0.25, 42).unwrap();
        let s2 = ds.train_test_split(0.25, 42).unwrap();
        assert_eq!(s1.test, s2.test);
        assert_eq!(s1.train, s2.train);
        assert_eq!(s1.test.len(), 1);
        assert_eq!(s1.train.len() + s1.test.len(), ds.rows);

        let s3 = ds.train_test_split(0.25, 7).unwrap();
        assert_eq!(s3.train.len() + s3.test.len(), ds.rows);
    }

    #[test]
    fn test_invalid_test_fraction() {
        let ds = Dataset::from_reader(CSV.as_bytes(), "Crop_Yield_MT_per_HA").unwrap();
        assert!(ds.train_test_split(0.0, 42).is_err());
        assert!(ds.train_test_split(1.0, 42).is_err());
    }
}
