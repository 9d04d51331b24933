//! Utility functions
//!
//! Small numeric helpers shared across the crate.
use crate::errors::RiskError;

/// Arithmetic mean of a slice. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Linearly interpolated percentiles of an unsorted sample.
///
/// * `v` - Values of which to find percentiles.
/// * `levels` - Percentile levels as fractions in `[0, 1]`, in any order.
///
/// Uses the linear interpolation rule: for level `q`, the percentile sits at
/// rank `(n - 1) * q` in the sorted sample, interpolating between the
/// neighboring order statistics.
pub fn percentiles(v: &[f64], levels: &[f64]) -> Vec<f64> {
    assert!(!v.is_empty(), "No values were provided");
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    levels
        .iter()
        .map(|&q| {
            let h = (sorted.len() - 1) as f64 * q;
            let lo = h.floor() as usize;
            let hi = h.ceil() as usize;
            sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
        })
        .collect()
}

/// Single percentile convenience wrapper over [`percentiles`].
pub fn percentile(v: &[f64], level: f64) -> f64 {
    percentiles(v, &[level])[0]
}

/// Evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    assert!(num >= 2, "linspace requires at least two points");
    let step = (stop - start) / (num - 1) as f64;
    (0..num).map(|i| start + step * i as f64).collect()
}

/// Round to a number of decimal digits.
pub fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}

/// Solve the symmetric positive-definite system `a x = b` by Cholesky
/// decomposition, `a` given as a flat row-major `d x d` buffer.
///
/// A small diagonal jitter is retried when the decomposition encounters a
/// non-positive pivot, which happens for near-singular Newton steps.
pub fn solve_symmetric(a: &[f64], b: &[f64]) -> Result<Vec<f64>, RiskError> {
    let d = b.len();
    assert_eq!(a.len(), d * d);

    let mut jitter = 0.0;
    for _ in 0..6 {
        match cholesky_solve(a, b, d, jitter) {
            Some(x) => return Ok(x),
            None => {
                jitter = if jitter == 0.0 { 1e-10 } else { jitter * 100.0 };
            }
        }
    }
    Err(RiskError::FitNotConverged(
        "Linear solve".to_string(),
        "matrix is not positive definite".to_string(),
    ))
}

fn cholesky_solve(a: &[f64], b: &[f64], d: usize, jitter: f64) -> Option<Vec<f64>> {
    // Lower-triangular factor, row-major.
    let mut l = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..=i {
            let mut s = a[i * d + j];
            if i == j {
                s += jitter;
            }
            for k in 0..j {
                s -= l[i * d + k] * l[j * d + k];
            }
            if i == j {
                if s <= 0.0 || !s.is_finite() {
                    return None;
                }
                l[i * d + i] = s.sqrt();
            } else {
                l[i * d + j] = s / l[j * d + j];
            }
        }
    }
    // Forward solve L z = b.
    let mut z = vec![0.0; d];
    for i in 0..d {
        let mut s = b[i];
        for k in 0..i {
            s -= l[i * d + k] * z[k];
        }
        z[i] = s / l[i * d + i];
    }
    // Back solve L^T x = z.
    let mut x = vec![0.0; d];
    for i in (0..d).rev() {
        let mut s = z[i];
        for k in (i + 1)..d {
            s -= l[k * d + i] * x[k];
        }
        x[i] = s / l[i * d + i];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round() {
        assert_eq!(0.3, precision_round(0.3333, 1));
        assert_eq!(0.2343, precision_round(0.2343123123123, 4));
    }

    #[test]
    fn test_mean_std() {
        let v = vec![2., 4., 4., 4., 5., 5., 7., 9.];
        assert_eq!(mean(&v), 5.0);
        assert!((std_dev(&v) - 2.13809).abs() < 1e-5);
    }

    #[test]
    fn test_percentiles() {
        let v = vec![4., 5., 6., 1., 2., 3., 7., 8., 9., 10.];
        let p = percentiles(&v, &[0.0, 0.5, 1.0]);
        assert_eq!(p, vec![1.0, 5.5, 10.0]);
        // Interpolated value between order statistics.
        assert_eq!(precision_round(percentile(&v, 0.95), 6), 9.55);
    }

    #[test]
    fn test_linspace() {
        let xs = linspace(0.0, 1.0, 5);
        assert_eq!(xs, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_solve_symmetric() {
        // [[4, 2], [2, 3]] x = [10, 8] -> x = [1.75, 1.5]
        let a = vec![4., 2., 2., 3.];
        let b = vec![10., 8.];
        let x = solve_symmetric(&a, &b).unwrap();
        assert!((x[0] - 1.75).abs() < 1e-12);
        assert!((x[1] - 1.5).abs() < 1e-12);
    }
}
