//! Optimization
//!
//! Derivative-free Nelder-Mead simplex minimization, used for the
//! maximum-likelihood tail fits.

/// Configuration for [`nelder_mead`].
#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    /// Maximum number of iterations.
    pub max_iter: usize,
    /// Convergence tolerance on the simplex function-value spread.
    pub tol: f64,
    /// Reflection coefficient.
    pub alpha: f64,
    /// Expansion coefficient.
    pub gamma: f64,
    /// Contraction coefficient.
    pub rho: f64,
    /// Shrink coefficient.
    pub sigma: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        NelderMeadConfig {
            max_iter: 1000,
            tol: 1e-9,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
        }
    }
}

/// Result of a [`nelder_mead`] run.
#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    /// Best point found.
    pub x: Vec<f64>,
    /// Function value at the best point.
    pub fx: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the function-value spread fell below the tolerance.
    pub converged: bool,
}

/// Minimize `f` starting from `x0` with the Nelder-Mead simplex method.
///
/// The objective may return `f64::INFINITY` outside its feasible region;
/// infeasible vertices are simply reflected away from.
pub fn nelder_mead<F>(f: F, x0: &[f64], cfg: &NelderMeadConfig) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();

    // Initial simplex: x0 plus one perturbed vertex per dimension.
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut v = x0.to_vec();
        v[i] = if v[i] != 0.0 { v[i] * 1.05 } else { 0.00025 };
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| f(v)).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < cfg.max_iter {
        iterations += 1;

        // Order vertices by function value.
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        if (values[n] - values[0]).abs() < cfg.tol {
            converged = true;
            break;
        }

        // Centroid of all vertices but the worst.
        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();

        let reflect: Vec<f64> = (0..n)
            .map(|j| centroid[j] + cfg.alpha * (centroid[j] - simplex[n][j]))
            .collect();
        let f_reflect = f(&reflect);

        if f_reflect < values[0] {
            // Try to expand past the reflection.
            let expand: Vec<f64> = (0..n)
                .map(|j| centroid[j] + cfg.gamma * (reflect[j] - centroid[j]))
                .collect();
            let f_expand = f(&expand);
            if f_expand < f_reflect {
                simplex[n] = expand;
                values[n] = f_expand;
            } else {
                simplex[n] = reflect;
                values[n] = f_reflect;
            }
            continue;
        }

        if f_reflect < values[n - 1] {
            simplex[n] = reflect;
            values[n] = f_reflect;
            continue;
        }

        // Contract toward the better of the worst vertex and its reflection.
        let (towards, f_towards) = if f_reflect < values[n] {
            (&reflect, f_reflect)
        } else {
            (&simplex[n], values[n])
        };
        let contract: Vec<f64> = (0..n)
            .map(|j| centroid[j] + cfg.rho * (towards[j] - centroid[j]))
            .collect();
        let f_contract = f(&contract);
        if f_contract < f_towards {
            simplex[n] = contract;
            values[n] = f_contract;
            continue;
        }

        // Shrink everything toward the best vertex.
        for i in 1..=n {
            for j in 0..n {
                simplex[i][j] = simplex[0][j] + cfg.sigma * (simplex[i][j] - simplex[0][j]);
            }
            values[i] = f(&simplex[i]);
        }
    }

    let mut best = 0;
    for i in 1..=n {
        if values[i] < values[best] {
            best = i;
        }
    }
    NelderMeadResult {
        x: simplex[best].clone(),
        fx: values[best],
        iterations,
        converged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_minimum() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + (x[1] + 1.0).powi(2);
        let res = nelder_mead(f, &[0.0, 0.0], &NelderMeadConfig::default());
        assert!(res.converged);
        assert!((res.x[0] - 3.0).abs() < 1e-4);
        assert!((res.x[1] + 1.0).abs() < 1e-4);
        assert!(res.fx < 1e-7);
    }

    #[test]
    fn test_rosenbrock_improves() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let res = nelder_mead(f, &[-1.2, 1.0], &NelderMeadConfig::default());
        assert!(res.fx < f(&[-1.2, 1.0]));
    }

    #[test]
    fn test_infeasible_region_avoided() {
        // Minimum of (x - 2)^2 restricted to x >= 0.
        let f = |x: &[f64]| {
            if x[0] < 0.0 {
                f64::INFINITY
            } else {
                (x[0] - 2.0).powi(2)
            }
        };
        let res = nelder_mead(f, &[5.0], &NelderMeadConfig::default());
        assert!((res.x[0] - 2.0).abs() < 1e-4);
    }
}
