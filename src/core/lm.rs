//! Box-constrained Levenberg-Marquardt least squares for 1D profile models.
//!
//! Parameter vectors are sized at runtime because the number of Gaussian
//! components changes with the candidate model order.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LmConfig {
    /// Maximum number of accepted or rejected steps.
    pub max_iterations: usize,
    /// Converged once no parameter moves by more than this.
    pub parameter_tolerance: f64,
    /// Converged once the relative drop in chi² falls below this.
    pub chi2_tolerance: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    /// Damping at which the search is considered stalled at a minimum.
    pub max_lambda: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            parameter_tolerance: 1e-8,
            chi2_tolerance: 1e-12,
            initial_lambda: 0.001,
            lambda_up: 10.0,
            lambda_down: 0.1,
            max_lambda: 1e10,
        }
    }
}

/// A model `f(x; params)` that can be fit with [`optimize`].
pub trait LmModel {
    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Writes the partial derivatives at `x` into `row`.
    fn jacobian_row(&self, x: f64, params: &[f64], row: &mut [f64]);

    /// Parameter sets for which this returns false have an infinite
    /// objective and are never accepted.
    fn is_feasible(&self, _params: &[f64]) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: Vec<f64>,
    pub chi2: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitFailure {
    /// Objective is not finite at the initial point.
    InfeasibleStart,
    /// Iteration budget ran out before any convergence criterion held.
    NotConverged { iterations: usize },
    /// The optimizer produced NaN or infinite parameters.
    NonFinite,
}

impl fmt::Display for FitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitFailure::InfeasibleStart => write!(f, "objective is not finite at the initial point"),
            FitFailure::NotConverged { iterations } => {
                write!(f, "no convergence after {} iterations", iterations)
            }
            FitFailure::NonFinite => write!(f, "fit produced non-finite parameters"),
        }
    }
}

impl std::error::Error for FitFailure {}

/// Minimizes the squared residual of `model` against `(x, y)` starting at
/// `initial`, keeping every parameter inside `[lower[i], upper[i]]`.
pub fn optimize<M: LmModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    lower: &[f64],
    upper: &[f64],
    config: &LmConfig,
) -> Result<LmSolution, FitFailure> {
    let n = initial.len();
    let mut params = initial.to_vec();
    project(&mut params, lower, upper);

    let mut chi2 = compute_chi2(model, x, y, &params);
    if !chi2.is_finite() {
        return Err(FitFailure::InfeasibleStart);
    }

    let mut lambda = config.initial_lambda;
    let mut row = vec![0.0; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;

        let (hessian, gradient) = normal_equations(model, x, y, &params, &mut row);
        let mut damped = hessian.clone();
        for (i, r) in damped.iter_mut().enumerate() {
            r[i] += lambda * hessian[i][i].max(1e-9);
        }

        let step = solve(damped, gradient).and_then(|delta| {
            let mut candidate = params.clone();
            for (p, d) in candidate.iter_mut().zip(delta.iter()) {
                *p += d;
            }
            project(&mut candidate, lower, upper);
            let candidate_chi2 = compute_chi2(model, x, y, &candidate);
            (candidate_chi2 < chi2).then_some((candidate, candidate_chi2))
        });

        match step {
            Some((candidate, candidate_chi2)) => {
                let max_delta = candidate
                    .iter()
                    .zip(params.iter())
                    .fold(0.0f64, |m, (c, p)| m.max((c - p).abs()));
                let relative_drop = (chi2 - candidate_chi2) / chi2.max(f64::MIN_POSITIVE);
                params = candidate;
                chi2 = candidate_chi2;
                lambda *= config.lambda_down;
                if max_delta < config.parameter_tolerance || relative_drop < config.chi2_tolerance
                {
                    converged = true;
                    break;
                }
            }
            None => {
                lambda *= config.lambda_up;
                // No damped step improves the fit: the current point is a
                // minimum within the bounds.
                if lambda > config.max_lambda {
                    converged = true;
                    break;
                }
            }
        }
    }

    if params.iter().any(|p| !p.is_finite()) || !chi2.is_finite() {
        return Err(FitFailure::NonFinite);
    }
    if !converged {
        return Err(FitFailure::NotConverged { iterations });
    }
    Ok(LmSolution {
        params,
        chi2,
        iterations,
    })
}

fn project(params: &mut [f64], lower: &[f64], upper: &[f64]) {
    for ((p, lo), hi) in params.iter_mut().zip(lower).zip(upper) {
        *p = p.clamp(*lo, *hi);
    }
}

fn compute_chi2<M: LmModel>(model: &M, x: &[f64], y: &[f64], params: &[f64]) -> f64 {
    if !model.is_feasible(params) {
        return f64::INFINITY;
    }
    x.iter()
        .zip(y.iter())
        .map(|(&xi, &yi)| {
            let r = yi - model.evaluate(xi, params);
            r * r
        })
        .sum()
}

/// Builds `JᵀJ` and `Jᵀr`, computing the upper triangle and mirroring it.
fn normal_equations<M: LmModel>(
    model: &M,
    x: &[f64],
    y: &[f64],
    params: &[f64],
    row: &mut [f64],
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = params.len();
    let mut hessian = vec![vec![0.0; n]; n];
    let mut gradient = vec![0.0; n];

    for (&xi, &yi) in x.iter().zip(y.iter()) {
        model.jacobian_row(xi, params, row);
        let r = yi - model.evaluate(xi, params);
        for i in 0..n {
            gradient[i] += row[i] * r;
            for j in i..n {
                hessian[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 1..n {
        for j in 0..i {
            hessian[i][j] = hessian[j][i];
        }
    }
    (hessian, gradient)
}

/// Solves `a · x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` for (numerically) singular systems.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        let pivot_val = a[pivot][col].abs();
        if !pivot_val.is_finite() || pivot_val < 1e-300 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum = b[i] - (i + 1..n).map(|j| a[i][j] * x[j]).sum::<f64>();
        x[i] = sum / a[i][i];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line;

    impl LmModel for Line {
        fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
            params[0] * x + params[1]
        }

        fn jacobian_row(&self, x: f64, _params: &[f64], row: &mut [f64]) {
            row[0] = x;
            row[1] = 1.0;
        }
    }

    struct Exponential;

    impl LmModel for Exponential {
        fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
            params[0] * (params[1] * x).exp()
        }

        fn jacobian_row(&self, x: f64, params: &[f64], row: &mut [f64]) {
            let e = (params[1] * x).exp();
            row[0] = e;
            row[1] = params[0] * x * e;
        }

        fn is_feasible(&self, params: &[f64]) -> bool {
            params[0] > 0.0
        }
    }

    #[test]
    fn solves_system_needing_pivoting() {
        let a = vec![
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 0.0, 2.0],
        ];
        let x = solve(a, vec![2.0, 1.0, 6.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
        assert!((x[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn singular_system_returns_none() {
        assert!(solve(vec![vec![0.0; 2]; 2], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn fits_a_line() {
        let x: Vec<f64> = (0..10).map(|v| v as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v - 2.0).collect();
        let solution = optimize(
            &Line,
            &x,
            &y,
            &[1.0, 0.0],
            &[-10.0, -10.0],
            &[10.0, 10.0],
            &LmConfig::default(),
        )
        .unwrap();
        assert!((solution.params[0] - 3.0).abs() < 1e-6);
        assert!((solution.params[1] + 2.0).abs() < 1e-6);
        assert!(solution.chi2 < 1e-10);
    }

    #[test]
    fn respects_bounds() {
        let x: Vec<f64> = (0..10).map(|v| v as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v).collect();
        let solution = optimize(
            &Line,
            &x,
            &y,
            &[1.0, 0.0],
            &[0.0, -1.0],
            &[2.0, 1.0],
            &LmConfig::default(),
        )
        .unwrap();
        assert!(solution.params[0] <= 2.0);
        assert!(solution.params[1] <= 1.0);
    }

    #[test]
    fn fits_nonlinear_model() {
        let x: Vec<f64> = (0..20).map(|v| v as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.5 * (-1.3 * v).exp()).collect();
        let solution = optimize(
            &Exponential,
            &x,
            &y,
            &[1.0, 0.0],
            &[0.0, -5.0],
            &[10.0, 5.0],
            &LmConfig::default(),
        )
        .unwrap();
        assert!((solution.params[0] - 2.5).abs() < 1e-4);
        assert!((solution.params[1] + 1.3).abs() < 1e-4);
    }

    #[test]
    fn infeasible_start_is_reported() {
        let x = [0.0, 1.0];
        let y = [1.0, 1.0];
        let result = optimize(
            &Exponential,
            &x,
            &y,
            &[0.0, 0.0],
            &[0.0, -1.0],
            &[1.0, 1.0],
            &LmConfig::default(),
        );
        assert_eq!(result.unwrap_err(), FitFailure::InfeasibleStart);
    }

    #[test]
    fn exhausted_budget_is_reported() {
        let x: Vec<f64> = (0..20).map(|v| v as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.5 * (-1.3 * v).exp()).collect();
        let config = LmConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let result = optimize(
            &Exponential,
            &x,
            &y,
            &[1.0, 0.0],
            &[0.0, -5.0],
            &[10.0, 5.0],
            &config,
        );
        assert_eq!(result.unwrap_err(), FitFailure::NotConverged { iterations: 1 });
    }
}
