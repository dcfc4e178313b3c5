//! Levenberg-Marquardt nonlinear least squares
//!
//! Damped Gauss-Newton refinement of model parameters. The Jacobian comes from
//! forward finite differences and each step solves `(JᵗJ + λ·diag(JᵗJ))·Δp = Jᵗr`.
//! Iteration order and the difference step are fixed, so results are deterministic.

use super::sample_count;
use crate::linalg;

/// Forward-difference step for the Jacobian, scaled by `max(|p|, 1)`
const FINITE_DIFFERENCE_STEP: f64 = 1e-8;

const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;

/// Optimizer settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardtOptions {
    /// Upper bound on step attempts, accepted or rejected
    pub max_iterations: usize,
    /// Stop once an accepted step improves the squared error by less than this fraction
    pub error_tolerance: f64,
    /// Starting damping factor λ
    pub initial_damping: f64,
}

impl Default for LevenbergMarquardtOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            error_tolerance: 1e-10,
            initial_damping: 1e-3,
        }
    }
}

/// Refined parameters and the state the optimizer stopped in
#[derive(Debug, Clone, PartialEq)]
pub struct LevenbergMarquardtResult {
    pub parameters: Vec<f64>,
    /// Sum of squared residuals at `parameters`
    pub error: f64,
    pub iterations: usize,
}

fn squared_error<F>(x: &[f64], y: &[f64], model: &F, parameters: &[f64]) -> f64
where
    F: Fn(f64, &[f64]) -> f64,
{
    x.iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let r = yi - model(xi, parameters);
            r * r
        })
        .sum()
}

/// Fit `model(x, parameters)` to the samples starting from `initial`.
///
/// Never fails: if no step improves the error the initial parameters come back
/// unchanged, and a NaN error marks a model that cannot be evaluated.
pub fn levenberg_marquardt<F>(
    x: &[f64],
    y: &[f64],
    model: F,
    initial: &[f64],
    options: &LevenbergMarquardtOptions,
) -> LevenbergMarquardtResult
where
    F: Fn(f64, &[f64]) -> f64,
{
    let n = sample_count(x, y);
    let (x, y) = (&x[..n], &y[..n]);
    let m = initial.len();

    let mut parameters = initial.to_vec();
    let mut error = squared_error(x, y, &model, &parameters);
    let mut damping = options.initial_damping;

    let mut jtj = vec![0.0; m * m];
    let mut jtr = vec![0.0; m];
    let mut jacobian = vec![0.0; n * m];
    let mut stale = true;
    let mut iterations = 0;

    while iterations < options.max_iterations {
        iterations += 1;

        if stale {
            let fitted: Vec<f64> = x.iter().map(|&xi| model(xi, &parameters)).collect();

            for j in 0..m {
                let h = FINITE_DIFFERENCE_STEP * parameters[j].abs().max(1.0);
                let mut shifted = parameters.clone();
                shifted[j] += h;

                for i in 0..n {
                    jacobian[i * m + j] = (model(x[i], &shifted) - fitted[i]) / h;
                }
            }

            for a in 0..m {
                for b in 0..m {
                    jtj[a * m + b] = (0..n).map(|i| jacobian[i * m + a] * jacobian[i * m + b]).sum();
                }
                jtr[a] = (0..n).map(|i| jacobian[i * m + a] * (y[i] - fitted[i])).sum();
            }

            stale = false;
        }

        let mut damped = jtj.clone();
        for d in 0..m {
            damped[d * m + d] *= 1.0 + damping;
        }

        let delta = linalg::solve(&damped, &jtr, m);
        let trial_error = if delta.iter().all(|d| d.is_finite()) {
            let trial: Vec<f64> = parameters.iter().zip(&delta).map(|(p, d)| p + d).collect();
            let trial_error = squared_error(x, y, &model, &trial);
            if trial_error < error {
                let improvement = error - trial_error;
                parameters = trial;
                error = trial_error;
                damping = (damping / 10.0).max(MIN_DAMPING);
                stale = true;

                if improvement <= options.error_tolerance * error {
                    break;
                }
                continue;
            }
            trial_error
        } else {
            f64::NAN
        };

        tracing::trace!("LM step rejected: error {} -> {}, damping {}", error, trial_error, damping);

        damping *= 10.0;
        if damping > MAX_DAMPING {
            break;
        }
    }

    LevenbergMarquardtResult {
        parameters,
        error,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit<F: Fn(f64, &[f64]) -> f64>(x: &[f64], y: &[f64], model: F, initial: &[f64]) -> Vec<f64> {
        levenberg_marquardt(x, y, model, initial, &LevenbergMarquardtOptions::default()).parameters
    }

    #[test]
    fn test_line() {
        let line = |x: f64, p: &[f64]| p[0] * x + p[1];
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [-2.0, 0.0, 2.0, 4.0, 6.0, 8.0, 10.0];
        let result = fit(&x, &y, line, &[1.0, 0.0]);

        assert!((result[0] - 2.0).abs() < 1e-8);
        assert!((result[1] + 2.0).abs() < 1e-8);
        for i in 0..x.len() {
            assert!((line(x[i], &result) - y[i]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_quadratic() {
        let quadratic = |x: f64, p: &[f64]| p[0] * x * x + p[1] * x + p[2];
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let result = fit(&x, &y, quadratic, &[1.0, 0.0, 0.0]);

        assert!(result[0].abs() < 1e-6);
        assert!((result[1] - 1.0).abs() < 1e-6);
        assert!((result[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cubic() {
        let cubic = |x: f64, p: &[f64]| p[0] * x * x * x + p[1] * x * x + p[2] * x + p[3];
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let result = fit(&x, &y, cubic, &[1.0, 0.0, 0.0, 0.0]);

        assert!(result[0].abs() < 1e-6);
        assert!(result[1].abs() < 1e-6);
        assert!((result[2] - 1.0).abs() < 1e-6);
        assert!((result[3] - 1.0).abs() < 1e-6);
        for i in 0..x.len() {
            assert!((cubic(x[i], &result) - y[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sine() {
        use std::f64::consts::PI;

        let sine = |x: f64, p: &[f64]| p[0] * (p[1] * x + p[2]).sin();
        let x = [0.0, PI / 2.0, PI, 3.0 * PI / 2.0, 2.0 * PI];
        let y = [0.0, 1.0, 0.0, -1.0, 0.0];
        let result = fit(&x, &y, sine, &[1.0, 1.0, 0.0]);

        assert!((result[0] - 1.0).abs() < 1e-8);
        assert!((result[1] - 1.0).abs() < 1e-8);
        assert!(result[2].abs() < 1e-8);
        assert!((sine(PI / 4.0, &result) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-8);
        for i in 0..x.len() {
            assert!((sine(x[i], &result) - y[i]).abs() < 1e-8);
        }
    }

    #[test]
    fn test_logarithmic() {
        let logarithmic = |x: f64, p: &[f64]| p[0] * (p[1] * x).ln();
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [0.0, 0.693, 1.099, 1.386, 1.609, 1.792];
        let result = fit(&x, &y, logarithmic, &[1.0, 3.0]);

        assert!((result[0] - 1.0).abs() < 1e-4);
        assert!((result[1] - 1.0).abs() < 1e-4);
        for i in 0..x.len() {
            assert!((logarithmic(x[i], &result) - y[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn test_four_parameter_logistic() {
        // Dose response over ten decades, only loosely constrained in the upper asymptote
        let logistic = |x: f64, p: &[f64]| p[0] + (p[1] - p[0]) / (1.0 + p[2].powf(p[3]) * x.powf(-p[3]));
        let x = [9.22e-12, 5.53e-11, 3.32e-10, 1.99e-9, 1.19e-8, 7.17e-8, 4.3e-7, 2.58e-6, 1.55e-5, 9.29e-5];
        let y = [7.3, 8.61, 10.13, 11.88, 13.89, 16.18, 18.76, 21.64, 24.83, 28.32];
        let result = fit(&x, &y, logistic, &[0.0, 100.0, 1.0, 0.1]);

        assert!(result[0].abs() < 0.05);
        assert!((result[1] - 99.8).abs() < 1.0);
        assert!((result[2] - 0.98).abs() < 0.15);
        assert!((result[3] - 0.1).abs() < 0.01);
        for i in 0..x.len() {
            assert!((logistic(x[i], &result) - y[i]).abs() < 0.05);
        }
    }

    #[test]
    fn test_large_parameter_scale() {
        // An absolute 1e-8 step is lost below the spacing of doubles near 3e8
        let shifted_line = |x: f64, p: &[f64]| p[1] * (x - p[0]);
        let x: Vec<f64> = (0..11).map(|k| 3e8 + k as f64).collect();
        let y: Vec<f64> = (0..11).map(|k| 2.0 * (k as f64 - 5.0)).collect();
        let result = fit(&x, &y, shifted_line, &[3e8, 1.0]);

        assert!((result[0] - 300_000_005.0).abs() < 1e-3);
        assert!((result[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_exponential() {
        let exponential = |x: f64, p: &[f64]| p[0] * (p[1] * x).exp();
        let x = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [1.0, 2.718, 7.389, 20.085, 54.598, 148.413, 403.429];
        let result = fit(&x, &y, exponential, &[1.0, 1.0]);

        assert!((result[0] - 1.0).abs() < 1e-4);
        assert!((result[1] - 1.0).abs() < 1e-4);
        for i in 0..x.len() {
            assert!((exponential(x[i], &result) - y[i]).abs() < 1e-2);
        }
    }

    #[test]
    fn test_misra1a() {
        let misra1a = |x: f64, p: &[f64]| p[0] * (1.0 - (-p[1] * x).exp());
        let x = [77.6, 114.9, 141.1, 190.8, 239.9, 289.0, 332.8, 378.4, 434.8, 477.3, 536.8, 593.1, 689.1, 760.0];
        let y = [10.07, 14.73, 17.94, 23.93, 29.61, 35.18, 40.02, 44.82, 50.76, 55.05, 61.01, 66.4, 75.47, 81.78];
        let result = fit(&x, &y, misra1a, &[250.0, 0.0005]);

        assert!((result[0] - 238.944658680792).abs() < 1e-2);
        assert!((result[1] - 0.00055014847409921093).abs() < 1e-7);
        for i in 0..x.len() {
            assert!((misra1a(x[i], &result) - y[i]).abs() < 0.5);
        }
    }

    #[test]
    fn test_michaelis_menten() {
        let rate = |x: f64, p: &[f64]| (p[0] * x) / (p[1] + x);
        let x = [0.03, 0.1947, 0.425, 0.626, 1.253, 2.5, 3.74];
        let y = [0.05, 0.127, 0.094, 0.2122, 0.2729, 0.2665, 0.3317];
        let result = fit(&x, &y, rate, &[0.9, 0.2]);

        assert!((result[0] - 0.362).abs() < 1e-3);
        assert!((result[1] - 0.558).abs() < 1e-3);
    }

    #[test]
    fn test_unevaluable_model_keeps_initial() {
        let broken = |_x: f64, _p: &[f64]| f64::NAN;
        let result = levenberg_marquardt(&[1.0, 2.0], &[1.0, 2.0], broken, &[3.0, 4.0], &LevenbergMarquardtOptions::default());

        assert_eq!(result.parameters, vec![3.0, 4.0]);
        assert!(result.error.is_nan());
    }
}
