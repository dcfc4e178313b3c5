//! Curve fitting for focus curves
//!
//! Stateless fits over `(x, y)` sample slices. When the slices differ in length
//! only the common prefix is used. Degenerate inputs produce NaN parameters
//! rather than panics, so a bad fit shows up downstream as a failed validation.

mod exponential;
mod hyperbolic;
mod levenberg_marquardt;
mod linear;
mod polynomial;
mod score;
mod trendline;

pub use exponential::{exponential_regression, power_regression, ExponentialRegression, PowerRegression};
pub use hyperbolic::{hyperbolic_regression, HyperbolicRegression};
pub use levenberg_marquardt::{levenberg_marquardt, LevenbergMarquardtOptions, LevenbergMarquardtResult};
pub use linear::{simple_linear_regression, theil_sen_regression, LinearRegression};
pub use polynomial::{polynomial_regression, polynomial_regression_with_powers, quadratic_regression, PolynomialRegression};
pub use score::{regression_score, RegressionScore};
pub use trendline::{trend_line_regression, TrendLineMethod, TrendLineRegression};

/// A fitted curve that can be evaluated
pub trait Regression {
    /// Fitted `y` at `x`
    fn predict(&self, x: f64) -> f64;
}

/// Number of usable samples
pub(crate) fn sample_count(x: &[f64], y: &[f64]) -> usize {
    x.len().min(y.len())
}

/// Median of `values`, NaN when empty. Sorts in place.
pub(crate) fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}
