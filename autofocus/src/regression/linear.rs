use super::{median, sample_count, Regression};
use serde::{Deserialize, Serialize};

/// Straight line `y = slope·x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearRegression {
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    /// `x` at which the line reaches `y`
    pub fn inverse(&self, y: f64) -> f64 {
        (y - self.intercept) / self.slope
    }

    /// Crossing point with `other`. Parallel lines cross at the origin by convention.
    pub fn intersection(&self, other: &LinearRegression) -> (f64, f64) {
        if self.slope == other.slope {
            return (0.0, 0.0);
        }

        let x = (other.intercept - self.intercept) / (self.slope - other.slope);
        (x, self.predict(x))
    }
}

impl Regression for LinearRegression {
    fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Ordinary least squares fit.
///
/// All-equal `x` (or fewer than two samples) yields a NaN slope.
pub fn simple_linear_regression(x: &[f64], y: &[f64]) -> LinearRegression {
    let n = sample_count(x, y);

    let mut x_sum = 0.0;
    let mut y_sum = 0.0;
    let mut x_squared = 0.0;
    let mut xy = 0.0;

    for i in 0..n {
        x_sum += x[i];
        y_sum += y[i];
        x_squared += x[i] * x[i];
        xy += x[i] * y[i];
    }

    let n = n as f64;
    let slope = (n * xy - x_sum * y_sum) / (n * x_squared - x_sum * x_sum);
    let intercept = y_sum / n - slope * (x_sum / n);

    LinearRegression { slope, intercept }
}

/// Theil-Sen estimator: median of pairwise slopes, median of residual intercepts.
///
/// Pairs sharing an `x` are skipped. Quadratic in the number of samples.
pub fn theil_sen_regression(x: &[f64], y: &[f64]) -> LinearRegression {
    let n = sample_count(x, y);

    let mut slopes = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            if x[i] != x[j] {
                slopes.push((y[j] - y[i]) / (x[j] - x[i]));
            }
        }
    }

    let slope = median(&mut slopes);

    let mut intercepts: Vec<f64> = (0..n).map(|i| y[i] - slope * x[i]).collect();
    let intercept = median(&mut intercepts);

    LinearRegression { slope, intercept }
}
