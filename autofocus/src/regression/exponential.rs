use super::{sample_count, simple_linear_regression, Regression};
use serde::{Deserialize, Serialize};

/// Exponential curve `y = b·e^(a·x)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialRegression {
    pub a: f64,
    pub b: f64,
}

impl ExponentialRegression {
    pub fn inverse(&self, y: f64) -> f64 {
        (y / self.b).ln() / self.a
    }
}

impl Regression for ExponentialRegression {
    fn predict(&self, x: f64) -> f64 {
        self.b * (self.a * x).exp()
    }
}

/// Power curve `y = a·x^b`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerRegression {
    pub a: f64,
    pub b: f64,
}

impl PowerRegression {
    pub fn inverse(&self, y: f64) -> f64 {
        (y / self.a).powf(1.0 / self.b)
    }
}

impl Regression for PowerRegression {
    fn predict(&self, x: f64) -> f64 {
        self.a * x.powf(self.b)
    }
}

/// Exponential fit by least squares on `ln y`. Non-positive `y` produces NaN.
pub fn exponential_regression(x: &[f64], y: &[f64]) -> ExponentialRegression {
    let n = sample_count(x, y);
    let ln_y: Vec<f64> = y[..n].iter().map(|v| v.ln()).collect();
    let linear = simple_linear_regression(&x[..n], &ln_y);

    ExponentialRegression {
        a: linear.slope,
        b: linear.intercept.exp(),
    }
}

/// Power fit by least squares on `ln x`, `ln y`
pub fn power_regression(x: &[f64], y: &[f64]) -> PowerRegression {
    let n = sample_count(x, y);
    let ln_x: Vec<f64> = x[..n].iter().map(|v| v.ln()).collect();
    let ln_y: Vec<f64> = y[..n].iter().map(|v| v.ln()).collect();
    let linear = simple_linear_regression(&ln_x, &ln_y);

    PowerRegression {
        a: linear.intercept.exp(),
        b: linear.slope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [1.5, 2.5, 3.5, 5.0, 7.5];
        let regression = exponential_regression(&x, &y);

        assert!((regression.a - 0.3912023).abs() < 1e-6);
        assert!((regression.b - 1.5799091).abs() < 1e-6);
        assert!((regression.predict(2.0) - 3.454825).abs() < 1e-6);
        assert!((regression.inverse(3.454825) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_power() {
        let x = [17.6, 26.0, 31.9, 38.9, 45.8, 51.2, 58.1, 64.7, 66.7, 80.8, 82.9];
        let y = [159.9, 206.9, 236.8, 269.9, 300.6, 323.6, 351.7, 377.6, 384.1, 437.2, 444.7];
        let regression = power_regression(&x, &y);

        assert!((regression.a - 24.12989312).abs() < 1e-6);
        assert!((regression.b - 0.65949782).abs() < 1e-6);
        assert!((regression.predict(20.0) - 174.0130599).abs() < 1e-6);
        assert!((regression.inverse(174.0130599) - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_exponential_non_positive_y() {
        let regression = exponential_regression(&[0.0, 1.0, 2.0], &[1.0, 0.0, -1.0]);
        assert!(!regression.a.is_finite() || !regression.b.is_finite());
    }
}
