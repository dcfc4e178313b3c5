use super::{levenberg_marquardt, sample_count, LevenbergMarquardtOptions, Regression};
use crate::point::Point;
use serde::{Deserialize, Serialize};

/// Hyperbola `y = a·cosh(asinh((p − x)/b))`, a smooth V with its vertex at `(p, a)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperbolicRegression {
    pub a: f64,
    pub b: f64,
    pub p: f64,
    pub minimum: Point,
}

impl HyperbolicRegression {
    pub fn new(a: f64, b: f64, p: f64) -> Self {
        Self {
            a,
            b,
            p,
            minimum: Point::new(p, a),
        }
    }

    /// Position on the left branch where the curve reaches `y`
    pub fn inverse(&self, y: f64) -> f64 {
        self.p - self.b.abs() * ((y / self.a).powi(2) - 1.0).sqrt()
    }
}

fn hyperbola(x: f64, parameters: &[f64]) -> f64 {
    let (a, b, p) = (parameters[0], parameters[1], parameters[2]);
    a * ((p - x) / b).asinh().cosh()
}

impl Regression for HyperbolicRegression {
    fn predict(&self, x: f64) -> f64 {
        hyperbola(x, &[self.a, self.b, self.p])
    }
}

/// Hyperbolic fit refined with Levenberg-Marquardt.
///
/// The vertex is seeded at the lowest sample and `b` is chosen so the seed
/// curve passes through the highest sample.
pub fn hyperbolic_regression(x: &[f64], y: &[f64]) -> HyperbolicRegression {
    let n = sample_count(x, y);
    if n == 0 {
        return HyperbolicRegression::new(f64::NAN, f64::NAN, f64::NAN);
    }

    let mut lowest = 0;
    let mut highest = 0;
    for i in 1..n {
        if y[i] < y[lowest] {
            lowest = i;
        }
        if y[i] > y[highest] {
            highest = i;
        }
    }

    let a0 = y[lowest];
    let p0 = x[lowest];
    let ratio = y[highest] / a0;

    let mut b0 = (p0 - x[highest]).abs() / (ratio * ratio - 1.0).sqrt();
    if !(b0.is_finite() && b0 > 0.0) {
        let (min_x, max_x) = x[..n]
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let span = max_x - min_x;
        b0 = if span > 0.0 { span } else { 1.0 };
    }

    let result = levenberg_marquardt(x, y, hyperbola, &[a0, b0, p0], &LevenbergMarquardtOptions::default());

    tracing::trace!(
        "Hyperbolic fit: seed a={:.3} b={:.1} p={:.1}, fitted {:?} after {} iterations",
        a0,
        b0,
        p0,
        result.parameters,
        result.iterations
    );

    HyperbolicRegression::new(result.parameters[0], result.parameters[1], result.parameters[2])
}
