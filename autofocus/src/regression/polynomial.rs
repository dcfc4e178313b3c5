use super::{sample_count, Regression};
use crate::linalg;
use crate::point::Point;
use serde::{Deserialize, Serialize};

/// Polynomial `y = Σ coefficients[i]·x^powers[i]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialRegression {
    pub powers: Vec<u32>,
    pub coefficients: Vec<f64>,
}

impl PolynomialRegression {
    /// Highest power in the fit
    pub fn degree(&self) -> u32 {
        self.powers.iter().copied().max().unwrap_or(0)
    }

    fn coefficient(&self, power: u32) -> f64 {
        self.powers
            .iter()
            .zip(&self.coefficients)
            .filter(|(p, _)| **p == power)
            .map(|(_, c)| *c)
            .sum()
    }

    /// Vertex of a parabola that opens upward.
    ///
    /// `None` for any other degree, for a downward parabola, or for NaN coefficients.
    pub fn minimum(&self) -> Option<Point> {
        if self.degree() != 2 {
            return None;
        }

        let a = self.coefficient(2);
        let b = self.coefficient(1);

        if !(a > 0.0) {
            return None;
        }

        let x = -b / (2.0 * a);
        Some(Point::new(x, self.predict(x)))
    }
}

impl Regression for PolynomialRegression {
    fn predict(&self, x: f64) -> f64 {
        self.powers
            .iter()
            .zip(&self.coefficients)
            .map(|(&p, &c)| c * x.powi(p as i32))
            .sum()
    }
}

/// Least squares polynomial of the given degree.
///
/// Fits powers `0..=degree`, or `1..=degree` when `intercept` is false so the
/// curve is forced through the origin.
pub fn polynomial_regression(x: &[f64], y: &[f64], degree: u32, intercept: bool) -> PolynomialRegression {
    let first = if intercept { 0 } else { 1 };
    let powers: Vec<u32> = (first..=degree).collect();
    polynomial_regression_with_powers(x, y, &powers)
}

/// Degree-2 fit with intercept
pub fn quadratic_regression(x: &[f64], y: &[f64]) -> PolynomialRegression {
    polynomial_regression(x, y, 2, true)
}

/// Least squares fit over an explicit set of powers.
///
/// The normal equations are assembled from power sums. A full `0..=d` power set
/// is solved about the mean `x` and mapped back to the raw basis, which keeps
/// the system well conditioned for focuser positions in the tens of thousands.
pub fn polynomial_regression_with_powers(x: &[f64], y: &[f64], powers: &[u32]) -> PolynomialRegression {
    let n = sample_count(x, y);
    let k = powers.len();

    let contiguous = powers.iter().enumerate().all(|(i, &p)| p as usize == i);
    let shift = if contiguous && n > 0 {
        x[..n].iter().sum::<f64>() / n as f64
    } else {
        0.0
    };

    let max_power = 2 * powers.iter().copied().max().unwrap_or(0) as usize;
    let mut power_sums = vec![0.0; max_power + 1];
    let mut moments = vec![0.0; k];
    let mut pows = vec![1.0; max_power + 1];

    for i in 0..n {
        let xs = x[i] - shift;

        for q in 1..=max_power {
            pows[q] = pows[q - 1] * xs;
        }
        for (sum, pow) in power_sums.iter_mut().zip(&pows) {
            *sum += pow;
        }
        for (moment, &p) in moments.iter_mut().zip(powers) {
            *moment += pows[p as usize] * y[i];
        }
    }

    let mut matrix = Vec::with_capacity(k * k);
    for &pi in powers {
        for &pj in powers {
            matrix.push(power_sums[(pi + pj) as usize]);
        }
    }

    let mut coefficients = linalg::solve(&matrix, &moments, k);

    if shift != 0.0 {
        coefficients = unshift(&coefficients, shift);
    }

    PolynomialRegression {
        powers: powers.to_vec(),
        coefficients,
    }
}

/// Expand `Σ c[m]·(x − shift)^m` into raw-basis coefficients
fn unshift(shifted: &[f64], shift: f64) -> Vec<f64> {
    let k = shifted.len();

    (0..k)
        .map(|j| {
            (j..k)
                .map(|m| shifted[m] * binomial(m, j) * (-shift).powi((m - j) as i32))
                .sum()
        })
        .collect()
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_1_constant() {
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let y = vec![1.0; 1000];
        let regression = polynomial_regression(&x, &y, 1, true);

        assert_eq!(regression.coefficients.len(), 2);
        assert!((regression.coefficients[0] - 1.0).abs() < 1e-12);
        assert!(regression.coefficients[1].abs() < 1e-12);
    }

    #[test]
    fn test_degree_2() {
        let x = [-3.0, 0.0, 2.0, 4.0];
        let y = [3.0, 1.0, 1.0, 3.0];
        let regression = polynomial_regression(&x, &y, 2, true);

        assert_eq!(regression.coefficients.len(), 3);
        assert!((regression.coefficients[0] - 0.850519).abs() < 1e-5);
        assert!((regression.coefficients[1] + 0.192495).abs() < 1e-5);
        assert!((regression.coefficients[2] - 0.178462).abs() < 1e-5);

        let minimum = regression.minimum().unwrap();
        assert!((minimum.x - 0.192495 / (2.0 * 0.178462)).abs() < 1e-4);
    }

    #[test]
    fn test_through_origin() {
        let x = [-4.0, 4.0, 2.0, 3.0, 1.0, 8.0, 5.0, 7.0];
        let y = [16.5, 16.5, 4.5, 9.5, 1.5, 64.5, 25.5, 49.5];
        let regression = polynomial_regression(&x, &y, 2, false);

        assert_eq!(regression.predict(0.0), 0.0);
        assert_eq!(regression.coefficients.len(), 2);
        assert!((regression.coefficients[0] - 0.018041553971009705).abs() < 1e-5);
        assert!((regression.coefficients[1] - 1.0095279075485593).abs() < 1e-5);

        let explicit = polynomial_regression_with_powers(&x, &y, &[1, 2]);
        assert_eq!(explicit.powers, vec![1, 2]);
        assert!((explicit.coefficients[0] - regression.coefficients[0]).abs() < 1e-12);
        assert!((explicit.coefficients[1] - regression.coefficients[1]).abs() < 1e-12);
    }

    #[test]
    fn test_quadratic_at_focuser_scale() {
        // y = 2e-6·(x − 25000)² + 1.5
        let x: Vec<f64> = (0..11).map(|i| 24500.0 + 100.0 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2e-6 * (v - 25000.0).powi(2) + 1.5).collect();
        let regression = quadratic_regression(&x, &y);

        let minimum = regression.minimum().unwrap();
        assert!((minimum.x - 25000.0).abs() < 1e-3);
        assert!((minimum.y - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_positions() {
        let x = [50.0, 50.0, 50.0, 70.0, 70.0, 70.0, 80.0, 80.0, 80.0, 90.0, 90.0, 90.0, 100.0, 100.0, 100.0];
        let y = [3.3, 2.8, 2.9, 2.3, 2.6, 2.1, 2.5, 2.9, 2.4, 3.0, 3.1, 2.8, 3.3, 3.5, 3.0];

        // Five distinct positions pin a quartic to the per-position means
        let quartic = polynomial_regression(&x, &y, 4, true);
        assert_eq!(quartic.coefficients.len(), 5);
        for (position, mean) in [(50.0, 3.0), (70.0, 7.0 / 3.0), (80.0, 2.6), (90.0, 8.9 / 3.0), (100.0, 9.8 / 3.0)] {
            assert!((quartic.predict(position) - mean).abs() < 1e-6);
        }

        // One coefficient too many for five positions
        let quintic = polynomial_regression(&x, &y, 5, true);
        assert_eq!(quintic.coefficients.len(), 6);
        assert!(quintic.predict(80.0).is_nan());
    }

    #[test]
    fn test_downward_parabola_has_no_minimum() {
        let x = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let y = [-4.0, -1.0, 0.0, -1.0, -4.0];
        assert!(quadratic_regression(&x, &y).minimum().is_none());
    }

    #[test]
    fn test_singular_system_yields_nan() {
        // Three coefficients from two distinct positions
        let regression = quadratic_regression(&[1.0, 1.0, 2.0, 2.0], &[1.0, 1.5, 2.0, 2.5]);
        assert!(regression.coefficients.iter().all(|c| c.is_nan()));
        assert!(regression.minimum().is_none());
    }
}
