use super::{sample_count, Regression};
use serde::{Deserialize, Serialize};

/// Goodness of fit of a regression against its samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionScore {
    /// Correlation coefficient, `sqrt(r2)`
    pub r: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Pearson chi-squared, summed over samples with non-zero `y`
    pub chi2: f64,
    /// Root mean square deviation
    pub rmsd: f64,
}

pub fn regression_score<R: Regression + ?Sized>(regression: &R, x: &[f64], y: &[f64]) -> RegressionScore {
    let n = sample_count(x, y);

    let mut residual_sum = 0.0;
    let mut y_sum = 0.0;
    let mut y_squared_sum = 0.0;
    let mut chi2 = 0.0;

    for i in 0..n {
        let deviation = y[i] - regression.predict(x[i]);
        let squared = deviation * deviation;

        residual_sum += squared;
        y_sum += y[i];
        y_squared_sum += y[i] * y[i];

        if y[i] != 0.0 {
            chi2 += squared / y[i];
        }
    }

    let count = n as f64;
    let r2 = 1.0 - residual_sum / (y_squared_sum - y_sum * y_sum / count);

    RegressionScore {
        r: r2.sqrt(),
        r2,
        chi2,
        rmsd: (residual_sum / count).sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::simple_linear_regression;

    #[test]
    fn test_linear_score() {
        let x = [1.47, 1.5, 1.52, 1.55, 1.57, 1.6, 1.63, 1.65, 1.68, 1.7, 1.73, 1.75, 1.78, 1.8, 1.83];
        let y = [
            52.21, 53.12, 54.48, 55.84, 57.2, 58.57, 59.93, 61.29, 63.11, 64.47, 66.28, 68.1, 69.92, 72.19, 74.46,
        ];
        let regression = simple_linear_regression(&x, &y);

        assert!((regression.slope - 61.272).abs() < 5e-4);
        assert!((regression.intercept + 39.062).abs() < 5e-4);

        let score = regression_score(&regression, &x, &y);
        assert!((score.r - 0.9946).abs() < 5e-4);
        assert!((score.r * score.r - score.r2).abs() < 1e-12);
        assert!(score.chi2 < 1.0);
        assert!(score.rmsd < 1.0);
    }

    #[test]
    fn test_perfect_fit() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let score = regression_score(&simple_linear_regression(&x, &y), &x, &y);

        assert!((score.r2 - 1.0).abs() < 1e-12);
        assert!(score.rmsd < 1e-12);
        assert!(score.chi2 < 1e-12);
    }

    #[test]
    fn test_empty_samples() {
        let regression = simple_linear_regression(&[0.0, 1.0], &[0.0, 1.0]);
        let score = regression_score(&regression, &[], &[]);
        assert!(score.rmsd.is_nan());
        assert!(score.r2.is_nan());
    }
}
