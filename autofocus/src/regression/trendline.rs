use super::{regression_score, sample_count, simple_linear_regression, theil_sen_regression};
use super::{LinearRegression, Regression, RegressionScore};
use crate::point::{unzip, Point};
use serde::{Deserialize, Serialize};

/// Line fitting method used for each side of a trend line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLineMethod {
    /// Ordinary least squares
    #[default]
    Simple,
    /// Median of pairwise slopes
    TheilSen,
}

impl TrendLineMethod {
    fn fit(self, points: &[Point]) -> LinearRegression {
        let (x, y) = unzip(points);
        match self {
            TrendLineMethod::Simple => simple_linear_regression(&x, &y),
            TrendLineMethod::TheilSen => theil_sen_regression(&x, &y),
        }
    }
}

/// Two lines meeting near the lowest sample of a V-shaped curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendLineRegression {
    pub left: LinearRegression,
    pub right: LinearRegression,
    /// Samples fitted by `left`
    pub left_points: Vec<Point>,
    /// Samples fitted by `right`
    pub right_points: Vec<Point>,
    /// Lowest sample (first one on ties)
    pub minimum: Point,
    pub intersection: Point,
}

impl TrendLineRegression {
    pub fn left_score(&self) -> RegressionScore {
        let (x, y) = unzip(&self.left_points);
        regression_score(&self.left, &x, &y)
    }

    pub fn right_score(&self) -> RegressionScore {
        let (x, y) = unzip(&self.right_points);
        regression_score(&self.right, &x, &y)
    }
}

impl Regression for TrendLineRegression {
    fn predict(&self, x: f64) -> f64 {
        if x < self.minimum.x {
            self.left.predict(x)
        } else if x > self.minimum.x {
            self.right.predict(x)
        } else {
            self.minimum.y
        }
    }
}

/// Splits the samples at the lowest `y` and fits a line to each side.
///
/// Samples level with the minimum carry no slope and are left out of both fits.
pub fn trend_line_regression(x: &[f64], y: &[f64], method: TrendLineMethod) -> TrendLineRegression {
    let n = sample_count(x, y);

    let minimum = (0..n)
        .fold(None::<usize>, |lowest, i| match lowest {
            Some(j) if y[j] <= y[i] => Some(j),
            _ => Some(i),
        })
        .map_or(Point::new(f64::NAN, f64::NAN), |i| Point::new(x[i], y[i]));

    let mut left_points = Vec::new();
    let mut right_points = Vec::new();

    for i in 0..n {
        if y[i] > minimum.y {
            if x[i] < minimum.x {
                left_points.push(Point::new(x[i], y[i]));
            } else if x[i] > minimum.x {
                right_points.push(Point::new(x[i], y[i]));
            }
        }
    }

    let left = method.fit(&left_points);
    let right = method.fit(&right_points);
    let intersection = Point::from(left.intersection(&right));

    TrendLineRegression {
        left,
        right,
        left_points,
        right_points,
        minimum,
        intersection,
    }
}
