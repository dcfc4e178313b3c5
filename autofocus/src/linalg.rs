//! Dense linear system solver
//!
//! LU decomposition with partial pivoting for the small systems produced by
//! polynomial normal equations and Levenberg-Marquardt steps. A matrix that is
//! singular to working precision yields a NaN-filled solution instead of a panic.

/// LU factorization of a square row-major matrix, `P·A = L·U`
#[derive(Debug, Clone)]
pub struct LuDecomposition {
    n: usize,
    lu: Vec<f64>,
    pivots: Vec<usize>,
    singular: bool,
}

impl LuDecomposition {
    /// Factorize the `n`×`n` row-major `matrix`.
    ///
    /// Entries beyond `n * n` are ignored; a short matrix is treated as singular.
    pub fn new(matrix: &[f64], n: usize) -> Self {
        if matrix.len() < n * n {
            return Self {
                n,
                lu: vec![f64::NAN; n * n],
                pivots: (0..n).collect(),
                singular: true,
            };
        }

        let mut lu = matrix[..n * n].to_vec();
        let mut pivots: Vec<usize> = (0..n).collect();
        let mut singular = false;

        let scale = lu.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let tolerance = scale * f64::EPSILON * n as f64;

        for k in 0..n {
            // Pivot on the largest magnitude in column k
            let mut p = k;
            let mut max = lu[k * n + k].abs();
            for i in (k + 1)..n {
                let v = lu[i * n + k].abs();
                if v > max {
                    max = v;
                    p = i;
                }
            }

            if !(max > tolerance) {
                singular = true;
                continue;
            }

            if p != k {
                for j in 0..n {
                    lu.swap(k * n + j, p * n + j);
                }
                pivots.swap(k, p);
            }

            let pivot = lu[k * n + k];
            for i in (k + 1)..n {
                let factor = lu[i * n + k] / pivot;
                lu[i * n + k] = factor;
                if factor != 0.0 {
                    for j in (k + 1)..n {
                        lu[i * n + j] -= factor * lu[k * n + j];
                    }
                }
            }
        }

        Self { n, lu, pivots, singular }
    }

    /// Whether a zero pivot was met during factorization
    pub fn is_singular(&self) -> bool {
        self.singular
    }

    /// Solve `A·x = b`. Returns NaNs when the matrix is singular.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.n;

        if self.singular || b.len() < n {
            return vec![f64::NAN; n];
        }

        // Forward substitution on the permuted right-hand side
        let mut x: Vec<f64> = self.pivots.iter().map(|&p| b[p]).collect();
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[i * n + j] * x[j];
            }
            x[i] = sum;
        }

        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.lu[i * n + j] * x[j];
            }
            x[i] = sum / self.lu[i * n + i];
        }

        x
    }
}

/// Solve the `n`×`n` system `A·x = b` (row-major `a`)
pub fn solve(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    LuDecomposition::new(a, n).solve(b)
}
