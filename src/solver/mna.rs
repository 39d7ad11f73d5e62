//! Dense MNA system storage and LU solve.

use crate::error::{PowerSimError, Result};

/// Pivot magnitude below which the matrix is treated as singular.
const PIVOT_EPSILON: f64 = 1e-15;

/// MNA matrix system Ax = b.
#[derive(Debug, Clone)]
pub struct MnaMatrix {
    /// System matrix A (row-major)
    pub a: Vec<f64>,
    /// Source vector b
    pub b: Vec<f64>,
    /// Solution vector x
    pub x: Vec<f64>,
    /// Matrix dimension
    pub size: usize,
    /// LU decomposition of A
    lu: Vec<f64>,
    /// Row permutation from partial pivoting
    pivots: Vec<usize>,
}

impl MnaMatrix {
    /// Create a zeroed system of the given dimension.
    pub fn new(size: usize) -> Self {
        Self {
            a: vec![0.0; size * size],
            b: vec![0.0; size],
            x: vec![0.0; size],
            size,
            lu: vec![0.0; size * size],
            pivots: vec![0; size],
        }
    }

    /// Clear the matrix and source vector to zero.
    pub fn clear(&mut self) {
        self.a.fill(0.0);
        self.b.fill(0.0);
    }

    /// Get matrix element at (row, col).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.a[row * self.size + col]
    }

    /// Add to matrix element at (row, col).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.size + col] += value;
    }

    /// Add to source vector element; ground rows are dropped.
    pub fn add_source(&mut self, row: Option<usize>, value: f64) {
        if let Some(i) = row {
            self.b[i] += value;
        }
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes x and y:
    ///   A[x,x] += G
    ///   A[y,y] += G
    ///   A[x,y] -= G
    ///   A[y,x] -= G
    pub fn stamp_conductance(&mut self, x: Option<usize>, y: Option<usize>, g: f64) {
        if let Some(i) = x {
            self.add(i, i, g);
        }
        if let Some(j) = y {
            self.add(j, j, g);
        }
        if let (Some(i), Some(j)) = (x, y) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamp the incidence of a branch-current unknown `z` between x and y.
    /// Row z enforces V[x] - V[y] = b[z]; column z carries the branch current
    /// leaving x.
    pub fn stamp_branch(&mut self, x: Option<usize>, y: Option<usize>, z: usize) {
        if let Some(i) = x {
            self.add(z, i, 1.0);
            self.add(i, z, 1.0);
        }
        if let Some(j) = y {
            self.add(z, j, -1.0);
            self.add(j, z, -1.0);
        }
    }

    /// Stamp a source current `h` flowing into x and out of y.
    pub fn stamp_current_injection(&mut self, x: Option<usize>, y: Option<usize>, h: f64) {
        self.add_source(x, h);
        self.add_source(y, -h);
    }

    /// Perform LU decomposition with partial pivoting.
    pub fn factor(&mut self) -> Result<()> {
        let n = self.size;
        self.lu.copy_from_slice(&self.a);

        for (i, p) in self.pivots.iter_mut().enumerate() {
            *p = i;
        }

        for k in 0..n {
            // Find pivot
            let mut max_val = self.lu[k * n + k].abs();
            let mut max_row = k;
            for i in (k + 1)..n {
                let val = self.lu[i * n + k].abs();
                if val > max_val {
                    max_val = val;
                    max_row = i;
                }
            }

            if !(max_val >= PIVOT_EPSILON) {
                return Err(PowerSimError::SingularMatrix);
            }

            if max_row != k {
                self.pivots.swap(k, max_row);
                for j in 0..n {
                    self.lu.swap(k * n + j, max_row * n + j);
                }
            }

            // Eliminate
            let pivot = self.lu[k * n + k];
            for i in (k + 1)..n {
                let factor = self.lu[i * n + k] / pivot;
                self.lu[i * n + k] = factor;
                for j in (k + 1)..n {
                    self.lu[i * n + j] -= factor * self.lu[k * n + j];
                }
            }
        }

        Ok(())
    }

    /// Solve using the decomposition from [`factor`](Self::factor).
    pub fn solve(&mut self) -> Result<()> {
        let n = self.size;

        for i in 0..n {
            self.x[i] = self.b[self.pivots[i]];
        }

        // Forward substitution (L * y = Pb)
        for i in 0..n {
            for j in 0..i {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
        }

        // Back substitution (U * x = y)
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                self.x[i] -= self.lu[i * n + j] * self.x[j];
            }
            let diag = self.lu[i * n + i];
            if diag.abs() < PIVOT_EPSILON {
                return Err(PowerSimError::SingularMatrix);
            }
            self.x[i] /= diag;
        }

        if self.x.iter().any(|v| !v.is_finite()) {
            return Err(PowerSimError::SingularMatrix);
        }

        Ok(())
    }

    /// Factor and solve in one call.
    pub fn factor_and_solve(&mut self) -> Result<&[f64]> {
        self.factor()?;
        self.solve()?;
        Ok(&self.x)
    }

    /// Value of a solution row (0 for ground).
    pub fn voltage(&self, row: Option<usize>) -> f64 {
        row.map_or(0.0, |i| self.x[i])
    }
}
