//! Primal active-set solver for small convex quadratic programs of the form
//!
//! ```text
//! minimize   ½ wᵗQw + cᵗw
//! subject to E w = f
//!            lower ≤ w_i ≤ upper   for every i
//! ```
//!
//! `Q` must be positive-definite. Each iteration solves the equality-constrained
//! subproblem on the free variables through its KKT system; rank-deficient
//! systems (e.g. free assets with identical expected returns) are handled by
//! an SVD least-squares solve.

use nalgebra::{DMatrix, DVector};

use crate::errors::CoreError;

/// Problem data. Rows of `equality` are the linear equality constraints.
#[derive(Debug, Clone)]
pub struct BoxedQuadraticProgram<'a> {
    pub hessian: &'a DMatrix<f64>,
    pub linear: DVector<f64>,
    pub equality: DMatrix<f64>,
    pub equality_rhs: DVector<f64>,
    pub lower: f64,
    pub upper: f64,
}

impl BoxedQuadraticProgram<'_> {
    pub fn dim(&self) -> usize {
        self.hessian.nrows()
    }

    pub fn objective(&self, w: &DVector<f64>) -> f64 {
        0.5 * w.dot(&(self.hessian * w)) + self.linear.dot(w)
    }

    /// Whether `w` satisfies every constraint within `tolerance`.
    pub fn is_feasible(&self, w: &DVector<f64>, tolerance: f64) -> bool {
        let residual = &self.equality * w - &self.equality_rhs;
        residual.amax() <= tolerance
            && w
                .iter()
                .all(|x| *x >= self.lower - tolerance && *x <= self.upper + tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
}

/// Active-set QP solver.
#[derive(Debug, Clone)]
pub struct ActiveSetSolver {
    tolerance: f64,
    max_iterations: usize,
}

impl ActiveSetSolver {
    pub fn new(tolerance: f64, max_iterations: usize) -> Self {
        Self {
            tolerance,
            max_iterations,
        }
    }

    /// Solve `qp` starting from the feasible point `start`.
    pub fn solve(
        &self,
        qp: &BoxedQuadraticProgram<'_>,
        start: DVector<f64>,
    ) -> Result<DVector<f64>, CoreError> {
        let n = qp.dim();
        if start.len() != n || qp.equality.ncols() != n {
            return Err(CoreError::NumericSolver(format!(
                "dimension mismatch: {n} variables, start of length {}, {} constraint columns",
                start.len(),
                qp.equality.ncols()
            )));
        }
        if !qp.is_feasible(&start, 1e-9) {
            return Err(CoreError::NumericSolver(
                "starting point violates the constraints".into(),
            ));
        }

        let mut w = start;
        let mut working: Vec<Option<Bound>> = vec![None; n];

        for iteration in 0..self.max_iterations {
            let gradient = qp.hessian * &w + &qp.linear;
            let free: Vec<usize> = (0..n).filter(|&i| working[i].is_none()).collect();
            let (step_free, multipliers) = Self::equality_step(qp, &gradient, &free)?;

            let mut step = DVector::zeros(n);
            for (k, &i) in free.iter().enumerate() {
                step[i] = step_free[k];
            }

            if step.amax() <= self.tolerance {
                // Stationary on the working set: check the sign of each bound multiplier.
                let residual = &gradient + qp.equality.transpose() * &multipliers;
                let threshold = self.tolerance * (1.0 + gradient.amax());
                let mut release: Option<(usize, f64)> = None;
                for (i, bound) in working.iter().enumerate() {
                    let violation = match bound {
                        Some(Bound::Lower) => -residual[i],
                        Some(Bound::Upper) => residual[i],
                        None => continue,
                    };
                    if violation > threshold && release.map_or(true, |(_, v)| violation > v) {
                        release = Some((i, violation));
                    }
                }
                match release {
                    Some((i, _)) => working[i] = None,
                    None => {
                        tracing::trace!(iterations = iteration + 1, "active-set solver converged");
                        return Ok(w);
                    }
                }
                continue;
            }

            let mut alpha = 1.0_f64;
            let mut blocking = None;
            for &i in &free {
                let p = step[i];
                let (limit, bound) = if p < 0.0 {
                    ((qp.lower - w[i]) / p, Bound::Lower)
                } else if p > 0.0 {
                    ((qp.upper - w[i]) / p, Bound::Upper)
                } else {
                    continue;
                };
                if limit < alpha {
                    alpha = limit.max(0.0);
                    blocking = Some((i, bound));
                }
            }

            w.axpy(alpha, &step, 1.0);
            if let Some((i, bound)) = blocking {
                w[i] = match bound {
                    Bound::Lower => qp.lower,
                    Bound::Upper => qp.upper,
                };
                working[i] = Some(bound);
            }
        }

        Err(CoreError::NumericSolver(format!(
            "active-set solver did not converge in {} iterations",
            self.max_iterations
        )))
    }

    /// Solve the KKT system of the equality-constrained subproblem on `free`:
    ///
    /// ```text
    /// [ Q_FF  E_Fᵗ ] [ p_F ]   [ -g_F ]
    /// [ E_F   0    ] [ ν   ] = [  0   ]
    /// ```
    fn equality_step(
        qp: &BoxedQuadraticProgram<'_>,
        gradient: &DVector<f64>,
        free: &[usize],
    ) -> Result<(DVector<f64>, DVector<f64>), CoreError> {
        let k = free.len();
        let m = qp.equality.nrows();
        let mut kkt = DMatrix::zeros(k + m, k + m);
        let mut rhs = DVector::zeros(k + m);

        for (a, &i) in free.iter().enumerate() {
            for (b, &j) in free.iter().enumerate() {
                kkt[(a, b)] = qp.hessian[(i, j)];
            }
            for r in 0..m {
                kkt[(a, k + r)] = qp.equality[(r, i)];
                kkt[(k + r, a)] = qp.equality[(r, i)];
            }
            rhs[a] = -gradient[i];
        }

        let svd = kkt.svd(true, true);
        let largest = svd.singular_values.max();
        if !largest.is_finite() {
            return Err(CoreError::NumericSolver("KKT system is not finite".into()));
        }
        let solution = svd
            .solve(&rhs, largest * 1e-12)
            .map_err(|e| CoreError::NumericSolver(format!("KKT solve failed: {e}")))?;

        let step = solution.rows(0, k).into_owned();
        let multipliers = solution.rows(k, m).into_owned();
        Ok((step, multipliers))
    }
}
