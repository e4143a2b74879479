//! Hessian model for the QP subproblem.
//!
//! Two modes: the exact Lagrangian Hessian with optional Gershgorin
//! regularization, or a damped BFGS approximation with periodic restart.
//! Despite the `lbfgs_memory` option name, the approximation is a full
//! dense matrix; the "memory" is the restart period, not a limited-history
//! formulation.

use nalgebra::DMatrix;

use crate::linalg::{self, SparseCsc};
use crate::problem::HessianApprox;

/// Divisor floor for the BFGS update: the update is applied whatever the
/// curvature products turn out to be, so the clamp keeps the sign and
/// only rules out a literal division by zero.
const DIV_FLOOR: f64 = 1e-300;

#[inline]
fn clamped(d: f64) -> f64 {
    if d.abs() < DIV_FLOOR {
        DIV_FLOOR.copysign(d)
    } else {
        d
    }
}

/// Powell damping factor omega.
///
/// omega = 1 when s'y >= 0.2 s'Bs, otherwise the interpolation weight that
/// moves y toward Bs far enough that the damped product equals 0.2 s'Bs.
fn damping_factor(sy: f64, sq: f64) -> f64 {
    if sy >= 0.2 * sq {
        1.0
    } else {
        0.8 * sq / clamped(sq - sy)
    }
}

/// The smallest nonnegative diagonal shift that makes every Gershgorin
/// row bound of `b` nonnegative.
///
/// This is a cheap sufficient bound, not the smallest shift that would
/// make `b` positive definite.
fn gershgorin_shift(b: &DMatrix<f64>) -> f64 {
    let n = b.nrows();
    let mut tau = 0.0_f64;
    for i in 0..n {
        let mut radius = 0.0;
        for j in 0..n {
            if i != j {
                radius += b[(i, j)].abs();
            }
        }
        let lower = b[(i, i)] - radius;
        if lower < tau {
            tau = lower;
        }
    }
    -tau
}

/// Maintains the matrix B supplied to each QP subproblem.
pub struct HessianModel {
    b: DMatrix<f64>,
    pattern: SparseCsc,
    approx: HessianApprox,
    regularize: bool,
    restart_period: usize,
    /// Accepted updates since init; drives the restart schedule.
    updates: usize,
}

impl HessianModel {
    /// Create the model. `user_sparsity` is the pattern of the exact
    /// Hessian evaluator when one is in play; the stored pattern is its
    /// union with the identity so the diagonal is always present.
    pub fn new(
        n: usize,
        approx: HessianApprox,
        regularize: bool,
        lbfgs_memory: usize,
        user_sparsity: Option<&SparseCsc>,
    ) -> Self {
        let base = match (approx, user_sparsity) {
            (HessianApprox::Exact, Some(sp)) => sp.clone(),
            _ => linalg::dense_pattern(n, n),
        };
        let pattern = linalg::pattern_union(&base, &linalg::identity_pattern(n));
        Self {
            b: DMatrix::identity(n, n),
            pattern,
            approx,
            regularize,
            restart_period: lbfgs_memory.max(1),
            updates: 0,
        }
    }

    /// Sparsity pattern of B, for QP subsolver construction.
    pub fn pattern(&self) -> &SparseCsc {
        &self.pattern
    }

    /// Current B.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.b
    }

    /// Current B on the stored sparsity pattern, for the QP H slot.
    pub fn as_sparse(&self) -> SparseCsc {
        linalg::dense_on_pattern(&self.b, &self.pattern)
    }

    /// p' B p.
    pub fn quadratic_form(&self, p: &[f64]) -> f64 {
        let n = self.b.nrows();
        let mut acc = 0.0;
        for i in 0..n {
            let mut row = 0.0;
            for j in 0..n {
                row += self.b[(i, j)] * p[j];
            }
            acc += row * p[i];
        }
        acc
    }

    /// Exact mode: replace B by the evaluated Lagrangian Hessian and, if
    /// regularization is on, add the Gershgorin shift. Returns the shift
    /// that was applied.
    pub fn load_exact(&mut self, h: &SparseCsc) -> f64 {
        debug_assert_eq!(self.approx, HessianApprox::Exact);
        linalg::sparse_to_dense(h, &mut self.b);
        if !self.regularize {
            return 0.0;
        }
        let shift = gershgorin_shift(&self.b);
        if shift > 0.0 {
            let n = self.b.nrows();
            for i in 0..n {
                self.b[(i, i)] += shift;
            }
        }
        shift
    }

    /// BFGS mode: consume one step pair (s, y) = (x - x_old,
    /// gLag - gLag_old) after an accepted iterate.
    ///
    /// Applies Powell damping, then the dense rank-2 update. Every
    /// `lbfgs_memory`-th call, B first collapses to its diagonal. The
    /// update is applied even when the damped curvature is nonpositive;
    /// that case is only reported.
    pub fn update(&mut self, s: &[f64], y: &[f64]) {
        debug_assert_eq!(self.approx, HessianApprox::LimitedMemory);
        let n = self.b.nrows();

        self.updates += 1;
        if self.updates % self.restart_period == 0 {
            for i in 0..n {
                for j in 0..n {
                    if i != j {
                        self.b[(i, j)] = 0.0;
                    }
                }
            }
        }

        // q = B s
        let mut q = vec![0.0; n];
        for i in 0..n {
            let mut acc = 0.0;
            for j in 0..n {
                acc += self.b[(i, j)] * s[j];
            }
            q[i] = acc;
        }

        let sy = linalg::dot(s, y);
        let sq = linalg::dot(s, &q);
        let omega = damping_factor(sy, sq);

        let mut y_damped = vec![0.0; n];
        for i in 0..n {
            y_damped[i] = omega * y[i] + (1.0 - omega) * q[i];
        }

        let sy_damped = linalg::dot(s, &y_damped);
        if sy_damped <= 0.0 {
            eprintln!(
                "SQP: BFGS curvature s'y = {:.3e} not positive after damping",
                sy_damped
            );
        }

        let theta = 1.0 / clamped(sy_damped);
        let phi = 1.0 / clamped(sq);
        for i in 0..n {
            for j in 0..n {
                self.b[(i, j)] += theta * y_damped[i] * y_damped[j] - phi * q[i] * q[j];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn bfgs_model(n: usize, period: usize) -> HessianModel {
        HessianModel::new(n, HessianApprox::LimitedMemory, false, period, None)
    }

    #[test]
    fn test_initial_matrix_is_identity() {
        let model = bfgs_model(3, 10);
        assert_eq!(model.matrix(), &DMatrix::identity(3, 3));
        // The QP pattern always has a full diagonal
        for i in 0..3 {
            assert!(model.pattern().get(i, i).is_some());
        }
    }

    #[test]
    fn test_damping_factor_range() {
        // No damping when curvature is ample
        assert_eq!(damping_factor(1.0, 1.0), 1.0);
        // Interpolation when 0 <= s'y < 0.2 s'Bs
        for sy in [0.0, 0.05, 0.1, 0.19] {
            let omega = damping_factor(sy, 1.0);
            assert!(omega >= 0.8 && omega <= 1.0, "omega = {}", omega);
        }
    }

    #[test]
    fn test_damped_curvature_positive_when_sbs_positive() {
        // The damped product equals 0.2 s'Bs exactly on the damping branch
        let s = [1.0, 2.0];
        let y = [-0.5, 0.1];
        let mut model = bfgs_model(2, 10);
        let mut q = [0.0; 2];
        for i in 0..2 {
            for j in 0..2 {
                q[i] += model.matrix()[(i, j)] * s[j];
            }
        }
        let sq = linalg::dot(&s, &q);
        let sy = linalg::dot(&s, &y);
        assert!(sy < 0.2 * sq && sq > 0.0);

        let omega = damping_factor(sy, sq);
        let y_damped: Vec<f64> = (0..2).map(|i| omega * y[i] + (1.0 - omega) * q[i]).collect();
        assert_relative_eq!(linalg::dot(&s, &y_damped), 0.2 * sq, epsilon = 1e-12);

        // And the update itself keeps the model usable
        model.update(&s, &y);
        assert!(model.quadratic_form(&s) > 0.0);
    }

    #[test]
    fn test_bfgs_secant_condition_with_damping_off() {
        // With omega = 1 the updated B satisfies B s = y
        let s = [1.0, 0.5];
        let y = [2.0, 1.5];
        let mut model = bfgs_model(2, 10);
        model.update(&s, &y);
        let b = model.matrix();
        for i in 0..2 {
            let bs: f64 = (0..2).map(|j| b[(i, j)] * s[j]).sum();
            assert_relative_eq!(bs, y[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_restart_collapses_to_diagonal_before_update() {
        let mut model = bfgs_model(2, 2);
        // First update introduces off-diagonal structure
        model.update(&[1.0, 0.5], &[2.0, 1.5]);
        assert!(model.matrix()[(0, 1)].abs() > 0.0);

        // Second update restarts first: B is diagonal when the rank-2
        // terms are formed, so B s = diag(B) s feeds the update
        let diag_before: Vec<f64> = (0..2).map(|i| model.matrix()[(i, i)]).collect();
        let s = [1.0, 0.0];
        let y = [diag_before[0], 0.0];
        model.update(&s, &y);
        // With s = e1 and y = B_00 e1 against a diagonal B, the rank-2
        // terms cancel in row 0 and nothing off-diagonal can appear
        assert_relative_eq!(model.matrix()[(0, 1)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(model.matrix()[(1, 0)], 0.0, epsilon = 1e-12);
        assert_relative_eq!(model.matrix()[(1, 1)], diag_before[1], epsilon = 1e-12);
    }

    #[test]
    fn test_gershgorin_regularization_makes_row_bounds_nonnegative() {
        let n = 3;
        let h = linalg::from_triplets(
            n,
            n,
            vec![
                (0, 0, 1.0),
                (0, 1, -2.0),
                (1, 0, -2.0),
                (1, 1, 0.5),
                (2, 2, -1.0),
            ],
        );
        let mut model =
            HessianModel::new(n, HessianApprox::Exact, true, 10, Some(&linalg::dense_pattern(n, n)));
        let shift = model.load_exact(&h);

        // Row 1 has the worst bound: 0.5 - 2.0 = -1.5
        assert_relative_eq!(shift, 1.5, epsilon = 1e-12);
        let b = model.matrix();
        for i in 0..n {
            let radius: f64 = (0..n).filter(|&j| j != i).map(|j| b[(i, j)].abs()).sum();
            assert!(b[(i, i)] - radius >= -1e-12);
        }
    }

    #[test]
    fn test_no_shift_when_rows_already_dominant() {
        let h = linalg::from_triplets(2, 2, vec![(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)]);
        let mut model =
            HessianModel::new(2, HessianApprox::Exact, true, 10, Some(&linalg::dense_pattern(2, 2)));
        let shift = model.load_exact(&h);
        assert_eq!(shift, 0.0);
        assert_eq!(model.matrix()[(0, 0)], 2.0);
    }
}
