//! QP subsolver contract.
//!
//! The driver solves, at each outer iteration, the subproblem
//!
//! ```text
//! minimize    1/2 p' H p + G' p
//! subject to  LBA <= A p <= UBA
//!             LBX <=  p  <= UBX
//! ```
//!
//! with the bounds already shifted to the current linearization point
//! (LBX = lbx - x and so on); a subsolver never sees the raw NLP bounds.
//! The subsolver is an exclusive, non-reentrant resource owned by the
//! driver for the duration of a solve.

use crate::error::SqpError;
use crate::linalg::SparseCsc;

/// One QP subproblem, passed by reference each outer iteration.
///
/// `h` carries the full symmetric matrix (both triangles stored) on the
/// sparsity pattern the solver was constructed with; `a` is m-by-n and has
/// zero rows when the NLP is unconstrained. `x_init` is the primal warm
/// start when a previous correction is available; there is deliberately no
/// dual warm-start slot.
pub struct QpProblem<'a> {
    /// Hessian of the QP objective.
    pub h: &'a SparseCsc,
    /// Gradient of the QP objective.
    pub g: &'a [f64],
    /// Constraint Jacobian.
    pub a: &'a SparseCsc,
    /// Lower limits on A p (shifted).
    pub lba: &'a [f64],
    /// Upper limits on A p (shifted).
    pub uba: &'a [f64],
    /// Lower limits on p (shifted).
    pub lbx: &'a [f64],
    /// Upper limits on p (shifted).
    pub ubx: &'a [f64],
    /// Primal warm start.
    pub x_init: Option<&'a [f64]>,
}

/// QP solution.
///
/// Multipliers are signed so that `H p + G + A' lambda_a + lambda_x = 0`
/// at the optimum: nonnegative for an active upper limit, nonpositive for
/// an active lower limit.
#[derive(Debug, Clone)]
pub struct QpSolution {
    /// Primal solution p (length n).
    pub primal: Vec<f64>,
    /// Multipliers for the A p rows (length m).
    pub lambda_a: Vec<f64>,
    /// Multipliers for the variable limits (length n).
    pub lambda_x: Vec<f64>,
}

/// A QP subsolver instance, constructed once per SQP solve.
pub trait QpSolver {
    /// Solve one subproblem. Failures are propagated up unchanged; the
    /// driver does not attempt recovery.
    fn solve(&mut self, qp: &QpProblem<'_>) -> Result<QpSolution, SqpError>;
}

/// Constructor for QP subsolvers.
///
/// `create` receives the sparsity patterns of H and A once, before the
/// first iteration; per-iteration values arrive through
/// [`QpSolver::solve`]. Subsolver-specific options belong on the factory
/// value itself.
pub trait QpFactory {
    /// The subsolver this factory builds.
    type Solver: QpSolver;

    /// Build a subsolver for the given problem structure.
    fn create(
        &self,
        h_sparsity: &SparseCsc,
        a_sparsity: &SparseCsc,
    ) -> Result<Self::Solver, SqpError>;
}
