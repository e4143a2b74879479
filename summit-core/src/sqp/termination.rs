//! KKT convergence test and termination decision.

use crate::linalg;
use crate::problem::{SolveStatus, SolverSettings};

/// Two-sided limits closer than this are treated as equalities.
const EQUALITY_THRESHOLD: f64 = 1e-20;

/// Primal infeasibility: L1 violation of the general constraints plus the
/// variable bounds. Equality rows (ub - lb below the threshold) contribute
/// their absolute residual |v - lb|.
pub fn primal_infeasibility(
    g: &[f64],
    lbg: &[f64],
    ubg: &[f64],
    x: &[f64],
    lbx: &[f64],
    ubx: &[f64],
) -> f64 {
    let mut pr_inf = 0.0;
    for j in 0..g.len() {
        if ubg[j] - lbg[j] < EQUALITY_THRESHOLD {
            pr_inf += (g[j] - lbg[j]).abs();
        } else {
            pr_inf += (lbg[j] - g[j]).max(0.0) + (g[j] - ubg[j]).max(0.0);
        }
    }
    for j in 0..x.len() {
        if ubx[j] - lbx[j] < EQUALITY_THRESHOLD {
            pr_inf += (x[j] - lbx[j]).abs();
        } else {
            pr_inf += (lbx[j] - x[j]).max(0.0) + (x[j] - ubx[j]).max(0.0);
        }
    }
    pr_inf
}

/// Dual infeasibility: the 1-norm of the Lagrangian gradient.
pub fn dual_infeasibility(glag: &[f64]) -> f64 {
    linalg::norm_1(glag)
}

/// Termination decision for iteration `iter` (1-indexed).
///
/// Returns `Some(status)` when the driver should stop: convergence when
/// both infeasibilities are below tolerance, the iteration cap otherwise.
/// Callback aborts are decided by the driver, not here.
pub fn check_termination(
    iter: usize,
    pr_inf: f64,
    du_inf: f64,
    settings: &SolverSettings,
) -> Option<SolveStatus> {
    if pr_inf < settings.tol_pr && du_inf < settings.tol_du {
        return Some(SolveStatus::Converged);
    }
    if iter >= settings.maxiter {
        return Some(SolveStatus::MaxIters);
    }
    None
}
