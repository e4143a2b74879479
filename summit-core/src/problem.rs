//! Problem data structures, solver settings and results.
//!
//! The solver works with nonlinear programs of the form
//!
//! ```text
//! minimize    f(x)
//! subject to  lbg <= g(x) <= ubg
//!             lbx <=  x   <= ubx
//! ```
//!
//! where f and g are supplied as black-box evaluators (see [`crate::eval`]).

use std::collections::BTreeSet;
use std::fmt;

use crate::error::SqpError;
use crate::eval::{Evaluator, LagrangianHessian};

/// A nonlinear program: evaluators, bounds and the initial guess.
pub struct NlpProblem {
    /// Objective evaluator, scalar-valued (dim_out = 1).
    pub objective: Box<dyn Evaluator>,

    /// Constraint evaluator g, or None for m = 0.
    pub constraints: Option<Box<dyn Evaluator>>,

    /// Lagrangian Hessian evaluator, required for exact-Hessian mode.
    pub hessian: Option<Box<dyn LagrangianHessian>>,

    /// Variable lower bounds (length n, -inf allowed).
    pub lbx: Vec<f64>,

    /// Variable upper bounds (length n, +inf allowed).
    pub ubx: Vec<f64>,

    /// Constraint lower bounds (length m).
    pub lbg: Vec<f64>,

    /// Constraint upper bounds (length m).
    pub ubg: Vec<f64>,

    /// Initial guess (length n).
    pub x_init: Vec<f64>,

    /// Static parameter latched into every evaluator at the start of a
    /// solve, for parametric problems.
    pub param: Option<Vec<f64>>,
}

impl NlpProblem {
    /// Number of decision variables n.
    pub fn num_vars(&self) -> usize {
        self.x_init.len()
    }

    /// Number of general constraints m.
    pub fn num_constraints(&self) -> usize {
        self.lbg.len()
    }

    /// Validate dimensions and bound ordering. Fatal at init.
    pub fn validate(&self) -> Result<(), SqpError> {
        let n = self.num_vars();
        let m = self.num_constraints();

        if self.objective.dim_in() != n {
            return Err(SqpError::DimensionMismatch {
                slot: "objective input",
                expected: n,
                actual: self.objective.dim_in(),
            });
        }
        if self.objective.dim_out() != 1 {
            return Err(SqpError::DimensionMismatch {
                slot: "objective output",
                expected: 1,
                actual: self.objective.dim_out(),
            });
        }

        for (slot, len) in [("lbx", self.lbx.len()), ("ubx", self.ubx.len())] {
            if len != n {
                return Err(SqpError::DimensionMismatch {
                    slot,
                    expected: n,
                    actual: len,
                });
            }
        }
        if self.ubg.len() != m {
            return Err(SqpError::DimensionMismatch {
                slot: "ubg",
                expected: m,
                actual: self.ubg.len(),
            });
        }

        match &self.constraints {
            Some(g) => {
                if g.dim_in() != n {
                    return Err(SqpError::DimensionMismatch {
                        slot: "constraint input",
                        expected: n,
                        actual: g.dim_in(),
                    });
                }
                if g.dim_out() != m {
                    return Err(SqpError::DimensionMismatch {
                        slot: "constraint output",
                        expected: m,
                        actual: g.dim_out(),
                    });
                }
            }
            None => {
                if m != 0 {
                    return Err(SqpError::DimensionMismatch {
                        slot: "constraints",
                        expected: m,
                        actual: 0,
                    });
                }
            }
        }

        for j in 0..n {
            if self.lbx[j] > self.ubx[j] {
                return Err(SqpError::InfeasibleBounds(format!(
                    "variable {}: lbx = {} > ubx = {}",
                    j, self.lbx[j], self.ubx[j]
                )));
            }
        }
        for j in 0..m {
            if self.lbg[j] > self.ubg[j] {
                return Err(SqpError::InfeasibleBounds(format!(
                    "constraint {}: lbg = {} > ubg = {}",
                    j, self.lbg[j], self.ubg[j]
                )));
            }
        }

        Ok(())
    }
}

/// Hessian model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HessianApprox {
    /// Damped BFGS with periodic restart, dense B, initial value I.
    LimitedMemory,
    /// Exact Lagrangian Hessian, optionally Gershgorin-regularized.
    Exact,
}

/// Diagnostic monitors, each enabling a dump of one evaluation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Monitor {
    /// Objective values
    EvalF,
    /// Constraint values
    EvalG,
    /// Constraint Jacobian
    EvalJacG,
    /// Objective gradient
    EvalGradF,
    /// Hessian model
    EvalH,
    /// QP subproblem inputs
    Qp,
    /// QP primal solution (the correction dx)
    Dx,
}

/// Solver settings and parameters.
///
/// The QP subsolver itself is not a settings entry: it is a typed
/// [`crate::qp::QpFactory`] argument of [`crate::solve`], and any
/// subsolver-specific options ride on the user's factory value.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Hessian model for the QP subproblem.
    pub hessian_approximation: HessianApprox,

    /// Maximum number of outer SQP iterations.
    pub maxiter: usize,

    /// Maximum number of line-search trials per iteration.
    pub maxiter_ls: usize,

    /// Stopping tolerance for primal infeasibility.
    pub tol_pr: f64,

    /// Stopping tolerance for dual infeasibility.
    pub tol_du: f64,

    /// Armijo coefficient: required decrease in the merit function.
    pub c1: f64,

    /// Line-search backtracking ratio, in (0, 1).
    pub beta: f64,

    /// Size of the nonmonotone merit-value window.
    pub merit_memory: usize,

    /// BFGS restart period (the approximation itself is a full dense
    /// matrix; this is how often it collapses to its diagonal).
    pub lbfgs_memory: usize,

    /// Gershgorin regularization of the exact Lagrangian Hessian.
    pub regularize: bool,

    /// Print the per-iteration log.
    pub verbose: bool,

    /// Enabled diagnostic monitors.
    pub monitor: BTreeSet<Monitor>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            hessian_approximation: HessianApprox::LimitedMemory,
            maxiter: 50,
            maxiter_ls: 3,
            tol_pr: 1e-6,
            tol_du: 1e-6,
            c1: 1e-4,
            beta: 0.8,
            merit_memory: 4,
            lbfgs_memory: 10,
            regularize: false,
            verbose: true,
            monitor: BTreeSet::new(),
        }
    }
}

impl SolverSettings {
    /// Whether a diagnostic monitor is enabled.
    pub fn monitored(&self, m: Monitor) -> bool {
        self.monitor.contains(&m)
    }
}

/// Solve outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// KKT tolerances met.
    Converged,
    /// Iteration cap reached before convergence.
    MaxIters,
    /// The user callback requested an abort.
    CallbackAbort,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Converged => write!(f, "Converged"),
            SolveStatus::MaxIters => write!(f, "MaxIters"),
            SolveStatus::CallbackAbort => write!(f, "CallbackAbort"),
        }
    }
}

/// Solution and diagnostics returned by [`crate::solve`].
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// Termination status.
    pub status: SolveStatus,

    /// Objective value at the final iterate.
    pub f: f64,

    /// Final iterate (length n).
    pub x: Vec<f64>,

    /// Multipliers for the general constraints (length m).
    pub mu: Vec<f64>,

    /// Multipliers for the bound constraints (length n).
    pub mu_x: Vec<f64>,

    /// Constraint values at the final iterate (length m).
    pub g: Vec<f64>,

    /// Statistics.
    pub info: SolveInfo,
}

/// Solve statistics.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    /// Number of outer iterations performed.
    pub iter_count: usize,

    /// Total wall time of the solve (milliseconds).
    pub solve_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scalar1d;

    impl Evaluator for Scalar1d {
        fn dim_in(&self) -> usize {
            1
        }

        fn dim_out(&self) -> usize {
            1
        }

        fn value(&self, x: &[f64]) -> Vec<f64> {
            vec![x[0] * x[0]]
        }

        fn forward(&self, x: &[f64], seed: &[f64]) -> Vec<f64> {
            vec![2.0 * x[0] * seed[0]]
        }

        fn reverse(&self, x: &[f64], seed: &[f64]) -> Vec<f64> {
            vec![2.0 * x[0] * seed[0]]
        }
    }

    fn unconstrained_1d() -> NlpProblem {
        NlpProblem {
            objective: Box::new(Scalar1d),
            constraints: None,
            hessian: None,
            lbx: vec![f64::NEG_INFINITY],
            ubx: vec![f64::INFINITY],
            lbg: vec![],
            ubg: vec![],
            x_init: vec![1.0],
            param: None,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(unconstrained_1d().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_bounds() {
        let mut prob = unconstrained_1d();
        prob.lbx = vec![2.0];
        prob.ubx = vec![1.0];
        assert!(matches!(
            prob.validate(),
            Err(SqpError::InfeasibleBounds(_))
        ));
    }

    #[test]
    fn test_validate_rejects_dimension_mismatch() {
        let mut prob = unconstrained_1d();
        prob.lbg = vec![0.0];
        prob.ubg = vec![0.0];
        // m = 1 but no constraint evaluator
        assert!(matches!(
            prob.validate(),
            Err(SqpError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_default_settings_match_documented_values() {
        let s = SolverSettings::default();
        assert_eq!(s.maxiter, 50);
        assert_eq!(s.maxiter_ls, 3);
        assert_eq!(s.tol_pr, 1e-6);
        assert_eq!(s.tol_du, 1e-6);
        assert_eq!(s.c1, 1e-4);
        assert_eq!(s.beta, 0.8);
        assert_eq!(s.merit_memory, 4);
        assert_eq!(s.lbfgs_memory, 10);
        assert!(!s.regularize);
        assert_eq!(s.hessian_approximation, HessianApprox::LimitedMemory);
    }
}
