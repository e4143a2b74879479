//! Summit: a sequential quadratic programming solver for smooth,
//! constrained nonlinear programs
//!
//! ```text
//! minimize    f(x)
//! subject to  lbg <= g(x) <= ubg
//!             lbx <=  x   <= ubx
//! ```
//!
//! The driver iterates toward a KKT point using a QP subproblem linearized
//! at the current iterate, a Hessian model (exact Lagrangian Hessian with
//! Gershgorin regularization, or damped BFGS with periodic restart) and a
//! nonmonotone L1 merit-function line search.
//!
//! The NLP functions enter as black-box evaluators with forward/reverse
//! derivative passes ([`eval::Evaluator`]); the QP subproblems are handed
//! to an external subsolver behind [`qp::QpSolver`]. The companion
//! `summit-qp` crate ships a dense interior-point reference subsolver.
//!
//! # Example
//!
//! ```ignore
//! use summit_core::{solve, NlpProblem, SolverSettings};
//! use summit_qp::DenseQpFactory;
//!
//! let mut prob = NlpProblem { /* evaluators, bounds, x_init */ };
//! let settings = SolverSettings::default();
//! let result = solve(&mut prob, &settings, &DenseQpFactory::default(), None)?;
//!
//! println!("status: {}", result.status);
//! println!("f* = {}, x* = {:?}", result.f, result.x);
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod eval;
pub mod hessian;
pub mod linalg;
pub mod merit;
pub mod problem;
pub mod qp;
pub mod sqp;

pub use error::SqpError;
pub use eval::{Evaluator, LagrangianHessian};
pub use problem::{
    HessianApprox, Monitor, NlpProblem, SolveInfo, SolveResult, SolveStatus, SolverSettings,
};
pub use sqp::{solve, Callback, IterationInfo};
