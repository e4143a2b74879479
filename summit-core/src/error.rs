//! Solver error types.

use thiserror::Error;

/// Errors reported by the SQP driver and its collaborators.
#[derive(Error, Debug)]
pub enum SqpError {
    /// Invalid solver configuration, fatal at init.
    #[error("configuration error: {0}")]
    Config(String),

    /// Evaluator or problem data with inconsistent dimensions, fatal at init.
    #[error("dimension mismatch in {slot}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Name of the offending input
        slot: &'static str,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// Lower bound above upper bound in the problem data.
    #[error("infeasible bounds: {0}")]
    InfeasibleBounds(String),

    /// QP subsolver failure. Propagated up, the driver does not recover.
    #[error("QP subsolver failed: {0}")]
    QpFailure(String),
}
