//! Nonmonotone backtracking line search on the L1 merit function.
//!
//! The sufficient-decrease test compares the candidate merit against the
//! maximum over the recent merit window, not the current value, so a step
//! may be accepted even when the merit rises locally. When the trial
//! budget runs out the last candidate is accepted anyway; the caller only
//! learns about it through the `exhausted` flag.

use crate::eval::Evaluator;
use crate::merit;

/// Line-search parameters, lifted from the solver settings.
pub struct LineSearchParams {
    /// Armijo coefficient.
    pub c1: f64,
    /// Backtracking ratio, in (0, 1).
    pub beta: f64,
    /// Trial budget.
    pub maxiter_ls: usize,
}

/// Accepted step and the evaluations made at it.
pub struct LineSearchOutcome {
    /// Accepted stepsize; the candidate buffer holds x + t p.
    pub t: f64,
    /// Objective value at the candidate.
    pub f_cand: f64,
    /// Constraint values at the candidate (empty when m = 0).
    pub g_cand: Vec<f64>,
    /// Number of trials spent.
    pub trials: usize,
    /// The trial budget was hit (the 'F' marker in the log).
    pub exhausted: bool,
}

/// Backtrack from t = 1 until the candidate merit passes the nonmonotone
/// Armijo test phi(x + t p) <= reference + t c1 d1, or the budget is spent.
///
/// `d1` is the merit's directional derivative approximation and
/// `reference` the maximum of the merit window. On return `x_cand` holds
/// the accepted point.
#[allow(clippy::too_many_arguments)]
pub fn backtrack(
    params: &LineSearchParams,
    objective: &dyn Evaluator,
    constraints: Option<&dyn Evaluator>,
    lbg: &[f64],
    ubg: &[f64],
    x: &[f64],
    p: &[f64],
    sigma: f64,
    d1: f64,
    reference: f64,
    x_cand: &mut [f64],
) -> LineSearchOutcome {
    let mut t = 1.0;
    let mut trials = 0;

    loop {
        trials += 1;
        for i in 0..x.len() {
            x_cand[i] = x[i] + t * p[i];
        }

        let f_cand = objective.value(x_cand)[0];
        let g_cand = match constraints {
            Some(g) => g.value(x_cand),
            None => Vec::new(),
        };
        let phi = f_cand + sigma * merit::l1_infeasibility(&g_cand, lbg, ubg);

        let accepted = phi <= reference + t * params.c1 * d1;
        let out_of_budget = trials == params.maxiter_ls;
        if accepted || out_of_budget {
            return LineSearchOutcome {
                t,
                f_cand,
                g_cand,
                trials,
                exhausted: out_of_budget,
            };
        }

        t *= params.beta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// f(x) = x^2 in one variable.
    struct Square;

    impl Evaluator for Square {
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

    /// Constant objective, for exercising the acceptance test in isolation.
    struct Constant(f64);

    impl Evaluator for Constant {
        fn dim_in(&self) -> usize {
            1
        }

        fn dim_out(&self) -> usize {
            1
        }

        fn value(&self, _x: &[f64]) -> Vec<f64> {
            vec![self.0]
        }

        fn forward(&self, _x: &[f64], _seed: &[f64]) -> Vec<f64> {
            vec![0.0]
        }

        fn reverse(&self, _x: &[f64], _seed: &[f64]) -> Vec<f64> {
            vec![0.0]
        }
    }

    fn params(maxiter_ls: usize) -> LineSearchParams {
        LineSearchParams {
            c1: 1e-4,
            beta: 0.8,
            maxiter_ls,
        }
    }

    #[test]
    fn test_backtracks_on_overlong_step() {
        // x = 1, p = -2: the full step lands at f = 1 with no decrease,
        // one backtrack reaches f = 0.36
        let mut x_cand = [0.0];
        let out = backtrack(
            &params(10),
            &Square,
            None,
            &[],
            &[],
            &[1.0],
            &[-2.0],
            0.0,
            -4.0,
            1.0,
            &mut x_cand,
        );
        assert_eq!(out.trials, 2);
        assert_relative_eq!(out.t, 0.8);
        assert_relative_eq!(out.f_cand, 0.36, epsilon = 1e-12);
        assert_relative_eq!(x_cand[0], -0.6, epsilon = 1e-12);
        assert!(!out.exhausted);
    }

    #[test]
    fn test_budget_of_one_accepts_full_step() {
        let mut x_cand = [0.0];
        let out = backtrack(
            &params(1),
            &Square,
            None,
            &[],
            &[],
            &[1.0],
            &[-2.0],
            0.0,
            -4.0,
            1.0,
            &mut x_cand,
        );
        assert_eq!(out.t, 1.0);
        assert_eq!(out.trials, 1);
        assert!(out.exhausted);
        assert_relative_eq!(x_cand[0], -1.0);
    }

    #[test]
    fn test_nonmonotone_reference_accepts_local_increase() {
        // Candidate merit 11.5 with zero directional derivative is
        // accepted against the window maximum 12 even though the most
        // recent merit (9) is lower
        let mut x_cand = [0.0];
        let out = backtrack(
            &params(3),
            &Constant(11.5),
            None,
            &[],
            &[],
            &[0.0],
            &[1.0],
            0.0,
            0.0,
            12.0,
            &mut x_cand,
        );
        assert_eq!(out.trials, 1);
        assert_eq!(out.t, 1.0);
        assert!(!out.exhausted);
    }

    #[test]
    fn test_constraint_violation_enters_merit() {
        // Constant objective 0, constraint g(x) = x with lbg = 1: at the
        // candidate x = 0 the violation is 1, so with sigma = 10 the
        // merit is 10 and a reference of 5 rejects every trial
        struct Ident;
        impl Evaluator for Ident {
            fn dim_in(&self) -> usize {
                1
            }
            fn dim_out(&self) -> usize {
                1
            }
            fn value(&self, x: &[f64]) -> Vec<f64> {
                x.to_vec()
            }
            fn forward(&self, _x: &[f64], seed: &[f64]) -> Vec<f64> {
                seed.to_vec()
            }
            fn reverse(&self, _x: &[f64], seed: &[f64]) -> Vec<f64> {
                seed.to_vec()
            }
        }

        let mut x_cand = [0.0];
        let out = backtrack(
            &params(3),
            &Constant(0.0),
            Some(&Ident),
            &[1.0],
            &[f64::INFINITY],
            &[0.0],
            &[0.0],
            10.0,
            0.0,
            5.0,
            &mut x_cand,
        );
        assert!(out.exhausted);
        assert_eq!(out.trials, 3);
        assert_eq!(out.g_cand, vec![0.0]);
    }
}
