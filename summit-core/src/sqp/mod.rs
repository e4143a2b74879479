//! SQP driver.
//!
//! One outer iteration: evaluate the NLP functions at the current point,
//! refresh the Hessian model, assemble and solve the QP subproblem against
//! shifted bounds, line-search the correction on the L1 merit function,
//! commit the iterate and multipliers, feed the step pair to the BFGS
//! model, and decide termination.

pub mod linesearch;
pub mod termination;
pub mod workspace;

use std::time::Instant;

use crate::error::SqpError;
use crate::eval::Evaluator;
use crate::hessian::HessianModel;
use crate::linalg;
use crate::merit::{self, MeritTracker};
use crate::problem::{
    HessianApprox, Monitor, NlpProblem, SolveInfo, SolveResult, SolveStatus, SolverSettings,
};
use crate::qp::{QpFactory, QpProblem, QpSolver};
use linesearch::{backtrack, LineSearchParams};
use workspace::SqpWorkspace;

/// Snapshot of the accepted iterate, handed to the user callback at the
/// end of every iteration.
pub struct IterationInfo<'a> {
    /// Outer iteration counter (1-indexed).
    pub iter: usize,
    /// Objective value.
    pub obj: f64,
    /// Current iterate.
    pub x: &'a [f64],
    /// Multipliers for the general constraints.
    pub mu: &'a [f64],
    /// Multipliers for the bound constraints.
    pub mu_x: &'a [f64],
    /// Constraint values.
    pub g: &'a [f64],
}

/// End-of-iteration callback; returning `true` aborts the solve.
pub type Callback<'a> = dyn FnMut(&IterationInfo<'_>) -> bool + 'a;

const HEADER: &str =
    "   It.           obj        pr_inf        du_inf     corr_norm     stepsize   ls-trials";

/// Solve the NLP.
///
/// The QP subsolver is built once from the Hessian and Jacobian sparsity
/// patterns and owned exclusively for the duration of the call. The
/// callback, when present, is polled at the end of each iteration only.
pub fn solve<Q: QpFactory>(
    prob: &mut NlpProblem,
    settings: &SolverSettings,
    qp_factory: &Q,
    mut callback: Option<&mut Callback<'_>>,
) -> Result<SolveResult, SqpError> {
    let start = Instant::now();

    prob.validate()?;
    let n = prob.num_vars();
    let m = prob.num_constraints();

    // Latch the static parameter; it never changes mid-iteration.
    if let Some(param) = prob.param.clone() {
        prob.objective.set_param(&param);
        if let Some(g) = prob.constraints.as_mut() {
            g.set_param(&param);
        }
        if let Some(h) = prob.hessian.as_mut() {
            h.set_param(&param);
        }
    }

    let user_sparsity = match (settings.hessian_approximation, prob.hessian.as_ref()) {
        (HessianApprox::Exact, Some(h)) => Some(h.sparsity()),
        (HessianApprox::Exact, None) => {
            return Err(SqpError::Config(
                "hessian_approximation is \"exact\" but no Hessian evaluator was supplied".into(),
            ))
        }
        (HessianApprox::LimitedMemory, _) => None,
    };
    let mut hess = HessianModel::new(
        n,
        settings.hessian_approximation,
        settings.regularize,
        settings.lbfgs_memory,
        user_sparsity.as_ref(),
    );
    let a_sparsity = match prob.constraints.as_ref() {
        Some(g) => g.jacobian_sparsity(),
        None => linalg::zero_pattern(0, n),
    };
    let mut qp_solver = qp_factory.create(hess.pattern(), &a_sparsity)?;

    let mut ws = SqpWorkspace::new(n, m, &prob.x_init);
    let mut tracker = MeritTracker::new(settings.merit_memory);
    let ls_params = LineSearchParams {
        c1: settings.c1,
        beta: settings.beta,
        maxiter_ls: settings.maxiter_ls,
    };

    if settings.monitored(Monitor::EvalH)
        && settings.hessian_approximation == HessianApprox::LimitedMemory
    {
        println!("(pre) B = {}", hess.matrix());
    }

    if settings.verbose {
        println!("{}", HEADER);
    }

    let mut fk = 0.0;
    let mut gk: Vec<f64> = vec![0.0; m];
    let mut iter = 1;
    let status;

    loop {
        if settings.verbose && iter % 10 == 0 {
            println!("{}", HEADER);
        }

        // Refresh the Hessian model.
        if settings.hessian_approximation == HessianApprox::Exact {
            if let Some(h_eval) = prob.hessian.as_ref() {
                let h = h_eval.hessian(&ws.x, &ws.mu, 1.0);
                hess.load_exact(&h);
            }
        }
        if settings.monitored(Monitor::EvalH) {
            println!("(main loop) B = {}", hess.matrix());
        }

        // Constraints and their Jacobian.
        let jac = match prob.constraints.as_ref() {
            Some(gfun) => {
                gk = gfun.value(&ws.x);
                if settings.monitored(Monitor::EvalG) {
                    println!("(main loop) x = {:?}", ws.x);
                    println!("(main loop) G = {:?}", gk);
                }
                let jac = gfun.jacobian(&ws.x);
                if settings.monitored(Monitor::EvalJacG) {
                    println!("(main loop) J = {:?}", jac);
                }
                jac
            }
            None => a_sparsity.clone(),
        };

        // Objective value and gradient (reverse pass, seed 1).
        fk = prob.objective.value(&ws.x)[0];
        let gfk = prob.objective.reverse(&ws.x, &[1.0]);
        if settings.monitored(Monitor::EvalF) {
            println!("(main loop) x = {:?}", ws.x);
            println!("(main loop) F = {:e}", fk);
        }
        if settings.monitored(Monitor::EvalGradF) {
            println!("(main loop) gradF = {:?}", gfk);
        }

        // QP subproblem against shifted bounds, primal hot start only.
        ws.shift_bounds(&prob.lbx, &prob.ubx, &prob.lbg, &prob.ubg, &gk);
        let h_qp = hess.as_sparse();
        let qp = QpProblem {
            h: &h_qp,
            g: &gfk,
            a: &jac,
            lba: &ws.lba_shifted,
            uba: &ws.uba_shifted,
            lbx: &ws.lbx_shifted,
            ubx: &ws.ubx_shifted,
            x_init: if ws.p.is_empty() { None } else { Some(&ws.p) },
        };
        if settings.monitored(Monitor::Qp) {
            println!("(main loop) QP_H = {:?}", qp.h);
            println!("(main loop) QP_G = {:?}", qp.g);
            println!("(main loop) QP_A = {:?}", qp.a);
            println!("(main loop) QP_LBA = {:?}", qp.lba);
            println!("(main loop) QP_UBA = {:?}", qp.uba);
            println!("(main loop) QP_LBX = {:?}", qp.lbx);
            println!("(main loop) QP_UBX = {:?}", qp.ubx);
        }
        let sol = qp_solver.solve(&qp)?;
        debug_assert_eq!(sol.primal.len(), n);
        debug_assert_eq!(sol.lambda_a.len(), m);
        debug_assert_eq!(sol.lambda_x.len(), n);

        ws.p = sol.primal;
        if settings.monitored(Monitor::Dx) {
            println!("(main loop) dx = {:?}", ws.p);
        }

        if hess.quadratic_form(&ws.p) < 0.0 {
            eprintln!("SQP: Indefinite Hessian detected...");
        }

        // Penalty update from the QP multipliers, then the merit pieces.
        tracker.update_sigma(&sol.lambda_a);
        let l1_infeas = merit::l1_infeasibility(&gk, &prob.lbg, &prob.ubg);
        let d1 = prob.objective.forward(&ws.x, &ws.p)[0] - tracker.sigma() * l1_infeas;
        tracker.push(tracker.merit(fk, l1_infeas));

        let ls = backtrack(
            &ls_params,
            prob.objective.as_ref(),
            prob.constraints.as_deref(),
            &prob.lbg,
            &prob.ubg,
            &ws.x,
            &ws.p,
            tracker.sigma(),
            d1,
            tracker.reference(),
            &mut ws.x_cand,
        );

        // Commit the candidate; multipliers move by the accepted stepsize.
        ws.x_old.copy_from_slice(&ws.x);
        ws.x.copy_from_slice(&ws.x_cand);
        fk = ls.f_cand;
        gk = ls.g_cand;
        for j in 0..m {
            ws.mu[j] = ls.t * sol.lambda_a[j] + (1.0 - ls.t) * ws.mu[j];
        }
        for i in 0..n {
            ws.mu_x[i] = ls.t * sol.lambda_x[i] + (1.0 - ls.t) * ws.mu_x[i];
        }

        // Lagrangian gradients at both points, under the updated
        // multipliers, via reverse passes.
        lagrangian_gradient(
            prob.objective.as_ref(),
            prob.constraints.as_deref(),
            &ws.x,
            &ws.mu,
            &ws.mu_x,
            &mut ws.glag,
        );
        lagrangian_gradient(
            prob.objective.as_ref(),
            prob.constraints.as_deref(),
            &ws.x_old,
            &ws.mu,
            &ws.mu_x,
            &mut ws.glag_old,
        );

        if settings.hessian_approximation == HessianApprox::LimitedMemory {
            for i in 0..n {
                ws.s[i] = ws.x[i] - ws.x_old[i];
                ws.y[i] = ws.glag[i] - ws.glag_old[i];
            }
            hess.update(&ws.s, &ws.y);
        }

        let pr_inf = termination::primal_infeasibility(
            &gk, &prob.lbg, &prob.ubg, &ws.x, &prob.lbx, &prob.ubx,
        );
        let du_inf = termination::dual_infeasibility(&ws.glag);

        if settings.verbose {
            let marker = if ls.exhausted { 'F' } else { ' ' };
            println!(
                "  {:4}  {:12.4e}  {:12.4e}  {:12.4e}  {:12.4e}  {:11.3e}  {:8}{}",
                iter,
                fk,
                pr_inf,
                du_inf,
                linalg::norm_1(&ws.p),
                ls.t,
                ls.trials,
                marker
            );
        }

        if let Some(cb) = callback.as_mut() {
            let info = IterationInfo {
                iter,
                obj: fk,
                x: &ws.x,
                mu: &ws.mu,
                mu_x: &ws.mu_x,
                g: &gk,
            };
            if cb(&info) {
                if settings.verbose {
                    println!("SQP: aborted by callback...");
                }
                status = SolveStatus::CallbackAbort;
                break;
            }
        }

        match termination::check_termination(iter, pr_inf, du_inf, settings) {
            Some(SolveStatus::Converged) => {
                if settings.verbose {
                    println!("SQP: Convergence achieved after {} iterations.", iter);
                }
                status = SolveStatus::Converged;
                break;
            }
            Some(decided) => {
                if settings.verbose {
                    println!("SQP: Maximum number of iterations reached, quiting...");
                }
                status = decided;
                break;
            }
            None => {}
        }

        iter += 1;
    }

    Ok(SolveResult {
        status,
        f: fk,
        x: ws.x,
        mu: ws.mu,
        mu_x: ws.mu_x,
        g: gk,
        info: SolveInfo {
            iter_count: iter,
            solve_time_ms: start.elapsed().as_millis() as u64,
        },
    })
}

/// gLag = grad f + Jg' mu + mu_x, both gradient terms via reverse passes.
fn lagrangian_gradient(
    objective: &dyn Evaluator,
    constraints: Option<&dyn Evaluator>,
    x: &[f64],
    mu: &[f64],
    mu_x: &[f64],
    out: &mut [f64],
) {
    let grad = objective.reverse(x, &[1.0]);
    out.copy_from_slice(&grad);
    if let Some(g) = constraints {
        if !mu.is_empty() {
            let adjoint = g.reverse(x, mu);
            for i in 0..out.len() {
                out[i] += adjoint[i];
            }
        }
    }
    for i in 0..out.len() {
        out[i] += mu_x[i];
    }
}
