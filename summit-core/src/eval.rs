//! Evaluator contracts for the NLP functions.
//!
//! The driver consumes the objective f, the constraint function g and the
//! Lagrangian Hessian as black-box callables behind these traits. Every
//! method returns fresh values; the driver owns all working buffers and
//! never hands out seed or result slots.

use crate::linalg::{self, SparseCsc};

/// A smooth vector function y = F(x) with forward- and reverse-mode
/// derivative passes.
///
/// The driver obtains the objective gradient with a reverse pass seeded by
/// 1.0, the Armijo directional derivative with a forward pass seeded by the
/// search direction, and the constraint adjoint Jgᵀμ with a reverse pass
/// seeded by the multipliers.
pub trait Evaluator {
    /// Input dimension n.
    fn dim_in(&self) -> usize;

    /// Output dimension (1 for the objective, m for the constraints).
    fn dim_out(&self) -> usize;

    /// F(x).
    fn value(&self, x: &[f64]) -> Vec<f64>;

    /// Forward-mode pass: J(x)·seed, with `seed.len() == dim_in()`.
    fn forward(&self, x: &[f64], seed: &[f64]) -> Vec<f64>;

    /// Reverse-mode pass: J(x)ᵀ·seed, with `seed.len() == dim_out()`.
    fn reverse(&self, x: &[f64], seed: &[f64]) -> Vec<f64>;

    /// Sparse Jacobian of F at x.
    ///
    /// The default assembles a dense Jacobian column by column from forward
    /// passes with unit seeds; evaluators with sparse structure should
    /// override both this and [`Evaluator::jacobian_sparsity`].
    fn jacobian(&self, x: &[f64]) -> SparseCsc {
        let n = self.dim_in();
        let mut triplets = Vec::new();
        let mut seed = vec![0.0; n];
        for j in 0..n {
            seed[j] = 1.0;
            let col = self.forward(x, &seed);
            seed[j] = 0.0;
            for (i, v) in col.iter().enumerate() {
                triplets.push((i, j, *v));
            }
        }
        linalg::from_triplets(self.dim_out(), n, triplets)
    }

    /// Sparsity pattern of the Jacobian. Defaults to fully dense.
    fn jacobian_sparsity(&self) -> SparseCsc {
        linalg::dense_pattern(self.dim_out(), self.dim_in())
    }

    /// Latch the static NLP parameter.
    ///
    /// Called once at the start of a solve for parametric problems and
    /// never mid-iteration.
    fn set_param(&mut self, _p: &[f64]) {}
}

/// The Lagrangian Hessian H(x, μ, σ_f) = σ_f·∇²f(x) + Σⱼ μⱼ·∇²gⱼ(x).
///
/// The driver always passes σ_f = 1.
pub trait LagrangianHessian {
    /// H(x, μ, σ_f) as a sparse symmetric matrix (both triangles stored).
    fn hessian(&self, x: &[f64], mu: &[f64], sigma_f: f64) -> SparseCsc;

    /// Sparsity pattern of the Hessian.
    fn sparsity(&self) -> SparseCsc;

    /// Latch the static NLP parameter. See [`Evaluator::set_param`].
    fn set_param(&mut self, _p: &[f64]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    /// g(x) = (x0 * x1, x0 + x1)
    struct Pair;

    impl Evaluator for Pair {
        fn dim_in(&self) -> usize {
            2
        }

        fn dim_out(&self) -> usize {
            2
        }

        fn value(&self, x: &[f64]) -> Vec<f64> {
            vec![x[0] * x[1], x[0] + x[1]]
        }

        fn forward(&self, x: &[f64], seed: &[f64]) -> Vec<f64> {
            vec![x[1] * seed[0] + x[0] * seed[1], seed[0] + seed[1]]
        }

        fn reverse(&self, x: &[f64], seed: &[f64]) -> Vec<f64> {
            vec![x[1] * seed[0] + seed[1], x[0] * seed[0] + seed[1]]
        }
    }

    #[test]
    fn test_default_jacobian_matches_forward() {
        let g = Pair;
        let x = [3.0, 4.0];
        let jac = g.jacobian(&x);
        assert_eq!(jac.get(0, 0), Some(&4.0));
        assert_eq!(jac.get(0, 1), Some(&3.0));
        assert_eq!(jac.get(1, 0), Some(&1.0));
        assert_eq!(jac.get(1, 1), Some(&1.0));
    }

    #[test]
    fn test_forward_reverse_consistency() {
        // seed_outᵀ · (J seed_in) == (Jᵀ seed_out) · seed_in
        let g = Pair;
        let x = [1.5, -2.0];
        let fwd = g.forward(&x, &[0.3, 0.7]);
        let rev = g.reverse(&x, &[0.9, -0.1]);
        let lhs = 0.9 * fwd[0] - 0.1 * fwd[1];
        let rhs = rev[0] * 0.3 + rev[1] * 0.7;
        assert!((lhs - rhs).abs() < 1e-14);
    }
}
