//! Dense interior-point QP subsolver.
//!
//! Reference implementation of the [`summit_core::qp`] contract for
//! subproblems of the form
//!
//! ```text
//! minimize    1/2 p' H p + G' p
//! subject to  LBA <= A p <= UBA
//!             LBX <=  p  <= UBX
//! ```
//!
//! Rows whose two limits coincide are kept as equalities; every finite
//! one-sided limit becomes an inequality with a slack. The Newton systems
//! are solved on the unreduced dense KKT matrix with an LU factorization
//! and a small quasi-definite regularization, with a fraction-to-boundary
//! step rule. Subproblems with no inequalities collapse to a single linear
//! KKT solve, and fully unconstrained ones to a Cholesky solve.
//!
//! Built for the subproblem sizes the SQP driver produces; everything is
//! dense and nothing is cached between solves.

use nalgebra::{DMatrix, DVector};
use summit_core::error::SqpError;
use summit_core::linalg::SparseCsc;
use summit_core::qp::{QpFactory, QpProblem, QpSolution, QpSolver};

/// Two-sided limits closer than this collapse to an equality row.
const EQUALITY_GAP: f64 = 1e-12;

/// Fraction-to-boundary factor for the interior-point step.
const STEP_FRACTION: f64 = 0.995;

/// Centering factor: the target complementarity is this times the gap.
const CENTERING: f64 = 0.1;

/// Factory for [`DenseQpSolver`]. Carries the subsolver options.
#[derive(Debug, Clone)]
pub struct DenseQpFactory {
    /// Interior-point iteration cap.
    pub max_iter: usize,
    /// Residual and complementarity-gap tolerance.
    pub tol: f64,
    /// Static diagonal regularization of the KKT matrix.
    pub static_reg: f64,
}

impl Default for DenseQpFactory {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol: 1e-10,
            static_reg: 1e-11,
        }
    }
}

impl QpFactory for DenseQpFactory {
    type Solver = DenseQpSolver;

    fn create(
        &self,
        h_sparsity: &SparseCsc,
        a_sparsity: &SparseCsc,
    ) -> Result<Self::Solver, SqpError> {
        if h_sparsity.rows() != h_sparsity.cols() {
            return Err(SqpError::DimensionMismatch {
                slot: "H sparsity",
                expected: h_sparsity.rows(),
                actual: h_sparsity.cols(),
            });
        }
        if a_sparsity.cols() != h_sparsity.cols() {
            return Err(SqpError::DimensionMismatch {
                slot: "A sparsity",
                expected: h_sparsity.cols(),
                actual: a_sparsity.cols(),
            });
        }
        Ok(DenseQpSolver {
            n: h_sparsity.cols(),
            m: a_sparsity.rows(),
            max_iter: self.max_iter,
            tol: self.tol,
            static_reg: self.static_reg,
        })
    }
}

/// One inequality row c' p >= d and where it came from, for folding the
/// slack dual back into the contract's multiplier slots.
enum IneqOrigin {
    /// Lower limit of general row i: +a_i' p >= lba_i
    ConLower(usize),
    /// Upper limit of general row i: -a_i' p >= -uba_i
    ConUpper(usize),
    /// Lower variable limit: p_j >= lbx_j
    BndLower(usize),
    /// Upper variable limit: -p_j >= -ubx_j
    BndUpper(usize),
}

struct Ineq {
    origin: IneqOrigin,
    /// Dense row of C.
    c: DVector<f64>,
    /// Right-hand side d.
    d: f64,
}

/// Dense interior-point subsolver instance.
pub struct DenseQpSolver {
    n: usize,
    m: usize,
    max_iter: usize,
    tol: f64,
    static_reg: f64,
}

impl QpSolver for DenseQpSolver {
    fn solve(&mut self, qp: &QpProblem<'_>) -> Result<QpSolution, SqpError> {
        self.check_dims(qp)?;
        let n = self.n;

        let h = to_dense(qp.h);
        let a = to_dense(qp.a);

        // Split the limits into equality rows and one-sided inequalities.
        let mut eq_rows: Vec<usize> = Vec::new();
        let mut ineqs: Vec<Ineq> = Vec::new();
        for i in 0..self.m {
            if qp.uba[i] - qp.lba[i] < EQUALITY_GAP {
                eq_rows.push(i);
                continue;
            }
            if qp.lba[i].is_finite() {
                ineqs.push(Ineq {
                    origin: IneqOrigin::ConLower(i),
                    c: a.row(i).transpose().into_owned(),
                    d: qp.lba[i],
                });
            }
            if qp.uba[i].is_finite() {
                ineqs.push(Ineq {
                    origin: IneqOrigin::ConUpper(i),
                    c: -a.row(i).transpose(),
                    d: -qp.uba[i],
                });
            }
        }
        for j in 0..n {
            if qp.lbx[j].is_finite() {
                let mut c = DVector::zeros(n);
                c[j] = 1.0;
                ineqs.push(Ineq {
                    origin: IneqOrigin::BndLower(j),
                    c,
                    d: qp.lbx[j],
                });
            }
            if qp.ubx[j].is_finite() {
                let mut c = DVector::zeros(n);
                c[j] = -1.0;
                ineqs.push(Ineq {
                    origin: IneqOrigin::BndUpper(j),
                    c,
                    d: -qp.ubx[j],
                });
            }
        }

        let me = eq_rows.len();
        let e = {
            let mut e = DMatrix::zeros(me, n);
            for (k, &i) in eq_rows.iter().enumerate() {
                e.row_mut(k).copy_from(&a.row(i));
            }
            e
        };
        let b_eq = DVector::from_iterator(me, eq_rows.iter().map(|&i| qp.lba[i]));
        let g = DVector::from_column_slice(qp.g);

        let (p, y, z) = if ineqs.is_empty() {
            let (p, y) = self.solve_equality_qp(&h, &g, &e, &b_eq)?;
            (p, y, Vec::new())
        } else {
            self.solve_interior_point(qp, &h, &g, &e, &b_eq, &ineqs)?
        };

        // Fold the duals back into the contract slots so that
        // H p + G + A' lambda_a + lambda_x = 0.
        let mut lambda_a = vec![0.0; self.m];
        let mut lambda_x = vec![0.0; n];
        for (k, &i) in eq_rows.iter().enumerate() {
            lambda_a[i] = y[k];
        }
        for (ineq, &zk) in ineqs.iter().zip(z.iter()) {
            match ineq.origin {
                IneqOrigin::ConLower(i) => lambda_a[i] -= zk,
                IneqOrigin::ConUpper(i) => lambda_a[i] += zk,
                IneqOrigin::BndLower(j) => lambda_x[j] -= zk,
                IneqOrigin::BndUpper(j) => lambda_x[j] += zk,
            }
        }

        Ok(QpSolution {
            primal: p.iter().copied().collect(),
            lambda_a,
            lambda_x,
        })
    }
}

impl DenseQpSolver {
    fn check_dims(&self, qp: &QpProblem<'_>) -> Result<(), SqpError> {
        let checks = [
            ("G", qp.g.len(), self.n),
            ("LBX", qp.lbx.len(), self.n),
            ("UBX", qp.ubx.len(), self.n),
            ("LBA", qp.lba.len(), self.m),
            ("UBA", qp.uba.len(), self.m),
            ("A", qp.a.rows(), self.m),
        ];
        for (slot, actual, expected) in checks {
            if actual != expected {
                return Err(SqpError::DimensionMismatch {
                    slot,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    /// No inequalities: one linear KKT solve, exact up to factorization.
    fn solve_equality_qp(
        &self,
        h: &DMatrix<f64>,
        g: &DVector<f64>,
        e: &DMatrix<f64>,
        b_eq: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>), SqpError> {
        let n = self.n;
        let me = e.nrows();

        if me == 0 {
            if let Some(chol) = h.clone().cholesky() {
                return Ok((chol.solve(&(-g)), DVector::zeros(0)));
            }
            // Not positive definite; fall through to the regularized KKT
        }

        let dim = n + me;
        let mut kkt = DMatrix::zeros(dim, dim);
        kkt.view_mut((0, 0), (n, n)).copy_from(h);
        kkt.view_mut((0, n), (n, me)).copy_from(&e.transpose());
        kkt.view_mut((n, 0), (me, n)).copy_from(e);
        let mut rhs = DVector::zeros(dim);
        rhs.rows_mut(0, n).copy_from(&(-g));
        rhs.rows_mut(n, me).copy_from(b_eq);

        let mut solution = kkt.clone().lu().solve(&rhs);
        if solution.is_none() {
            // Singular without regularization; retry quasi-definite
            let reg = self.static_reg.max(1e-10);
            for i in 0..n {
                kkt[(i, i)] += reg;
            }
            for k in 0..me {
                kkt[(n + k, n + k)] -= reg;
            }
            solution = kkt.lu().solve(&rhs);
        }
        let solution =
            solution.ok_or_else(|| SqpError::QpFailure("singular KKT system".into()))?;

        Ok((
            solution.rows(0, n).into_owned(),
            solution.rows(n, me).into_owned(),
        ))
    }

    /// Path-following interior-point iteration on p, y, z, s.
    ///
    /// Optimality system: H p + G + E' y - C' z = 0, E p = b,
    /// C p - s = d, s >= 0, z >= 0, s_k z_k = 0.
    fn solve_interior_point(
        &self,
        qp: &QpProblem<'_>,
        h: &DMatrix<f64>,
        g: &DVector<f64>,
        e: &DMatrix<f64>,
        b_eq: &DVector<f64>,
        ineqs: &[Ineq],
    ) -> Result<(DVector<f64>, DVector<f64>, Vec<f64>), SqpError> {
        let n = self.n;
        let me = e.nrows();
        let mi = ineqs.len();
        let dim = n + me + mi;

        let mut p = match qp.x_init {
            Some(warm) => DVector::from_column_slice(warm),
            None => DVector::zeros(n),
        };
        let mut y = DVector::zeros(me);
        let mut z = vec![1.0_f64; mi];
        let mut s: Vec<f64> = ineqs
            .iter()
            .map(|ineq| (ineq.c.dot(&p) - ineq.d).max(1.0))
            .collect();

        let mut kkt = DMatrix::zeros(dim, dim);
        let mut rhs = DVector::zeros(dim);

        for _ in 0..self.max_iter {
            // Residuals of the optimality system
            let mut r_d = h * &p + g + e.transpose() * &y;
            for (ineq, &zk) in ineqs.iter().zip(z.iter()) {
                r_d.axpy(-zk, &ineq.c, 1.0);
            }
            let r_e = e * &p - b_eq;
            let r_i: Vec<f64> = ineqs
                .iter()
                .zip(s.iter())
                .map(|(ineq, &sk)| ineq.c.dot(&p) - sk - ineq.d)
                .collect();
            let gap = s.iter().zip(z.iter()).map(|(sk, zk)| sk * zk).sum::<f64>() / mi as f64;

            let worst = r_d
                .iter()
                .chain(r_e.iter())
                .chain(r_i.iter())
                .fold(0.0_f64, |acc, r| acc.max(r.abs()));
            if worst < self.tol && gap < self.tol {
                return Ok((p, y, z));
            }

            let mu = CENTERING * gap;

            // Newton system on (dp, dy, dz), with ds eliminated
            kkt.fill(0.0);
            kkt.view_mut((0, 0), (n, n)).copy_from(h);
            for i in 0..n {
                kkt[(i, i)] += self.static_reg;
            }
            kkt.view_mut((0, n), (n, me)).copy_from(&e.transpose());
            kkt.view_mut((n, 0), (me, n)).copy_from(e);
            for k in 0..me {
                kkt[(n + k, n + k)] = -self.static_reg;
            }
            for (k, ineq) in ineqs.iter().enumerate() {
                let row = n + me + k;
                for i in 0..n {
                    kkt[(i, row)] = -ineq.c[i];
                    kkt[(row, i)] = ineq.c[i];
                }
                kkt[(row, row)] = s[k] / z[k];
            }

            rhs.rows_mut(0, n).copy_from(&(-&r_d));
            rhs.rows_mut(n, me).copy_from(&(-&r_e));
            for k in 0..mi {
                rhs[n + me + k] = -r_i[k] + (mu - s[k] * z[k]) / z[k];
            }

            let delta = kkt
                .clone()
                .lu()
                .solve(&rhs)
                .ok_or_else(|| SqpError::QpFailure("singular interior-point system".into()))?;

            let dp = delta.rows(0, n);
            let dy = delta.rows(n, me);
            let dz = delta.rows(n + me, mi);
            let ds: Vec<f64> = (0..mi)
                .map(|k| (mu - s[k] * z[k]) / z[k] - (s[k] / z[k]) * dz[k])
                .collect();

            // Fraction-to-boundary step
            let mut alpha = 1.0_f64;
            for k in 0..mi {
                if ds[k] < 0.0 {
                    alpha = alpha.min(-STEP_FRACTION * s[k] / ds[k]);
                }
                if dz[k] < 0.0 {
                    alpha = alpha.min(-STEP_FRACTION * z[k] / dz[k]);
                }
            }

            p.axpy(alpha, &dp.into_owned(), 1.0);
            y.axpy(alpha, &dy.into_owned(), 1.0);
            for k in 0..mi {
                z[k] += alpha * dz[k];
                s[k] += alpha * ds[k];
            }
        }

        Err(SqpError::QpFailure(
            "interior-point iteration limit reached".into(),
        ))
    }
}

/// Scatter a sparse matrix into a fresh dense one.
fn to_dense(src: &SparseCsc) -> DMatrix<f64> {
    let mut dst = DMatrix::zeros(src.rows(), src.cols());
    for (val, (row, col)) in src.iter() {
        dst[(row, col)] = *val;
    }
    dst
}
