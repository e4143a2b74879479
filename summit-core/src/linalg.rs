//! Dense and sparse linear-algebra helpers.
//!
//! Small utilities shared by the SQP driver and the Hessian model. Sparse
//! matrices are CSC via `sprs`; dense matrices are `nalgebra::DMatrix`.

use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};

/// Sparse matrix in CSC format.
pub type SparseCsc = CsMat<f64>;

/// Dot product of two vectors.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

/// 1-norm of a vector.
#[inline]
pub fn norm_1(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

/// Infinity norm of a vector.
#[inline]
pub fn inf_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).fold(0.0_f64, f64::max)
}

/// Build a sparse CSC matrix from triplets (row, col, value).
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// Zero matrix (no stored entries) in CSC format.
pub fn zero_pattern(nrows: usize, ncols: usize) -> SparseCsc {
    TriMat::new((nrows, ncols)).to_csc()
}

/// Fully dense sparsity pattern (every entry stored, value 1).
pub fn dense_pattern(nrows: usize, ncols: usize) -> SparseCsc {
    let mut tri = TriMat::new((nrows, ncols));
    for i in 0..nrows {
        for j in 0..ncols {
            tri.add_triplet(i, j, 1.0);
        }
    }
    tri.to_csc()
}

/// Union of two sparsity patterns of the same shape.
///
/// Stored values are meaningless (structure only); duplicate entries
/// accumulate, which keeps every union position nonzero.
pub fn pattern_union(a: &SparseCsc, b: &SparseCsc) -> SparseCsc {
    assert_eq!(a.rows(), b.rows());
    assert_eq!(a.cols(), b.cols());
    let mut tri = TriMat::new((a.rows(), a.cols()));
    for (_, (i, j)) in a.iter() {
        tri.add_triplet(i, j, 1.0);
    }
    for (_, (i, j)) in b.iter() {
        tri.add_triplet(i, j, 1.0);
    }
    tri.to_csc()
}

/// Identity sparsity pattern.
pub fn identity_pattern(n: usize) -> SparseCsc {
    from_triplets(n, n, (0..n).map(|i| (i, i, 1.0)))
}

/// Sparse matrix-vector product: y = alpha * A * x + beta * y.
pub fn spmv(a: &SparseCsc, x: &[f64], y: &mut [f64], alpha: f64, beta: f64) {
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), y.len());

    if beta == 0.0 {
        y.fill(0.0);
    } else if beta != 1.0 {
        for yi in y.iter_mut() {
            *yi *= beta;
        }
    }

    if alpha != 0.0 {
        for (val, (row, col)) in a.iter() {
            y[row] += alpha * (*val) * x[col];
        }
    }
}

/// Scatter a sparse matrix into a dense one. The dense matrix is zeroed first.
pub fn sparse_to_dense(src: &SparseCsc, dst: &mut DMatrix<f64>) {
    assert_eq!(src.rows(), dst.nrows());
    assert_eq!(src.cols(), dst.ncols());
    dst.fill(0.0);
    for (val, (row, col)) in src.iter() {
        dst[(row, col)] = *val;
    }
}

/// Read a dense matrix out onto a fixed sparsity pattern.
///
/// Entries of `dense` outside the pattern are dropped; the pattern is the
/// one the QP subsolver was constructed with, so it must cover every
/// position the caller ever fills.
pub fn dense_on_pattern(dense: &DMatrix<f64>, pattern: &SparseCsc) -> SparseCsc {
    assert_eq!(dense.nrows(), pattern.rows());
    assert_eq!(dense.ncols(), pattern.cols());
    let mut tri = TriMat::new((pattern.rows(), pattern.cols()));
    for (_, (i, j)) in pattern.iter() {
        tri.add_triplet(i, j, dense[(i, j)]);
    }
    tri.to_csc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norms() {
        let v = [1.0, -2.0, 3.0];
        assert_eq!(norm_1(&v), 6.0);
        assert_eq!(inf_norm(&v), 3.0);
        assert_eq!(dot(&v, &v), 14.0);
    }

    #[test]
    fn test_spmv() {
        // [[1, 2], [0, 3]] * [1, 1] = [3, 3]
        let a = from_triplets(2, 2, vec![(0, 0, 1.0), (0, 1, 2.0), (1, 1, 3.0)]);
        let mut y = vec![1.0, 1.0];
        spmv(&a, &[1.0, 1.0], &mut y, 1.0, 0.0);
        assert_eq!(y, vec![3.0, 3.0]);
    }

    #[test]
    fn test_pattern_union_keeps_both() {
        let a = from_triplets(2, 2, vec![(0, 1, 5.0)]);
        let b = identity_pattern(2);
        let u = pattern_union(&a, &b);
        assert_eq!(u.nnz(), 3);
    }

    #[test]
    fn test_dense_on_pattern_drops_outside() {
        let mut d = DMatrix::zeros(2, 2);
        d[(0, 0)] = 1.0;
        d[(0, 1)] = 7.0;
        let p = identity_pattern(2);
        let s = dense_on_pattern(&d, &p);
        assert_eq!(s.nnz(), 2);
        assert_eq!(s.get(0, 0), Some(&1.0));
        assert_eq!(s.get(0, 1), None);
    }
}
