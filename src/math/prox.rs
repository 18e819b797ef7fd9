//! Singular-value machinery behind the trace-norm penalty.
//!
//! The SVD is delegated to `nalgebra`; matrices are copied across from
//! `ndarray` column by column, matching `DMatrix`'s column-major storage.
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::{CogspacesError, Result};

/// Thin singular value decomposition `a = u * diag(s) * vt`.
#[derive(Debug, Clone)]
pub struct Svd {
    /// (rows, k)
    pub u: Array2<f32>,
    /// (k,), non-negative
    pub s: Array1<f32>,
    /// (k, cols)
    pub vt: Array2<f32>,
}

fn to_dmatrix(a: ArrayView2<f32>) -> DMatrix<f32> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_dmatrix(m: &DMatrix<f32>) -> Array2<f32> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// Full-spectrum SVD of `a`, with `k = min(rows, cols)`.
pub fn svd(a: ArrayView2<f32>) -> Result<Svd> {
    let (rows, cols) = a.dim();
    let decomposition = to_dmatrix(a)
        .try_svd(true, true, f32::EPSILON, 0)
        .ok_or(CogspacesError::SvdNoConvergence { rows, cols })?;
    let (u, vt) = match (decomposition.u.as_ref(), decomposition.v_t.as_ref()) {
        (Some(u), Some(vt)) => (from_dmatrix(u), from_dmatrix(vt)),
        _ => return Err(CogspacesError::SvdNoConvergence { rows, cols }),
    };
    let s = decomposition.singular_values.iter().copied().collect();
    Ok(Svd { u, s, vt })
}

/// Singular value soft-thresholding, the proximal operator of
/// `threshold * ||.||_trace`.
///
/// Every singular value is shrunk to `max(s - threshold, 0)` and the matrix
/// rebuilt from the shrunk spectrum.
///
/// # Returns
///
/// The thresholded matrix and the number of singular values that survived.
pub fn proximal_operator(coef: ArrayView2<f32>, threshold: f32) -> Result<(Array2<f32>, usize)> {
    let Svd { mut u, s, vt } = svd(coef)?;
    let shrunk = s.mapv(|v| (v - threshold).max(0.0));
    let rank = shrunk.iter().filter(|&&v| v != 0.0).count();
    for (mut column, &value) in u.axis_iter_mut(Axis(1)).zip(shrunk.iter()) {
        column *= value;
    }
    Ok((u.dot(&vt), rank))
}

/// Sum of singular values.
pub fn trace_norm(coef: ArrayView2<f32>) -> Result<f32> {
    Ok(svd(coef)?.s.sum())
}

/// Number of singular values above `max(s) * max(rows, cols) * eps`.
pub fn matrix_rank(coef: ArrayView2<f32>) -> Result<usize> {
    let (rows, cols) = coef.dim();
    let s = svd(coef)?.s;
    let largest = s.fold(0.0f32, |acc, &v| acc.max(v));
    let tol = largest * rows.max(cols) as f32 * f32::EPSILON;
    Ok(s.iter().filter(|&&v| v > tol).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn rank_two() -> Array2<f32> {
        // diag(3, 1) embedded in a 3x4 matrix
        let mut a = Array2::zeros((3, 4));
        a[[0, 0]] = 3.0;
        a[[1, 2]] = 1.0;
        a
    }

    #[test]
    fn svd_reconstructs() {
        let a = array![[1.0f32, 2.0, 0.5], [0.0, -1.0, 4.0]];
        let Svd { u, s, vt } = svd(a.view()).unwrap();
        assert_eq!(u.shape(), &[2, 2]);
        assert_eq!(vt.shape(), &[2, 3]);
        let mut us = u.clone();
        for (mut col, &v) in us.axis_iter_mut(Axis(1)).zip(s.iter()) {
            col *= v;
        }
        let back = us.dot(&vt);
        for (x, y) in back.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-4);
        }
    }

    #[test]
    fn zero_threshold_is_identity() {
        let a = array![[1.0f32, 2.0], [3.0, 4.0], [-1.0, 0.5]];
        let (out, rank) = proximal_operator(a.view(), 0.0).unwrap();
        assert_eq!(rank, 2);
        for (x, y) in out.iter().zip(a.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-4);
        }
    }

    #[test]
    fn soft_thresholds_spectrum() {
        let a = rank_two();
        let (out, rank) = proximal_operator(a.view(), 1.5).unwrap();
        assert_eq!(rank, 1);
        assert_abs_diff_eq!(out[[0, 0]], 1.5, epsilon = 1e-5);
        assert_abs_diff_eq!(out[[1, 2]], 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(trace_norm(out.view()).unwrap(), 1.5, epsilon = 1e-5);
    }

    #[test]
    fn large_threshold_gives_zero() {
        let a = rank_two();
        let (out, rank) = proximal_operator(a.view(), 10.0).unwrap();
        assert_eq!(rank, 0);
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn rank_and_trace_norm() {
        let a = rank_two();
        assert_eq!(matrix_rank(a.view()).unwrap(), 2);
        assert_abs_diff_eq!(trace_norm(a.view()).unwrap(), 4.0, epsilon = 1e-5);
        let ones = Array2::<f32>::ones((5, 3));
        assert_eq!(matrix_rank(ones.view()).unwrap(), 1);
        assert_eq!(matrix_rank(Array2::<f32>::zeros((2, 2)).view()).unwrap(), 0);
    }
}
