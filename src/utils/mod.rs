/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared linear algebra and numeric helpers for the ecological inference engine.
//
// Created on: 24 Jan 2026     Author: Tobias Kragholm
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Small dense linear algebra on faer matrices: LU solves, inverses,
//! Cholesky factors and quadratic forms for the low-dimensional covariance
//! matrices used by the samplers.

use faer::Mat;
use faer::prelude::Solve;

use crate::models::eco::types::EcoError;

/// # Errors
///
/// Returns `EcoError::SolveFailed` if the solve produces non-finite values.
pub fn solve_linear_system(a: &Mat<f64>, b: &Mat<f64>) -> Result<Mat<f64>, EcoError> {
    let rhs = b.clone();
    let lu = a.full_piv_lu();
    let solution = lu.solve(rhs);
    if !matrix_is_finite(&solution) {
        return Err(EcoError::SolveFailed);
    }
    Ok(solution)
}

/// Inverse of a square matrix by column-wise LU solves.
///
/// # Errors
///
/// Returns `EcoError::SolveFailed` if the matrix is singular.
pub fn matrix_inverse(matrix: &Mat<f64>) -> Result<Mat<f64>, EcoError> {
    let dim = matrix.ncols();
    if matrix.nrows() != dim {
        return Err(EcoError::SolveFailed);
    }
    let identity = identity_matrix(dim);
    let inverse = solve_linear_system(matrix, &identity)?;
    Ok(symmetrize(&inverse))
}

/// Lower Cholesky factor, or `None` if the matrix is not positive definite.
#[must_use]
pub fn cholesky_lower(matrix: &Mat<f64>) -> Option<Mat<f64>> {
    let dim = matrix.ncols();
    if matrix.nrows() != dim {
        return None;
    }
    let mut lower = Mat::<f64>::zeros(dim, dim);
    for row in 0..dim {
        for col in 0..=row {
            let mut sum = matrix[(row, col)];
            for k in 0..col {
                sum -= lower[(row, k)] * lower[(col, k)];
            }
            if row == col {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                lower[(row, col)] = sum.sqrt();
            } else {
                let denom = lower[(col, col)];
                if denom <= 0.0 {
                    return None;
                }
                lower[(row, col)] = sum / denom;
            }
        }
    }
    Some(lower)
}

/// Log-determinant of a symmetric positive-definite matrix.
#[must_use]
pub fn log_determinant_spd(matrix: &Mat<f64>) -> Option<f64> {
    let lower = cholesky_lower(matrix)?;
    Some(2.0 * (0..lower.ncols()).map(|idx| lower[(idx, idx)].ln()).sum::<f64>())
}

/// `(x - mu)' A (x - mu)` for a square `A`.
#[must_use]
pub fn centered_quadratic_form(x: &[f64], mu: &[f64], matrix: &Mat<f64>) -> f64 {
    let dim = mu.len();
    let mut quadratic = 0.0;
    for row in 0..dim {
        let centered_row = x[row] - mu[row];
        for col in 0..dim {
            quadratic += centered_row * matrix[(row, col)] * (x[col] - mu[col]);
        }
    }
    quadratic
}

#[must_use]
pub fn symmetrize(matrix: &Mat<f64>) -> Mat<f64> {
    Mat::from_fn(matrix.nrows(), matrix.ncols(), |row, col| {
        0.5 * (matrix[(row, col)] + matrix[(col, row)])
    })
}

#[must_use]
pub fn identity_matrix(dim: usize) -> Mat<f64> {
    Mat::from_fn(dim, dim, |row, col| if row == col { 1.0 } else { 0.0 })
}

#[must_use]
pub fn matrix_is_finite(matrix: &Mat<f64>) -> bool {
    for i in 0..matrix.nrows() {
        for j in 0..matrix.ncols() {
            if !matrix[(i, j)].is_finite() {
                return false;
            }
        }
    }
    true
}

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd() -> Mat<f64> {
        Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { 0.5 })
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        let matrix = spd();
        let inverse = matrix_inverse(&matrix).expect("spd matrix is invertible");
        let product = &matrix * &inverse;
        assert_relative_eq!(product[(0, 0)], 1.0, epsilon = 1.0e-12);
        assert_relative_eq!(product[(0, 1)], 0.0, epsilon = 1.0e-12);
        assert_relative_eq!(product[(1, 1)], 1.0, epsilon = 1.0e-12);
    }

    #[test]
    fn cholesky_reconstructs_matrix() {
        let matrix = spd();
        let lower = cholesky_lower(&matrix).expect("spd matrix has a factor");
        let rebuilt = &lower * lower.transpose();
        assert_relative_eq!(rebuilt[(1, 0)], 0.5, epsilon = 1.0e-12);
        assert_relative_eq!(rebuilt[(1, 1)], 2.0, epsilon = 1.0e-12);
    }

    #[test]
    fn cholesky_rejects_indefinite_matrix() {
        let matrix = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 3.0 });
        assert!(cholesky_lower(&matrix).is_none());
    }

    #[test]
    fn log_determinant_matches_closed_form() {
        let log_det = log_determinant_spd(&spd()).expect("spd");
        assert_relative_eq!(log_det, (4.0_f64 - 0.25).ln(), epsilon = 1.0e-12);
    }

    #[test]
    fn solve_linear_system_rejects_non_finite_solution() {
        let a = identity_matrix(2);
        let b = Mat::from_fn(2, 1, |i, _| if i == 0 { f64::NAN } else { 1.0 });
        let err = solve_linear_system(&a, &b).expect_err("non-finite rhs should fail");
        assert!(matches!(err, EcoError::SolveFailed));
    }

    #[test]
    fn quadratic_form_is_centered() {
        let value = centered_quadratic_form(&[1.0, 2.0], &[1.0, 1.0], &identity_matrix(2));
        assert_relative_eq!(value, 1.0);
    }
}
