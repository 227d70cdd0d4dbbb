//! Spectral functions of symmetric matrices.
//!
//! Every function here works through [`SymmetricEigen`]: the input is
//! symmetrized, decomposed as `U Λ Uᵀ`, and rebuilt as `U f(Λ) Uᵀ`.
//! Functions that take a logarithm, an inverse or a negative power reject
//! matrices with eigenvalues that are not clearly positive.

use crate::error::{GeometryError, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Relative eigenvalue floor below which a matrix is treated as singular.
pub const EIGEN_FLOOR: f64 = f64::EPSILON;

/// Return `(m + mᵀ) / 2`.
#[must_use]
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

fn check_square(m: &DMatrix<f64>) -> Result<()> {
    if m.is_empty() {
        return Err(GeometryError::empty("matrix"));
    }
    if !m.is_square() {
        return Err(GeometryError::not_square(m.nrows(), m.ncols()));
    }
    Ok(())
}

fn decompose(m: &DMatrix<f64>) -> Result<SymmetricEigen<f64, nalgebra::Dyn>> {
    check_square(m)?;
    if m.iter().any(|v| !v.is_finite()) {
        return Err(GeometryError::numerical_instability(
            "matrix contains NaN or Inf",
        ));
    }
    Ok(SymmetricEigen::new(symmetrize(m)))
}

fn rebuild(eigen: &SymmetricEigen<f64, nalgebra::Dyn>, values: &DVector<f64>) -> DMatrix<f64> {
    let u = &eigen.eigenvectors;
    let scaled = u * DMatrix::from_diagonal(values);
    symmetrize(&(scaled * u.transpose()))
}

/// Ensure every eigenvalue is above the relative floor.
fn check_positive(values: &DVector<f64>, context: &str) -> Result<()> {
    let max = values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let floor = EIGEN_FLOOR * max;
    if max == 0.0 || values.iter().any(|&v| v <= floor) {
        return Err(GeometryError::not_positive_definite(context));
    }
    Ok(())
}

/// Apply a scalar function to the spectrum of a symmetric matrix.
///
/// # Errors
///
/// Returns an error if the matrix is empty, not square or not finite.
pub fn spectral_map(m: &DMatrix<f64>, f: impl Fn(f64) -> f64) -> Result<DMatrix<f64>> {
    let eigen = decompose(m)?;
    let values = eigen.eigenvalues.map(f);
    Ok(rebuild(&eigen, &values))
}

/// Matrix square root. Slightly negative eigenvalues are clamped to zero.
///
/// # Errors
///
/// Returns an error if the matrix is empty, not square or not finite.
pub fn sqrtm(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    spectral_map(m, |v| v.max(0.0).sqrt())
}

/// Inverse matrix square root `m^(-1/2)`.
///
/// # Errors
///
/// Returns an error if the matrix is not positive definite.
pub fn inv_sqrtm(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let eigen = decompose(m)?;
    check_positive(&eigen.eigenvalues, "inverse square root")?;
    Ok(rebuild(&eigen, &eigen.eigenvalues.map(|v| 1.0 / v.sqrt())))
}

/// Matrix logarithm.
///
/// # Errors
///
/// Returns an error if the matrix is not positive definite.
pub fn logm(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let eigen = decompose(m)?;
    check_positive(&eigen.eigenvalues, "logarithm")?;
    Ok(rebuild(&eigen, &eigen.eigenvalues.map(f64::ln)))
}

/// Matrix exponential of a symmetric matrix.
///
/// # Errors
///
/// Returns an error if the matrix is invalid or the result overflows.
pub fn expm(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let out = spectral_map(m, f64::exp)?;
    if out.iter().any(|v| !v.is_finite()) {
        return Err(GeometryError::numerical_instability("matrix exponential overflow"));
    }
    Ok(out)
}

/// Matrix power `m^p`. Negative powers require a positive definite matrix.
///
/// # Errors
///
/// Returns an error if the matrix is invalid, or `p < 0` and the matrix is
/// not positive definite.
pub fn powm(m: &DMatrix<f64>, p: f64) -> Result<DMatrix<f64>> {
    let eigen = decompose(m)?;
    if p < 0.0 {
        check_positive(&eigen.eigenvalues, "negative power")?;
    }
    Ok(rebuild(&eigen, &eigen.eigenvalues.map(|v| v.max(0.0).powf(p))))
}

/// Inverse of a symmetric positive definite matrix.
///
/// # Errors
///
/// Returns an error if the matrix is not positive definite.
pub fn inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let eigen = decompose(m)?;
    check_positive(&eigen.eigenvalues, "inverse")?;
    Ok(rebuild(&eigen, &eigen.eigenvalues.map(f64::recip)))
}

/// Natural logarithm of the determinant of a positive definite matrix.
///
/// # Errors
///
/// Returns an error if the matrix is not positive definite.
pub fn log_determinant(m: &DMatrix<f64>) -> Result<f64> {
    let eigen = decompose(m)?;
    check_positive(&eigen.eigenvalues, "log determinant")?;
    Ok(eigen.eigenvalues.iter().map(|v| v.ln()).sum())
}

/// Eigenvalues of a symmetric matrix.
///
/// # Errors
///
/// Returns an error if the matrix is empty, not square or not finite.
pub fn eigenvalues(m: &DMatrix<f64>) -> Result<DVector<f64>> {
    Ok(decompose(m)?.eigenvalues)
}

/// Eigen-decomposition with eigenvalues sorted ascending.
///
/// Returns the eigenvectors as columns, reordered to match the sorted
/// eigenvalues.
///
/// # Errors
///
/// Returns an error if the matrix is empty, not square or not finite.
pub fn sorted_eigen(m: &DMatrix<f64>) -> Result<(DMatrix<f64>, Vec<f64>)> {
    let eigen = decompose(m)?;
    let n = eigen.eigenvalues.len();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let values = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let vectors = DMatrix::from_fn(n, n, |r, c| eigen.eigenvectors[(r, order[c])]);
    Ok((vectors, values))
}

/// Moore-Penrose pseudo-inverse.
///
/// # Errors
///
/// Returns an error if the SVD-based inversion fails.
pub fn pinv(m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let eps = f64::EPSILON * m.nrows().max(m.ncols()) as f64 * m.norm().max(1.0);
    m.clone()
        .pseudo_inverse(eps)
        .map_err(|e| GeometryError::numerical_instability(format!("pseudo-inverse: {e}")))
}
