//! Distances between SPD matrices.
//!
//! # Example
//!
//! ```
//! use nalgebra::DMatrix;
//! use spd_geometry::{distance, Metric};
//!
//! let a = DMatrix::<f64>::identity(2, 2);
//! let b = a.clone() * std::f64::consts::E;
//! let d = distance(&a, &b, Metric::Riemann)?;
//! assert!((d - 2.0_f64.sqrt()).abs() < 1e-10);
//! # Ok::<(), spd_geometry::GeometryError>(())
//! ```

use crate::basics::{ensure_same_size, ensure_square};
use crate::error::{GeometryError, Result};
use crate::math::linalg;
use crate::metric::Metric;
use nalgebra::DMatrix;
use tracing::warn;

/// Distance returned by the degenerate [`Metric::Identity`].
pub const IDENTITY_DISTANCE: f64 = 1.0;

/// Distance between two SPD matrices under `metric`.
///
/// [`Metric::Ale`] resolves to [`Metric::Riemann`], see
/// [`Metric::distance_metric`].
///
/// # Errors
///
/// Returns an error if the matrices are empty, not square, of different
/// sizes, or not positive definite where the metric requires it.
pub fn distance(a: &DMatrix<f64>, b: &DMatrix<f64>, metric: Metric) -> Result<f64> {
    ensure_square(a)?;
    ensure_same_size(a, b)?;
    let resolved = metric.distance_metric();
    if resolved != metric {
        warn!(%metric, %resolved, "no distance for metric, using fallback");
    }
    match resolved {
        Metric::Euclidean => Ok(distance_euclidean(a, b)),
        Metric::LogEuclidean => distance_log_euclidean(a, b),
        Metric::Riemann | Metric::Ale => distance_riemann(a, b),
        Metric::LogDet => distance_log_det(a, b),
        Metric::Kullback => distance_kullback(a, b),
        Metric::Wasserstein => distance_wasserstein(a, b),
        Metric::Harmonic => distance_harmonic(a, b),
        Metric::Identity => Ok(IDENTITY_DISTANCE),
    }
}

/// Frobenius norm of the difference.
#[must_use]
pub fn distance_euclidean(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (a - b).norm()
}

/// Frobenius distance between the matrix logarithms.
///
/// # Errors
///
/// Returns an error if either matrix is not positive definite.
pub fn distance_log_euclidean(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<f64> {
    Ok(distance_euclidean(&linalg::logm(a)?, &linalg::logm(b)?))
}

/// Affine-invariant distance: `sqrt(Σ log² λ_i)` over the generalized
/// eigenvalues of `(a, b)`.
///
/// # Errors
///
/// Returns an error if either matrix is not positive definite.
pub fn distance_riemann(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<f64> {
    let isa = linalg::inv_sqrtm(a)?;
    let values = linalg::eigenvalues(&(&isa * b * &isa))?;
    if values.iter().any(|&v| v <= 0.0) {
        return Err(GeometryError::not_positive_definite(
            "generalized eigenvalues",
        ));
    }
    Ok(values.iter().map(|v| v.ln().powi(2)).sum::<f64>().sqrt())
}

/// Log-determinant distance
/// `sqrt(log det((a+b)/2) − ½ log(det a · det b))`.
///
/// # Errors
///
/// Returns an error if either matrix is not positive definite.
pub fn distance_log_det(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<f64> {
    let mid = (a + b) * 0.5;
    let value = linalg::log_determinant(&mid)?
        - 0.5 * (linalg::log_determinant(a)? + linalg::log_determinant(b)?);
    // Negative only by rounding.
    Ok(value.max(0.0).sqrt())
}

/// Symmetrized Kullback-Leibler divergence
/// `½ (tr(b⁻¹a) + tr(a⁻¹b)) − N`.
///
/// # Errors
///
/// Returns an error if either matrix is not positive definite.
pub fn distance_kullback(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<f64> {
    let n = a.nrows() as f64;
    let ia = linalg::inverse(a)?;
    let ib = linalg::inverse(b)?;
    let value = 0.5 * ((&ib * a).trace() + (&ia * b).trace()) - n;
    Ok(value.max(0.0))
}

/// Bures-Wasserstein distance
/// `sqrt(tr a + tr b − 2 tr((a^½ b a^½)^½))`.
///
/// # Errors
///
/// Returns an error if the square roots cannot be computed.
pub fn distance_wasserstein(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<f64> {
    let sa = linalg::sqrtm(a)?;
    let cross = linalg::sqrtm(&(&sa * b * &sa))?;
    let value = a.trace() + b.trace() - 2.0 * cross.trace();
    Ok(value.max(0.0).sqrt())
}

/// Frobenius distance between the inverses.
///
/// # Errors
///
/// Returns an error if either matrix is not positive definite.
pub fn distance_harmonic(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<f64> {
    Ok(distance_euclidean(&linalg::inverse(a)?, &linalg::inverse(b)?))
}
