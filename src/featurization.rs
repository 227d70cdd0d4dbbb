//! Flatten SPD matrices into feature vectors and back.
//!
//! [`squeeze_upper_triangle`] reads the upper triangle either row by row or
//! diagonal by diagonal. [`tangent_space`] maps a matrix to the tangent
//! space at a reference point first, scaling off-diagonal terms by √2 so the
//! Euclidean norm of the vector equals the Riemannian norm of the tangent
//! matrix.
//!
//! # Example
//!
//! ```
//! use nalgebra::DMatrix;
//! use spd_geometry::featurization::{tangent_space, un_tangent_space};
//!
//! let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
//! let features = tangent_space(&m, None)?;
//! assert_eq!(features.len(), 3);
//! let back = un_tangent_space(&features, None)?;
//! assert!((back - m).norm() < 1e-10);
//! # Ok::<(), spd_geometry::GeometryError>(())
//! ```

use crate::basics::{ensure_same_size, ensure_square};
use crate::error::{GeometryError, Result};
use crate::math::linalg;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::SQRT_2;

/// Upper-triangle coordinates in reading order.
fn upper_indices(n: usize, row_major: bool) -> Vec<(usize, usize)> {
    let mut idx = Vec::with_capacity(n * (n + 1) / 2);
    if row_major {
        for i in 0..n {
            for j in i..n {
                idx.push((i, j));
            }
        }
    } else {
        for d in 0..n {
            for i in 0..n - d {
                idx.push((i, i + d));
            }
        }
    }
    idx
}

/// Side length `N` of a matrix whose upper triangle has `len` entries.
///
/// # Errors
///
/// Returns an error unless `len = N(N+1)/2` for a positive integer `N`.
pub fn side_from_len(len: usize) -> Result<usize> {
    let n = (((1.0 + 8.0 * len as f64).sqrt() - 1.0) / 2.0).round() as usize;
    if n == 0 || n * (n + 1) / 2 != len {
        return Err(GeometryError::dimension_mismatch(
            "triangular number of features",
            format!("{len} features"),
        ));
    }
    Ok(n)
}

/// Flatten the upper triangle (diagonal included) of a square matrix.
///
/// # Errors
///
/// Returns an error if the matrix is empty or not square.
pub fn squeeze_upper_triangle(m: &DMatrix<f64>, row_major: bool) -> Result<DVector<f64>> {
    ensure_square(m)?;
    let values: Vec<f64> = upper_indices(m.nrows(), row_major)
        .into_iter()
        .map(|(i, j)| m[(i, j)])
        .collect();
    Ok(DVector::from_vec(values))
}

/// Rebuild the symmetric matrix flattened by [`squeeze_upper_triangle`].
///
/// # Errors
///
/// Returns an error if the length is not a triangular number.
pub fn unsqueeze_upper_triangle(v: &DVector<f64>, row_major: bool) -> Result<DMatrix<f64>> {
    let n = side_from_len(v.len())?;
    let mut m = DMatrix::zeros(n, n);
    for ((i, j), &value) in upper_indices(n, row_major).into_iter().zip(v.iter()) {
        m[(i, j)] = value;
        m[(j, i)] = value;
    }
    Ok(m)
}

fn scale_off_diagonal(m: &mut DMatrix<f64>, factor: f64) {
    let n = m.nrows();
    for i in 0..n {
        for j in 0..n {
            if i != j {
                m[(i, j)] *= factor;
            }
        }
    }
}

/// Reference square roots `(R^½, R^-½)`, identity when absent or empty.
fn reference_roots(
    reference: Option<&DMatrix<f64>>,
    m: &DMatrix<f64>,
) -> Result<Option<(DMatrix<f64>, DMatrix<f64>)>> {
    match reference {
        Some(r) if !r.is_empty() => {
            ensure_same_size(r, m)?;
            Ok(Some((linalg::sqrtm(r)?, linalg::inv_sqrtm(r)?)))
        }
        _ => Ok(None),
    }
}

/// Tangent-space vector of `m` at `reference` (identity when `None`).
///
/// # Errors
///
/// Returns an error if `m` or `reference` is not SPD or their sizes differ.
pub fn tangent_space(m: &DMatrix<f64>, reference: Option<&DMatrix<f64>>) -> Result<DVector<f64>> {
    ensure_square(m)?;
    let whitened = match reference_roots(reference, m)? {
        Some((_, isc)) => &isc * m * &isc,
        None => m.clone(),
    };
    let mut j = linalg::logm(&whitened)?;
    scale_off_diagonal(&mut j, SQRT_2);
    squeeze_upper_triangle(&j, true)
}

/// Inverse of [`tangent_space`].
///
/// # Errors
///
/// Returns an error if the length is not triangular, the size does not
/// match `reference`, or `reference` is not SPD.
pub fn un_tangent_space(v: &DVector<f64>, reference: Option<&DMatrix<f64>>) -> Result<DMatrix<f64>> {
    let mut j = unsqueeze_upper_triangle(v, true)?;
    scale_off_diagonal(&mut j, 1.0 / SQRT_2);
    let e = linalg::expm(&j)?;
    match reference_roots(reference, &e)? {
        Some((sc, _)) => Ok(linalg::symmetrize(&(&sc * e * &sc))),
        None => Ok(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::distance_riemann;
    use approx::assert_relative_eq;

    fn spd() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[2.0, 0.3, 0.1, 0.3, 1.5, 0.2, 0.1, 0.2, 1.0])
    }

    fn reference() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[1.0, -0.2, 0.0, -0.2, 2.5, 0.4, 0.0, 0.4, 3.0])
    }

    #[test]
    fn test_squeeze_orders() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 2.0, 4.0, 5.0, 3.0, 5.0, 6.0]);
        let row = squeeze_upper_triangle(&m, true).unwrap();
        assert_eq!(row.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let diag = squeeze_upper_triangle(&m, false).unwrap();
        assert_eq!(diag.as_slice(), &[1.0, 4.0, 6.0, 2.0, 5.0, 3.0]);
    }

    #[test]
    fn test_squeeze_round_trip_is_exact() {
        let m = spd();
        for row_major in [true, false] {
            let v = squeeze_upper_triangle(&m, row_major).unwrap();
            assert_eq!(unsqueeze_upper_triangle(&v, row_major).unwrap(), m);
        }
    }

    #[test]
    fn test_unsqueeze_rejects_bad_length() {
        assert!(unsqueeze_upper_triangle(&DVector::zeros(4), true).is_err());
        assert!(unsqueeze_upper_triangle(&DVector::zeros(0), true).is_err());
        assert_eq!(side_from_len(10).unwrap(), 4);
    }

    #[test]
    fn test_tangent_round_trip() {
        let m = spd();
        let r = reference();
        for reference in [None, Some(&r)] {
            let v = tangent_space(&m, reference).unwrap();
            assert_eq!(v.len(), 6);
            let back = un_tangent_space(&v, reference).unwrap();
            assert_relative_eq!(back, m, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_tangent_norm_is_riemann_distance() {
        let (m, r) = (spd(), reference());
        let v = tangent_space(&m, Some(&r)).unwrap();
        assert_relative_eq!(v.norm(), distance_riemann(&r, &m).unwrap(), epsilon = 1e-10);
    }

    #[test]
    fn test_reference_maps_to_origin() {
        let r = reference();
        let v = tangent_space(&r, Some(&r)).unwrap();
        assert!(v.norm() < 1e-10);
        let empty = DMatrix::zeros(0, 0);
        assert_eq!(
            tangent_space(&r, Some(&empty)).unwrap(),
            tangent_space(&r, None).unwrap()
        );
    }

    #[test]
    fn test_tangent_rejects_size_mismatch() {
        assert!(tangent_space(&spd(), Some(&DMatrix::identity(2, 2))).is_err());
    }
}
