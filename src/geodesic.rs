//! Points along the shortest path between two SPD matrices.

use crate::basics::{ensure_same_size, ensure_square, in_range};
use crate::error::{GeometryError, Result};
use crate::math::linalg;
use crate::metric::Metric;
use nalgebra::DMatrix;
use tracing::warn;

/// Point at fraction `t` from `a` (t = 0) to `b` (t = 1) under `metric`.
///
/// LogDet, Kullback and ALE have no closed-form geodesic and use the
/// Riemannian one, see [`Metric::geodesic_metric`]. Under
/// [`Metric::Identity`] the result is always the identity.
///
/// # Errors
///
/// Returns an error if `t` lies outside `[0, 1]`, the matrices are not
/// square or of different sizes, or not positive definite where the metric
/// requires it.
pub fn geodesic(a: &DMatrix<f64>, b: &DMatrix<f64>, t: f64, metric: Metric) -> Result<DMatrix<f64>> {
    if !in_range(t, 0.0, 1.0) {
        return Err(GeometryError::invalid_parameter(format!(
            "geodesic position must be in [0, 1], got {t}"
        )));
    }
    ensure_square(a)?;
    ensure_same_size(a, b)?;

    let resolved = metric.geodesic_metric();
    if resolved != metric {
        warn!(%metric, %resolved, "no geodesic for metric, using fallback");
    }
    match resolved {
        Metric::Euclidean => Ok(geodesic_euclidean(a, b, t)),
        Metric::LogEuclidean => geodesic_log_euclidean(a, b, t),
        Metric::Harmonic => geodesic_harmonic(a, b, t),
        Metric::Wasserstein => geodesic_wasserstein(a, b, t),
        Metric::Identity => Ok(DMatrix::identity(a.nrows(), a.ncols())),
        Metric::Riemann | Metric::LogDet | Metric::Kullback | Metric::Ale => {
            geodesic_riemann(a, b, t)
        }
    }
}

/// `(1 − t)·a + t·b`.
#[must_use]
pub fn geodesic_euclidean(a: &DMatrix<f64>, b: &DMatrix<f64>, t: f64) -> DMatrix<f64> {
    a * (1.0 - t) + b * t
}

/// `exp((1 − t)·log a + t·log b)`.
///
/// # Errors
///
/// Returns an error if either matrix is not positive definite.
pub fn geodesic_log_euclidean(a: &DMatrix<f64>, b: &DMatrix<f64>, t: f64) -> Result<DMatrix<f64>> {
    let la = linalg::logm(a)?;
    let lb = linalg::logm(b)?;
    linalg::expm(&geodesic_euclidean(&la, &lb, t))
}

/// `a^½ (a^-½ b a^-½)^t a^½`.
///
/// # Errors
///
/// Returns an error if `a` is not positive definite.
pub fn geodesic_riemann(a: &DMatrix<f64>, b: &DMatrix<f64>, t: f64) -> Result<DMatrix<f64>> {
    let sa = linalg::sqrtm(a)?;
    let isa = linalg::inv_sqrtm(a)?;
    let inner = linalg::powm(&(&isa * b * &isa), t)?;
    Ok(linalg::symmetrize(&(&sa * inner * &sa)))
}

/// Inverse of the Euclidean geodesic between the inverses.
///
/// # Errors
///
/// Returns an error if either matrix is not positive definite.
pub fn geodesic_harmonic(a: &DMatrix<f64>, b: &DMatrix<f64>, t: f64) -> Result<DMatrix<f64>> {
    let ia = linalg::inverse(a)?;
    let ib = linalg::inverse(b)?;
    linalg::inverse(&geodesic_euclidean(&ia, &ib, t))
}

/// Bures-Wasserstein geodesic `((1 − t)I + tT) a ((1 − t)I + tT)` where
/// `T = a^-½ (a^½ b a^½)^½ a^-½` is the optimal transport map.
///
/// # Errors
///
/// Returns an error if `a` is not positive definite.
pub fn geodesic_wasserstein(a: &DMatrix<f64>, b: &DMatrix<f64>, t: f64) -> Result<DMatrix<f64>> {
    let sa = linalg::sqrtm(a)?;
    let isa = linalg::inv_sqrtm(a)?;
    let transport = &isa * linalg::sqrtm(&(&sa * b * &sa))? * &isa;
    let n = a.nrows();
    let step = DMatrix::identity(n, n) * (1.0 - t) + transport * t;
    Ok(linalg::symmetrize(&(&step * a * &step)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::distance;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn diag(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_diagonal(&DVector::from_row_slice(values))
    }

    fn spd_a() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[2.0, 0.3, 0.1, 0.3, 1.5, 0.2, 0.1, 0.2, 1.0])
    }

    fn spd_b() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[1.0, -0.2, 0.0, -0.2, 2.5, 0.4, 0.0, 0.4, 3.0])
    }

    #[test]
    fn test_endpoints() {
        let (a, b) = (spd_a(), spd_b());
        for metric in Metric::ALL.into_iter().filter(|&m| m != Metric::Identity) {
            assert_relative_eq!(geodesic(&a, &b, 0.0, metric).unwrap(), a, epsilon = 1e-8);
            assert_relative_eq!(geodesic(&a, &b, 1.0, metric).unwrap(), b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_riemann_midpoint_of_diagonals() {
        let mid = geodesic(&diag(&[1.0, 1.0]), &diag(&[4.0, 9.0]), 0.5, Metric::Riemann).unwrap();
        assert_relative_eq!(mid, diag(&[2.0, 3.0]), epsilon = 1e-10);
    }

    #[test]
    fn test_riemann_midpoint_is_equidistant() {
        let (a, b) = (spd_a(), spd_b());
        let mid = geodesic(&a, &b, 0.5, Metric::Riemann).unwrap();
        let da = distance(&a, &mid, Metric::Riemann).unwrap();
        let db = distance(&mid, &b, Metric::Riemann).unwrap();
        let dab = distance(&a, &b, Metric::Riemann).unwrap();
        assert_relative_eq!(da, db, epsilon = 1e-8);
        assert_relative_eq!(da + db, dab, epsilon = 1e-8);
    }

    #[test]
    fn test_harmonic_and_wasserstein_diagonals() {
        let (a, b) = (diag(&[1.0]), diag(&[4.0]));
        let h = geodesic(&a, &b, 0.5, Metric::Harmonic).unwrap();
        assert_relative_eq!(h[(0, 0)], 1.6, epsilon = 1e-12);
        let w = geodesic(&a, &b, 0.5, Metric::Wasserstein).unwrap();
        // ((1 + 2) / 2)^2
        assert_relative_eq!(w[(0, 0)], 2.25, epsilon = 1e-12);
    }

    #[test]
    fn test_identity_metric() {
        let g = geodesic(&spd_a(), &spd_b(), 0.3, Metric::Identity).unwrap();
        assert_eq!(g, DMatrix::identity(3, 3));
    }

    #[test]
    fn test_rejects_bad_position() {
        let (a, b) = (spd_a(), spd_b());
        assert!(geodesic(&a, &b, -0.1, Metric::Euclidean).is_err());
        assert!(geodesic(&a, &b, 1.5, Metric::Euclidean).is_err());
        assert!(geodesic(&a, &diag(&[1.0, 1.0]), 0.5, Metric::Euclidean).is_err());
    }
}
