//! Scalar, element-wise and geometric medians.
//!
//! The geometric median minimizes the sum of distances rather than the sum
//! of squared distances. It uses the same fixed-point scheme as the mean,
//! with every sample weighted by the inverse of its current distance.
//! Only the Euclidean, Riemannian and identity metrics are native; the
//! others fall back to Euclidean, see [`Metric::median_metric`].

use crate::config::IterationConfig;
use crate::error::{GeometryError, Result};
use crate::math::linalg;
use crate::mean::{mean_euclidean, mean_identity, validate_set};
use crate::metric::Metric;
use nalgebra::DMatrix;
use tracing::{debug, warn};

/// Distances below this are clamped so that a sample sitting on the current
/// estimate does not get an infinite weight.
const DISTANCE_FLOOR: f64 = 1e-10;

/// Median of a list of values. An even count averages the two middle values.
///
/// # Errors
///
/// Returns an error if `values` is empty or contains NaN.
pub fn median_of(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(GeometryError::empty("median values"));
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(GeometryError::numerical_instability("NaN in median values"));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Ok(0.5 * (sorted[mid - 1] + sorted[mid]))
    } else {
        Ok(sorted[mid])
    }
}

/// Median of every element of a matrix.
///
/// # Errors
///
/// Returns an error if the matrix is empty or contains NaN.
pub fn matrix_element_median(m: &DMatrix<f64>) -> Result<f64> {
    median_of(m.as_slice())
}

/// Geometric median of `covs` with the default stopping rule.
///
/// # Errors
///
/// See [`median_with`].
pub fn median(covs: &[DMatrix<f64>], metric: Metric) -> Result<DMatrix<f64>> {
    median_with(covs, metric, &IterationConfig::default())
}

/// Geometric median of `covs` under `metric`.
///
/// # Errors
///
/// Returns an error on the same inputs as [`crate::mean::mean_with`].
pub fn median_with(
    covs: &[DMatrix<f64>],
    metric: Metric,
    config: &IterationConfig,
) -> Result<DMatrix<f64>> {
    validate_set(covs, metric)?;
    config.validate()?;
    if covs.len() == 1 {
        return Ok(covs[0].clone());
    }
    let resolved = metric.median_metric();
    if resolved != metric {
        warn!(%metric, %resolved, "no geometric median for metric, using fallback");
    }
    match resolved {
        Metric::Riemann => median_riemann(covs, config),
        Metric::Identity => Ok(mean_identity(covs)),
        _ => Ok(median_euclidean(covs, config)),
    }
}

/// Weiszfeld iteration in the Frobenius geometry.
#[must_use]
pub fn median_euclidean(covs: &[DMatrix<f64>], config: &IterationConfig) -> DMatrix<f64> {
    let mut median = mean_euclidean(covs);
    let mut crit = f64::MAX;
    let mut i = 0;

    while i < config.max_iterations && config.tolerance < crit {
        i += 1;
        let mut total = 0.0;
        let mut next = DMatrix::<f64>::zeros(median.nrows(), median.ncols());
        for c in covs {
            let w = 1.0 / (c - &median).norm().max(DISTANCE_FLOOR);
            next += c * w;
            total += w;
        }
        next /= total;
        crit = (&next - &median).norm();
        median = next;
    }
    debug!(iterations = i, criterion = crit, "euclidean median");
    median
}

/// Riemannian geometric median: inverse-distance weighted Karcher flow.
///
/// # Errors
///
/// Returns an error if a matrix is not positive definite.
pub fn median_riemann(covs: &[DMatrix<f64>], config: &IterationConfig) -> Result<DMatrix<f64>> {
    let n = covs[0].nrows();
    let mut median = mean_euclidean(covs);
    let mut crit = f64::MAX;
    let mut i = 0;

    while i < config.max_iterations && config.tolerance < crit {
        i += 1;
        let sc = linalg::sqrtm(&median)?;
        let isc = linalg::inv_sqrtm(&median)?;
        let mut total = 0.0;
        let mut j = DMatrix::<f64>::zeros(n, n);
        for c in covs {
            let log = linalg::logm(&(&isc * c * &isc))?;
            let w = 1.0 / log.norm().max(DISTANCE_FLOOR);
            j += log * w;
            total += w;
        }
        j /= total;
        crit = j.norm();
        median = linalg::symmetrize(&(&sc * linalg::expm(&j)? * &sc));
    }
    debug!(iterations = i, criterion = crit, "riemann median");
    Ok(median)
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

    #[test]
    fn test_scalar_median() {
        let v = [5.0, 6.0, 4.0, 3.0, 2.0, 6.0, 7.0, 9.0, 3.0];
        assert_relative_eq!(median_of(&v).unwrap(), 5.0);
        assert_relative_eq!(median_of(&v[..8]).unwrap(), 5.5);
        assert!(median_of(&[]).is_err());
        assert!(median_of(&[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_matrix_element_median() {
        let m = DMatrix::from_row_slice(3, 3, &[5.0, 6.0, 4.0, 3.0, 2.0, 6.0, 7.0, 9.0, 3.0]);
        assert_relative_eq!(matrix_element_median(&m).unwrap(), 5.0);
    }

    #[test]
    fn test_bad_input() {
        assert!(median(&[], Metric::Riemann).is_err());
        let mut bad = vec![DMatrix::zeros(1, 2), DMatrix::zeros(1, 2)];
        assert!(median(&bad, Metric::Riemann).is_err());
        bad.push(DMatrix::zeros(2, 2));
        assert!(median(&bad, Metric::Riemann).is_err());
    }

    #[test]
    fn test_median_ignores_outlier() {
        let mut set = vec![diag(&[1.0, 1.0]); 4];
        set.push(diag(&[100.0, 100.0]));
        for metric in [Metric::Euclidean, Metric::Riemann] {
            let med = median(&set, metric).unwrap();
            let to_clean = distance(&med, &set[0], Metric::Euclidean).unwrap();
            let mean_gap = distance(&mean_euclidean(&set), &set[0], Metric::Euclidean).unwrap();
            assert!(to_clean < 0.1 * mean_gap, "{metric}: {to_clean}");
        }
    }

    #[test]
    fn test_fallbacks() {
        let set = vec![diag(&[1.0, 2.0]), diag(&[3.0, 1.0]), diag(&[2.0, 5.0])];
        let euclid = median(&set, Metric::Euclidean).unwrap();
        assert_eq!(median(&set, Metric::LogDet).unwrap(), euclid);
        assert_eq!(median(&set, Metric::Identity).unwrap(), DMatrix::identity(2, 2));
    }

    #[test]
    fn test_single_matrix_is_its_own_median() {
        let set = vec![diag(&[3.0, 0.5])];
        for metric in Metric::ALL {
            assert_eq!(median(&set, metric).unwrap(), set[0], "{metric}");
        }
    }
}
