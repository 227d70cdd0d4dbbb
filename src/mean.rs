//! Central SPD matrix of a set under a metric.
//!
//! Euclidean, log-Euclidean, harmonic and identity means are closed form.
//! Riemann, log-det, Wasserstein and ALE are fixed-point iterations bounded
//! by an [`IterationConfig`]; Kullback is the Riemannian midpoint of the
//! Euclidean and harmonic means.
//!
//! # Example
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use spd_geometry::{mean, Metric};
//!
//! let a = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0]));
//! let b = DMatrix::from_diagonal(&DVector::from_vec(vec![4.0, 4.0]));
//! let m = mean(&[a, b], Metric::Riemann)?;
//! assert!((m[(0, 0)] - 2.0).abs() < 1e-6);
//! # Ok::<(), spd_geometry::GeometryError>(())
//! ```

use crate::basics::all_same_size;
use crate::config::IterationConfig;
use crate::distance::distance_riemann;
use crate::error::{GeometryError, Result};
use crate::geodesic::geodesic_riemann;
use crate::math::linalg;
use crate::metric::Metric;
use nalgebra::DMatrix;
use tracing::{debug, warn};

/// Mean of `covs` under `metric` with the default stopping rule.
///
/// # Errors
///
/// See [`mean_with`].
pub fn mean(covs: &[DMatrix<f64>], metric: Metric) -> Result<DMatrix<f64>> {
    mean_with(covs, metric, &IterationConfig::default())
}

/// Mean of `covs` under `metric`.
///
/// A single matrix is its own mean. Non-square matrices are only accepted
/// by the Euclidean and identity metrics.
///
/// # Errors
///
/// Returns an error if `covs` is empty, the matrices differ in shape, are
/// non-square under a metric that needs square matrices, or are not
/// positive definite where the metric requires it.
pub fn mean_with(
    covs: &[DMatrix<f64>],
    metric: Metric,
    config: &IterationConfig,
) -> Result<DMatrix<f64>> {
    validate_set(covs, metric)?;
    config.validate()?;
    if covs.len() == 1 {
        return Ok(covs[0].clone());
    }
    match metric {
        Metric::Riemann => mean_riemann(covs, config),
        Metric::Euclidean => Ok(mean_euclidean(covs)),
        Metric::LogEuclidean => mean_log_euclidean(covs),
        Metric::LogDet => mean_log_det(covs, config),
        Metric::Kullback => mean_kullback(covs),
        Metric::Wasserstein => mean_wasserstein(covs, config),
        Metric::Harmonic => mean_harmonic(covs),
        Metric::Ale => mean_ale(covs, config),
        Metric::Identity => Ok(mean_identity(covs)),
    }
}

/// Shared precondition of means and medians.
pub(crate) fn validate_set(covs: &[DMatrix<f64>], metric: Metric) -> Result<()> {
    let first = covs
        .first()
        .ok_or_else(|| GeometryError::empty("matrix set"))?;
    if covs.len() == 1 {
        return Ok(());
    }
    if !all_same_size(covs) {
        let odd = covs
            .iter()
            .find(|m| m.shape() != first.shape())
            .map_or(first.shape(), DMatrix::shape);
        return Err(GeometryError::shape_mismatch(first.shape(), odd));
    }
    if first.is_empty() {
        return Err(GeometryError::empty("matrix"));
    }
    if !first.is_square() && !matches!(metric, Metric::Euclidean | Metric::Identity) {
        return Err(GeometryError::not_square(first.nrows(), first.ncols()));
    }
    Ok(())
}

fn report(kind: &str, iterations: usize, criterion: f64, converged: bool) {
    if converged {
        debug!(kind, iterations, criterion, "mean converged");
    } else {
        warn!(kind, iterations, criterion, "mean stopped at iteration limit");
    }
}

/// Arithmetic mean.
#[must_use]
pub fn mean_euclidean(covs: &[DMatrix<f64>]) -> DMatrix<f64> {
    let (r, c) = covs.first().map_or((0, 0), DMatrix::shape);
    let sum = covs.iter().fold(DMatrix::zeros(r, c), |acc, m| acc + m);
    sum / covs.len().max(1) as f64
}

/// `exp(mean(log Cᵢ))`.
///
/// # Errors
///
/// Returns an error if a matrix is not positive definite.
pub fn mean_log_euclidean(covs: &[DMatrix<f64>]) -> Result<DMatrix<f64>> {
    let logs = covs.iter().map(linalg::logm).collect::<Result<Vec<_>>>()?;
    linalg::expm(&mean_euclidean(&logs))
}

/// `inv(mean(inv Cᵢ))`.
///
/// # Errors
///
/// Returns an error if a matrix is not positive definite.
pub fn mean_harmonic(covs: &[DMatrix<f64>]) -> Result<DMatrix<f64>> {
    let inverses = covs.iter().map(linalg::inverse).collect::<Result<Vec<_>>>()?;
    linalg::inverse(&mean_euclidean(&inverses))
}

/// Identity with the shape of the inputs.
#[must_use]
pub fn mean_identity(covs: &[DMatrix<f64>]) -> DMatrix<f64> {
    let (r, c) = covs.first().map_or((0, 0), DMatrix::shape);
    DMatrix::identity(r, c)
}

/// Karcher mean under the affine-invariant metric.
///
/// Starts from the Euclidean mean and moves along `exp(ν·J)` where `J` is
/// the mean log-map at the current estimate. The step `ν` shrinks slowly
/// while the update decreases and halves when it does not.
///
/// # Errors
///
/// Returns an error if a matrix is not positive definite.
pub fn mean_riemann(covs: &[DMatrix<f64>], config: &IterationConfig) -> Result<DMatrix<f64>> {
    let k = covs.len() as f64;
    let n = covs[0].nrows();
    let mut mean = mean_euclidean(covs);
    let mut nu = 1.0;
    let mut tau = f64::MAX;
    let mut crit = f64::MAX;
    let mut i = 0;

    while i < config.max_iterations && config.tolerance < crit && config.tolerance < nu {
        i += 1;
        let sc = linalg::sqrtm(&mean)?;
        let isc = linalg::inv_sqrtm(&mean)?;
        let mut j = DMatrix::<f64>::zeros(n, n);
        for c in covs {
            j += linalg::logm(&(&isc * c * &isc))?;
        }
        j /= k;
        crit = j.norm();
        mean = linalg::symmetrize(&(&sc * linalg::expm(&(&j * nu))? * &sc));

        let h = nu * crit;
        if h < tau {
            nu *= 0.95;
            tau = h;
        } else {
            nu *= 0.5;
        }
    }
    report("riemann", i, crit, crit <= config.tolerance || nu <= config.tolerance);
    Ok(mean)
}

/// Log-det mean: fixed point of `M = inv(mean(inv((Cᵢ + M)/2)))`.
///
/// # Errors
///
/// Returns an error if a matrix is not positive definite.
pub fn mean_log_det(covs: &[DMatrix<f64>], config: &IterationConfig) -> Result<DMatrix<f64>> {
    let mut mean = mean_euclidean(covs);
    let mut crit = f64::MAX;
    let mut i = 0;

    while i < config.max_iterations && config.tolerance < crit {
        i += 1;
        let inverses = covs
            .iter()
            .map(|c| linalg::inverse(&((c + &mean) * 0.5)))
            .collect::<Result<Vec<_>>>()?;
        let next = linalg::inverse(&mean_euclidean(&inverses))?;
        crit = (&next - &mean).norm();
        mean = next;
    }
    report("logdet", i, crit, crit <= config.tolerance);
    Ok(mean)
}

/// Riemannian midpoint of the Euclidean and harmonic means.
///
/// # Errors
///
/// Returns an error if a matrix is not positive definite.
pub fn mean_kullback(covs: &[DMatrix<f64>]) -> Result<DMatrix<f64>> {
    let arithmetic = mean_euclidean(covs);
    let harmonic = mean_harmonic(covs)?;
    geodesic_riemann(&arithmetic, &harmonic, 0.5)
}

/// Bures-Wasserstein barycenter by fixed point on the square root.
///
/// # Errors
///
/// Returns an error if a square root cannot be computed.
pub fn mean_wasserstein(covs: &[DMatrix<f64>], config: &IterationConfig) -> Result<DMatrix<f64>> {
    let mut sc = linalg::sqrtm(&mean_euclidean(covs))?;
    let mut crit = f64::MAX;
    let mut i = 0;

    while i < config.max_iterations && config.tolerance < crit {
        i += 1;
        let roots = covs
            .iter()
            .map(|c| linalg::sqrtm(&(&sc * c * &sc)))
            .collect::<Result<Vec<_>>>()?;
        let sj = linalg::sqrtm(&mean_euclidean(&roots))?;
        crit = (&sj - &sc).norm();
        sc = sj;
    }
    report("wasserstein", i, crit, crit <= config.tolerance);
    Ok(linalg::symmetrize(&(&sc * &sc)))
}

/// Initial diagonalizer for the ALE mean.
///
/// Pham's joint diagonalization is not implemented; the identity is used
/// and the fixed point of [`mean_ale`] does the rest.
#[must_use]
pub fn ajd_pham(covs: &[DMatrix<f64>]) -> DMatrix<f64> {
    warn!("approximate joint diagonalization not implemented, starting from identity");
    mean_identity(covs)
}

/// ALE mean: log-Euclidean mean in a jointly diagonalizing basis.
///
/// # Errors
///
/// Returns an error if a matrix is not positive definite or the basis
/// becomes singular.
pub fn mean_ale(covs: &[DMatrix<f64>], config: &IterationConfig) -> Result<DMatrix<f64>> {
    let n = covs[0].nrows();
    let identity = DMatrix::<f64>::identity(n, n);
    let mut basis = ajd_pham(covs);
    let mut crit = f64::MAX;
    let mut i = 0;

    let mean_log = |basis: &DMatrix<f64>| -> Result<DMatrix<f64>> {
        let logs = covs
            .iter()
            .map(|c| linalg::logm(&(basis.transpose() * c * basis)))
            .collect::<Result<Vec<_>>>()?;
        Ok(mean_euclidean(&logs))
    };

    while i < config.max_iterations && config.tolerance < crit {
        i += 1;
        let j = mean_log(&basis)?;
        let update = DMatrix::from_diagonal(&linalg::expm(&j)?.diagonal());
        basis *= linalg::inv_sqrtm(&update)?;
        crit = distance_riemann(&identity, &update)?;
    }
    report("ale", i, crit, crit <= config.tolerance);

    let j = mean_log(&basis)?;
    let a = basis
        .try_inverse()
        .ok_or_else(|| GeometryError::numerical_instability("ALE basis is singular"))?;
    Ok(linalg::symmetrize(&(a.transpose() * linalg::expm(&j)? * &a)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::are_equals;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    fn diag(values: &[f64]) -> DMatrix<f64> {
        DMatrix::from_diagonal(&DVector::from_row_slice(values))
    }

    fn spd_set() -> Vec<DMatrix<f64>> {
        vec![
            DMatrix::from_row_slice(3, 3, &[2.0, 0.3, 0.1, 0.3, 1.5, 0.2, 0.1, 0.2, 1.0]),
            DMatrix::from_row_slice(3, 3, &[1.0, -0.2, 0.0, -0.2, 2.5, 0.4, 0.0, 0.4, 3.0]),
            DMatrix::from_row_slice(3, 3, &[1.5, 0.1, 0.2, 0.1, 1.0, 0.0, 0.2, 0.0, 2.0]),
        ]
    }

    #[test]
    fn test_bad_input() {
        assert!(mean(&[], Metric::Riemann).is_err());
        let mut bad = vec![DMatrix::zeros(1, 2), DMatrix::zeros(1, 2)];
        assert!(mean(&bad, Metric::Riemann).is_err());
        bad.push(DMatrix::zeros(2, 2));
        assert!(mean(&bad, Metric::Riemann).is_err());
        assert!(mean(&bad, Metric::Euclidean).is_err());
    }

    #[test]
    fn test_single_matrix_is_its_own_mean() {
        let set = vec![spd_set()[1].clone()];
        for metric in Metric::ALL {
            assert_eq!(mean(&set, metric).unwrap(), set[0]);
        }
    }

    #[test]
    fn test_diagonal_means() {
        let set = [diag(&[1.0, 2.0]), diag(&[4.0, 8.0])];
        assert_relative_eq!(mean(&set, Metric::Euclidean).unwrap(), diag(&[2.5, 5.0]), epsilon = 1e-12);
        assert_relative_eq!(mean(&set, Metric::Riemann).unwrap(), diag(&[2.0, 4.0]), epsilon = 1e-4);
        assert_relative_eq!(mean(&set, Metric::LogEuclidean).unwrap(), diag(&[2.0, 4.0]), epsilon = 1e-10);
        assert_relative_eq!(mean(&set, Metric::Harmonic).unwrap(), diag(&[1.6, 3.2]), epsilon = 1e-10);
        // ((1 + 2) / 2)^2 and ((sqrt 2 + sqrt 8) / 2)^2
        assert_relative_eq!(mean(&set, Metric::Wasserstein).unwrap(), diag(&[2.25, 4.5]), epsilon = 1e-3);
        assert_relative_eq!(mean(&set, Metric::Ale).unwrap(), diag(&[2.0, 4.0]), epsilon = 1e-4);
        // Geometric mean of arithmetic and harmonic means.
        let kl = mean(&set, Metric::Kullback).unwrap();
        assert_relative_eq!(kl, diag(&[(2.5_f64 * 1.6).sqrt(), (5.0_f64 * 3.2).sqrt()]), epsilon = 1e-10);
        assert_eq!(mean(&set, Metric::Identity).unwrap(), DMatrix::identity(2, 2));
    }

    #[test]
    #[allow(clippy::unreadable_literal)]
    fn test_reference_means() {
        let set = spd_set();
        let config = IterationConfig::precise();
        let cases = [
            (Metric::Euclidean, [
                1.5, 0.066666666667, 0.1,
                0.066666666667, 1.666666666667, 0.2,
                0.1, 0.2, 2.0,
            ]),
            (Metric::LogEuclidean, [
                1.429471285119, 0.068318073651, 0.100977408155,
                0.068318073651, 1.538326435467, 0.169081183382,
                0.100977408155, 0.169081183382, 1.808876147943,
            ]),
            (Metric::Harmonic, [
                1.362062583482, 0.061079851592, 0.086353007825,
                0.061079851592, 1.425161144292, 0.13989363902,
                0.086353007825, 0.13989363902, 1.616876957581,
            ]),
            (Metric::Riemann, [
                1.430392384486, 0.06488919275, 0.09468254106,
                0.06488919275, 1.537589701856, 0.164038250069,
                0.09468254106, 0.164038250069, 1.806396238983,
            ]),
            (Metric::Kullback, [
                1.429366746073, 0.063805778916, 0.092889716925,
                0.063805778916, 1.541107889872, 0.167879443146,
                0.092889716925, 0.167879443146, 1.798211699448,
            ]),
            (Metric::LogDet, [
                1.430929789444, 0.065449521022, 0.095610578984,
                0.065449521022, 1.535707740277, 0.162026611394,
                0.095610578984, 0.162026611394, 1.810840503343,
            ]),
            (Metric::Wasserstein, [
                1.463301071075, 0.071537631465, 0.107796094473,
                0.071537631465, 1.601738566407, 0.188135691117,
                0.107796094473, 0.188135691117, 1.907789205299,
            ]),
            (Metric::Ale, [
                1.429785857225, 0.067529346503, 0.100570070053,
                0.067529346503, 1.538158350092, 0.168242207752,
                0.100570070053, 0.168242207752, 1.808370176091,
            ]),
        ];
        for (metric, expected) in cases {
            let m = mean_with(&set, metric, &config).unwrap();
            let expected = DMatrix::from_row_slice(3, 3, &expected);
            assert!(are_equals(&m, &expected, 1e-6), "{metric}: {m} differs from {expected}");
        }
        let identity = mean_with(&set, Metric::Identity, &config).unwrap();
        assert_eq!(identity, DMatrix::identity(3, 3));
    }

    #[test]
    fn test_log_det_mean_of_scalars() {
        // For commuting matrices the fixed point solves 2/(a+m) + 2/(b+m) = 2/m.
        let m = mean(&[diag(&[1.0]), diag(&[4.0])], Metric::LogDet).unwrap();
        assert_relative_eq!(m[(0, 0)], 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_riemann_mean_minimizes_log_map() {
        let set = spd_set();
        let config = IterationConfig::precise();
        let m = mean_with(&set, Metric::Riemann, &config).unwrap();
        let ism = linalg::inv_sqrtm(&m).unwrap();
        let mut j = DMatrix::<f64>::zeros(3, 3);
        for c in &set {
            j += linalg::logm(&(&ism * c * &ism)).unwrap();
        }
        assert!(j.norm() / 3.0 < 1e-6);
    }

    #[test]
    fn test_every_metric_gives_spd() {
        let set = spd_set();
        for metric in Metric::ALL {
            let m = mean(&set, metric).unwrap();
            assert_relative_eq!(m, m.transpose(), epsilon = 1e-10);
            let values = linalg::eigenvalues(&m).unwrap();
            assert!(values.iter().all(|&v| v > 0.0), "{metric}");
        }
    }

    #[test]
    fn test_iteration_limit_is_respected() {
        let set = spd_set();
        let config = IterationConfig::default().with_max_iterations(1);
        let rough = mean_with(&set, Metric::Riemann, &config).unwrap();
        let fine = mean_with(&set, Metric::Riemann, &IterationConfig::precise()).unwrap();
        assert!((&rough - &fine).norm() > 0.0);
        assert!(mean_with(&set, Metric::Riemann, &config.with_tolerance(-1.0)).is_err());
    }
}
