//! Covariance estimation from `channels x samples` epochs.
//!
//! [`covariance_matrix`] dispatches on [`Estimator`] after applying the
//! requested [`Standardization`]. MCD has no implementation and resolves to
//! the identity estimator; [`Estimator::is_fallback`] reports this and a
//! warning is logged whenever the fallback runs.

use crate::basics::{self, Standardization};
use crate::error::{GeometryError, Result};
use nalgebra::{DMatrix, RowDVector};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Covariance estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Estimator {
    /// Sample covariance.
    Cov,
    /// Sample covariance matrix `XXᵀ` normalized to unit trace.
    Scm,
    /// Ledoit-Wolf shrinkage.
    #[default]
    Lwf,
    /// Oracle approximating shrinkage.
    Oas,
    /// Minimum covariance determinant. Not implemented, resolves to [`Estimator::Ide`].
    Mcd,
    /// Correlation matrix.
    Cor,
    /// Identity matrix, independent of the data.
    Ide,
}

impl Estimator {
    /// Every estimator.
    pub const ALL: [Self; 7] = [
        Self::Cov,
        Self::Scm,
        Self::Lwf,
        Self::Oas,
        Self::Mcd,
        Self::Cor,
        Self::Ide,
    ];

    /// Tag used in text representations.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cov => "COV",
            Self::Scm => "SCM",
            Self::Lwf => "LWF",
            Self::Oas => "OAS",
            Self::Mcd => "MCD",
            Self::Cor => "COR",
            Self::Ide => "IDE",
        }
    }

    /// The estimator that actually runs for this tag.
    #[must_use]
    pub const fn resolved(self) -> Self {
        match self {
            Self::Mcd => Self::Ide,
            other => other,
        }
    }

    /// `true` when this tag runs another estimator in its place.
    #[must_use]
    pub const fn is_fallback(self) -> bool {
        matches!(self, Self::Mcd)
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Estimator {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GeometryError::unknown_tag("estimator", s))
    }
}

/// Population variance of a row: `Σx²/S − μ²`. Zero for an empty row.
#[must_use]
pub fn variance(x: &RowDVector<f64>) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mu = x.mean();
    x.component_mul(x).sum() / x.len() as f64 - mu * mu
}

/// Population covariance of two rows: `(Σxy − ΣxΣy/S)/S`.
/// Zero for empty or mismatched rows.
#[must_use]
pub fn covariance(x: &RowDVector<f64>, y: &RowDVector<f64>) -> f64 {
    let s = x.len();
    if s == 0 || s != y.len() {
        return 0.0;
    }
    let s = s as f64;
    (x.component_mul(y).sum() - x.sum() * y.sum() / s) / s
}

/// Shrink `cov` toward `trace(cov)/N · I` in place.
///
/// # Errors
///
/// Returns an error if `shrinkage` lies outside `[0, 1]` or `cov` is not
/// square; `cov` is untouched in that case.
pub fn shrunk_covariance(cov: &mut DMatrix<f64>, shrinkage: f64) -> Result<()> {
    if !basics::in_range(shrinkage, 0.0, 1.0) {
        return Err(GeometryError::invalid_parameter(format!(
            "shrinkage must be in [0, 1], got {shrinkage}"
        )));
    }
    basics::ensure_square(cov)?;
    let n = cov.nrows();
    let coef = shrinkage * cov.trace() / n as f64;
    *cov *= 1.0 - shrinkage;
    for i in 0..n {
        cov[(i, i)] += coef;
    }
    Ok(())
}

/// Shrunk copy of `cov`.
///
/// # Errors
///
/// See [`shrunk_covariance`].
pub fn shrunk(cov: &DMatrix<f64>, shrinkage: f64) -> Result<DMatrix<f64>> {
    let mut out = cov.clone();
    shrunk_covariance(&mut out, shrinkage)?;
    Ok(out)
}

/// Covariance of a `channels x samples` matrix.
///
/// # Errors
///
/// Returns an error if `samples` is empty; nothing is computed in that case.
pub fn covariance_matrix(
    samples: &DMatrix<f64>,
    estimator: Estimator,
    standardization: Standardization,
) -> Result<DMatrix<f64>> {
    let x = basics::standardized(samples, standardization)?;
    if estimator.is_fallback() {
        warn!(
            estimator = %estimator,
            fallback = %estimator.resolved(),
            "covariance estimator not implemented, using fallback"
        );
    }
    match estimator.resolved() {
        Estimator::Cov => Ok(covariance_cov(&x)),
        Estimator::Scm => covariance_scm(&x),
        Estimator::Lwf => covariance_lwf(&x),
        Estimator::Oas => covariance_oas(&x),
        Estimator::Cor => Ok(covariance_cor(&x)),
        Estimator::Ide | Estimator::Mcd => Ok(covariance_ide(&x)),
    }
}

/// Covariances of many epochs, computed in parallel. Output order matches
/// input order.
///
/// # Errors
///
/// Returns the first error of any epoch.
pub fn covariance_matrices(
    epochs: &[DMatrix<f64>],
    estimator: Estimator,
    standardization: Standardization,
) -> Result<Vec<DMatrix<f64>>> {
    epochs
        .par_iter()
        .map(|e| covariance_matrix(e, estimator, standardization))
        .collect()
}

/// Sample covariance.
#[must_use]
pub fn covariance_cov(samples: &DMatrix<f64>) -> DMatrix<f64> {
    let n = samples.nrows();
    let rows: Vec<RowDVector<f64>> = samples.row_iter().map(|r| r.into_owned()).collect();
    let mut cov = DMatrix::zeros(n, n);
    for i in 0..n {
        cov[(i, i)] = variance(&rows[i]);
        for j in i + 1..n {
            let c = covariance(&rows[i], &rows[j]);
            cov[(i, j)] = c;
            cov[(j, i)] = c;
        }
    }
    cov
}

/// `XXᵀ / trace(XXᵀ)`.
///
/// # Errors
///
/// Returns an error if the data is all zero.
pub fn covariance_scm(samples: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let cov = samples * samples.transpose();
    let trace = cov.trace();
    if trace.abs() <= f64::EPSILON {
        return Err(GeometryError::numerical_instability(
            "SCM of all-zero data has zero trace",
        ));
    }
    Ok(cov / trace)
}

/// Ledoit-Wolf shrunk covariance.
///
/// # Errors
///
/// Returns an error only if the data is not finite.
pub fn covariance_lwf(samples: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (n, s) = samples.shape();
    let mut cov = covariance_cov(samples);
    let mu = cov.trace() / n as f64;

    let mut delta_m = cov.clone();
    for i in 0..n {
        delta_m[(i, i)] -= mu;
    }
    let x2 = samples.component_mul(samples);
    let cov2 = cov.component_mul(&cov);

    let delta = delta_m.component_mul(&delta_m).sum() / n as f64;
    let beta = ((&x2 * x2.transpose()) / s as f64 - cov2).sum() / (n * s) as f64;
    let shrinkage = if delta <= f64::EPSILON {
        // Already proportional to the identity.
        0.0
    } else {
        (beta.min(delta) / delta).clamp(0.0, 1.0)
    };
    if !shrinkage.is_finite() {
        return Err(GeometryError::numerical_instability("LWF shrinkage"));
    }
    shrunk_covariance(&mut cov, shrinkage)?;
    Ok(cov)
}

/// Oracle approximating shrinkage covariance (Chen et al.).
///
/// # Errors
///
/// Returns an error only if the data is not finite.
pub fn covariance_oas(samples: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let (n, s) = samples.shape();
    let mut cov = covariance_cov(samples);

    let mu = cov.trace() / n as f64;
    let mu2 = mu * mu;
    let alpha = cov.component_mul(&cov).mean();
    let num = alpha + mu2;
    let den = (s + 1) as f64 * (alpha - mu2 / n as f64);
    let shrinkage = if den.abs() <= f64::EPSILON {
        1.0
    } else {
        (num / den).min(1.0)
    };
    if !shrinkage.is_finite() {
        return Err(GeometryError::numerical_instability("OAS shrinkage"));
    }
    shrunk_covariance(&mut cov, shrinkage.max(0.0))?;
    Ok(cov)
}

/// Correlation matrix. A channel with zero variance gets a unit diagonal
/// and zero correlation with every other channel.
#[must_use]
pub fn covariance_cor(samples: &DMatrix<f64>) -> DMatrix<f64> {
    let cov = covariance_cov(samples);
    let d: Vec<f64> = cov.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect();
    let n = cov.nrows();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else if d[i] <= f64::EPSILON || d[j] <= f64::EPSILON {
            0.0
        } else {
            cov[(i, j)] / (d[i] * d[j])
        }
    })
}

/// Identity of size `channels x channels`.
#[must_use]
pub fn covariance_ide(samples: &DMatrix<f64>) -> DMatrix<f64> {
    DMatrix::identity(samples.nrows(), samples.nrows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basics::{are_equals, is_square};
    use crate::testing::random_epoch;
    use approx::assert_relative_eq;

    fn epoch() -> DMatrix<f64> {
        random_epoch(4, 64, &[1.0, 2.0, 0.5, 1.5], 7)
    }

    /// Strongly correlated channels so that neither shrinkage saturates.
    fn reference_epoch() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            3,
            16,
            &[
                1.0, 2.0, 0.0, -1.0, 3.0, 1.0, 2.0, -2.0, 0.0, 1.0, 4.0, -1.0, 2.0, 0.0, -3.0, 1.0,
                1.0, 3.0, 0.0, -2.0, 3.0, 2.0, 2.0, -1.0, 1.0, 1.0, 5.0, -1.0, 2.0, -1.0, -3.0, 2.0,
                -2.0, -5.0, 1.0, 2.0, -6.0, -1.0, -4.0, 4.0, 1.0, -2.0, -8.0, 3.0, -3.0, 0.0, 6.0, -2.0,
            ],
        )
    }

    #[test]
    #[allow(clippy::unreadable_literal)]
    fn test_reference_values() {
        let x = reference_epoch();
        let cases = [
            (Estimator::Cov, Standardization::None, [
                3.109375, 3.390625, -6.375,
                3.390625, 4.109375, -6.9375,
                -6.375, -6.9375, 13.375,
            ]),
            (Estimator::Scm, Standardization::None, [
                0.153846153846, 0.173076923077, -0.307692307692,
                0.173076923077, 0.214285714286, -0.343406593407,
                -0.307692307692, -0.343406593407, 0.631868131868,
            ]),
            (Estimator::Cor, Standardization::None, [
                1.0, 0.948539282653, -0.988545679979,
                0.948539282653, 1.0, -0.935768051231,
                -0.988545679979, -0.935768051231, 1.0,
            ]),
            (Estimator::Lwf, Standardization::Center, [
                3.64196786384, 2.909740181193, -5.47084789828,
                2.909740181193, 4.500140083178, -5.953569771658,
                -5.47084789828, -5.953569771658, 12.451642052982,
            ]),
            (Estimator::Oas, Standardization::Center, [
                3.802320071201, 2.764956149304, -5.198627230028,
                2.764956149304, 4.617791009244, -5.657329632678,
                -5.198627230028, -5.657329632678, 12.173638919555,
            ]),
        ];
        for (estimator, mode, expected) in cases {
            let cov = covariance_matrix(&x, estimator, mode).unwrap();
            let expected = DMatrix::from_row_slice(3, 3, &expected);
            assert!(
                are_equals(&cov, &expected, 1e-9),
                "{estimator}: {cov} differs from {expected}"
            );
        }
        let ide = covariance_matrix(&x, Estimator::Ide, Standardization::Center).unwrap();
        assert_eq!(ide, DMatrix::identity(3, 3));
    }

    #[test]
    fn test_variance_and_covariance() {
        let x = RowDVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let y = RowDVector::from_vec(vec![2.0, 4.0, 6.0, 8.0]);
        assert_relative_eq!(variance(&x), 1.25, epsilon = 1e-12);
        assert_relative_eq!(covariance(&x, &y), 2.5, epsilon = 1e-12);
        assert_relative_eq!(covariance(&x, &RowDVector::zeros(3)), 0.0);
    }

    #[test]
    fn test_shrunk_covariance_bounds() {
        let cov = covariance_cov(&epoch());
        let mut m = cov.clone();
        assert!(shrunk_covariance(&mut m, -0.1).is_err());
        assert!(shrunk_covariance(&mut m, 1.1).is_err());
        assert_eq!(m, cov);

        assert!(shrunk_covariance(&mut m, 0.0).is_ok());
        assert_relative_eq!(m, cov, epsilon = 1e-14);

        let full = shrunk(&cov, 1.0).unwrap();
        let expected = DMatrix::identity(4, 4) * (cov.trace() / 4.0);
        assert_relative_eq!(full, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_every_estimator_is_symmetric() {
        let x = epoch();
        for estimator in Estimator::ALL {
            for mode in Standardization::ALL {
                let cov = covariance_matrix(&x, estimator, mode).unwrap();
                assert!(is_square(&cov));
                assert_eq!(cov.nrows(), 4);
                assert_relative_eq!(cov, cov.transpose(), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_ide_ignores_values() {
        let x = epoch() * 1000.0;
        let cov = covariance_matrix(&x, Estimator::Ide, Standardization::None).unwrap();
        assert_eq!(cov, DMatrix::identity(4, 4));
    }

    #[test]
    fn test_mcd_falls_back_to_ide() {
        assert!(Estimator::Mcd.is_fallback());
        assert_eq!(Estimator::Mcd.resolved(), Estimator::Ide);
        assert!(!Estimator::Lwf.is_fallback());
        let cov = covariance_matrix(&epoch(), Estimator::Mcd, Standardization::None).unwrap();
        assert_eq!(cov, DMatrix::identity(4, 4));
    }

    #[test]
    fn test_empty_input_rejected() {
        let empty = DMatrix::<f64>::zeros(0, 0);
        for estimator in Estimator::ALL {
            assert!(covariance_matrix(&empty, estimator, Standardization::None).is_err());
        }
    }

    #[test]
    fn test_scm_unit_trace() {
        let cov = covariance_matrix(&epoch(), Estimator::Scm, Standardization::None).unwrap();
        assert_relative_eq!(cov.trace(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shrinkage_preserves_trace() {
        let x = epoch();
        let cov = covariance_cov(&x);
        let lwf = covariance_lwf(&x).unwrap();
        let oas = covariance_oas(&x).unwrap();
        assert_relative_eq!(lwf.trace(), cov.trace(), epsilon = 1e-10);
        assert_relative_eq!(oas.trace(), cov.trace(), epsilon = 1e-10);
    }

    #[test]
    fn test_cor_unit_diagonal() {
        let mut x = epoch();
        x.row_mut(2).fill(3.0);
        let cor = covariance_cor(&x);
        for i in 0..4 {
            assert_relative_eq!(cor[(i, i)], 1.0);
        }
        assert!(cor.iter().all(|v| v.is_finite() && v.abs() <= 1.0 + 1e-12));
        assert_relative_eq!(cor[(2, 0)], 0.0);
    }

    #[test]
    fn test_estimator_tags() {
        for estimator in Estimator::ALL {
            assert_eq!(estimator.to_string().parse::<Estimator>().unwrap(), estimator);
        }
        assert_eq!("lwf".parse::<Estimator>().unwrap(), Estimator::Lwf);
        assert!("XYZ".parse::<Estimator>().is_err());
    }

    #[test]
    fn test_batch_matches_single() {
        let epochs: Vec<_> = (0..5).map(|s| random_epoch(3, 32, &[1.0, 1.0, 1.0], s)).collect();
        let batch = covariance_matrices(&epochs, Estimator::Cov, Standardization::Center).unwrap();
        for (e, c) in epochs.iter().zip(&batch) {
            let single = covariance_matrix(e, Estimator::Cov, Standardization::Center).unwrap();
            assert_eq!(&single, c);
        }
    }
}
