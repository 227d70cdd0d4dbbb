//! Shape validation, row standardization, tolerant equality and the text
//! helpers used by persistence.
//!
//! Predicates never fail: they answer `false` for malformed input so that
//! callers can check preconditions before the numerically sensitive steps.

use crate::error::{GeometryError, Result};
use crate::math::linalg;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::str::FromStr;

/// Per-row preprocessing applied before covariance estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Standardization {
    /// Leave the data untouched.
    #[default]
    None,
    /// Subtract each row's mean.
    Center,
    /// Subtract each row's mean and divide by its standard deviation.
    StandardScale,
}

impl Standardization {
    /// Every standardization mode.
    pub const ALL: [Self; 3] = [Self::None, Self::Center, Self::StandardScale];

    /// Tag used in text representations.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Center => "Center",
            Self::StandardScale => "StandardScale",
        }
    }
}

impl fmt::Display for Standardization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Standardization {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GeometryError::unknown_tag("standardization", s))
    }
}

// ============================================================================
// Standardization
// ============================================================================

/// Apply `mode` to the rows of `m` in place.
///
/// # Errors
///
/// Returns an error if `m` is empty; `m` is untouched in that case.
pub fn standardize(m: &mut DMatrix<f64>, mode: Standardization) -> Result<()> {
    match mode {
        Standardization::None => {
            ensure_not_empty(m)?;
            Ok(())
        }
        Standardization::Center => center(m),
        Standardization::StandardScale => standard_scale(m).map(|_| ()),
    }
}

/// Standardized copy of `m`.
///
/// # Errors
///
/// Returns an error if `m` is empty.
pub fn standardized(m: &DMatrix<f64>, mode: Standardization) -> Result<DMatrix<f64>> {
    let mut out = m.clone();
    standardize(&mut out, mode)?;
    Ok(out)
}

/// Subtract each row's mean.
///
/// # Errors
///
/// Returns an error if `m` is empty.
pub fn center(m: &mut DMatrix<f64>) -> Result<()> {
    ensure_not_empty(m)?;
    for mut row in m.row_iter_mut() {
        let mu = row.mean();
        row.add_scalar_mut(-mu);
    }
    Ok(())
}

/// Z-score each row and return the per-row scale that was divided out.
///
/// Rows whose variance is within machine epsilon of zero use a scale of 1.
///
/// # Errors
///
/// Returns an error if `m` is empty.
pub fn standard_scale(m: &mut DMatrix<f64>) -> Result<DVector<f64>> {
    ensure_not_empty(m)?;
    let cols = m.ncols() as f64;
    let mut scale = DVector::zeros(m.nrows());
    for (i, mut row) in m.row_iter_mut().enumerate() {
        let mu = row.sum() / cols;
        let var = row.iter().map(|v| v * v).sum::<f64>() / cols - mu * mu;
        let s = if var.abs() <= f64::EPSILON { 1.0 } else { var.sqrt() };
        row.apply(|v| *v = (*v - mu) / s);
        scale[i] = s;
    }
    Ok(scale)
}

// ============================================================================
// Validation
// ============================================================================

/// `true` when the matrix has at least one element.
#[must_use]
pub fn is_not_empty(m: &DMatrix<f64>) -> bool {
    !m.is_empty()
}

/// `true` when the matrix is non-empty and square.
#[must_use]
pub fn is_square(m: &DMatrix<f64>) -> bool {
    is_not_empty(m) && m.is_square()
}

/// `true` when `a` is non-empty and both have the same shape.
#[must_use]
pub fn have_same_size(a: &DMatrix<f64>, b: &DMatrix<f64>) -> bool {
    is_not_empty(a) && a.shape() == b.shape()
}

/// `true` when the collection is non-empty and every matrix is non-empty.
#[must_use]
pub fn are_not_empty(matrices: &[DMatrix<f64>]) -> bool {
    !matrices.is_empty() && matrices.iter().all(is_not_empty)
}

/// `true` when the collection is non-empty and every matrix is square.
#[must_use]
pub fn are_square(matrices: &[DMatrix<f64>]) -> bool {
    !matrices.is_empty() && matrices.iter().all(is_square)
}

/// `true` when the collection is non-empty and every matrix has the shape
/// of the first.
#[must_use]
pub fn all_same_size(matrices: &[DMatrix<f64>]) -> bool {
    matrices
        .first()
        .is_some_and(|first| matrices.iter().all(|m| m.shape() == first.shape()))
}

/// `min <= value <= max`.
#[must_use]
pub fn in_range(value: f64, min: f64, max: f64) -> bool {
    min <= value && value <= max
}

/// Approximate equality relative to the smaller Frobenius norm.
///
/// Two matrices are equal when they have the same shape and are either
/// both empty or satisfy `‖a − b‖ ≤ precision · min(‖a‖, ‖b‖)`.
#[must_use]
pub fn are_equals(a: &DMatrix<f64>, b: &DMatrix<f64>, precision: f64) -> bool {
    if a.shape() != b.shape() {
        return false;
    }
    if a.is_empty() {
        return true;
    }
    (a - b).norm() <= precision * a.norm().min(b.norm())
}

pub(crate) fn ensure_not_empty(m: &DMatrix<f64>) -> Result<()> {
    if m.is_empty() {
        Err(GeometryError::empty("matrix"))
    } else {
        Ok(())
    }
}

pub(crate) fn ensure_square(m: &DMatrix<f64>) -> Result<()> {
    ensure_not_empty(m)?;
    if m.is_square() {
        Ok(())
    } else {
        Err(GeometryError::not_square(m.nrows(), m.ncols()))
    }
}

pub(crate) fn ensure_same_size(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<()> {
    if a.shape() == b.shape() {
        Ok(())
    } else {
        Err(GeometryError::shape_mismatch(a.shape(), b.shape()))
    }
}

/// Check that a collection is non-empty, square and uniformly sized, and
/// return the common side length.
pub(crate) fn ensure_square_set(matrices: &[DMatrix<f64>]) -> Result<usize> {
    let first = matrices
        .first()
        .ok_or_else(|| GeometryError::empty("matrix set"))?;
    ensure_square(first)?;
    for m in matrices {
        ensure_same_size(first, m)?;
    }
    Ok(first.nrows())
}

// ============================================================================
// Transformations
// ============================================================================

/// Congruence `t · m · tᵀ`.
#[must_use]
pub fn congruence(t: &DMatrix<f64>, m: &DMatrix<f64>) -> DMatrix<f64> {
    t * m * t.transpose()
}

/// Re-center `m` on `reference`: `R^(-1/2) · m · R^(-1/2)ᵀ`.
///
/// # Errors
///
/// Returns an error if `reference` is not positive definite or the shapes
/// differ.
pub fn affine_transformation(reference: &DMatrix<f64>, m: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    ensure_same_size(reference, m)?;
    let isr = linalg::inv_sqrtm(reference)?;
    Ok(congruence(&isr, m))
}

/// Flatten a class-indexed dataset into a single trial list.
#[must_use]
pub fn flatten_dataset(dataset: &[Vec<DMatrix<f64>>]) -> Vec<DMatrix<f64>> {
    dataset.iter().flatten().cloned().collect()
}

/// Select the entries of `row` at `indices`.
///
/// # Errors
///
/// Returns an error if an index is out of bounds.
pub fn get_elements(row: &DVector<f64>, indices: &[usize]) -> Result<DVector<f64>> {
    indices
        .iter()
        .map(|&i| {
            row.get(i).copied().ok_or_else(|| {
                GeometryError::invalid_parameter(format!("index {i} out of {}", row.len()))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(DVector::from_vec)
}

// ============================================================================
// Text helpers
// ============================================================================

/// Split a line on `sep`. The final token loses its trailing newline.
#[must_use]
pub fn split(line: &str, sep: &str) -> Vec<String> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    if sep.is_empty() {
        return vec![line.to_string()];
    }
    line.split(sep).map(str::to_string).collect()
}

/// Parse the numeric tokens of `text`, separated by `sep` or whitespace
/// when `sep` is `None`. Empty tokens are skipped.
///
/// # Errors
///
/// Returns an error on the first token that is not a number.
pub fn parse_values(text: &str, sep: Option<&str>) -> Result<Vec<f64>> {
    let parse = |token: &str| {
        token
            .parse::<f64>()
            .map_err(|_| GeometryError::persistence(format!("invalid number '{token}'")))
    };
    match sep {
        Some(sep) if !sep.is_empty() => text
            .split(sep)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(parse)
            .collect(),
        _ => text.split_whitespace().map(parse).collect(),
    }
}

/// Multi-line text rendering of a matrix, one row per line.
#[must_use]
pub fn matrix_print(m: &DMatrix<f64>) -> String {
    m.row_iter()
        .map(|row| {
            row.iter()
                .map(|v| format!("{v:>12.6}"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
