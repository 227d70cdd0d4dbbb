//! Error types for SPD geometry operations.
//!
//! Every fallible operation in the crate returns [`Result`]. An `Err` always
//! means the input was rejected and no state was mutated.

use thiserror::Error;

/// Main error type for covariance, geometry and classifier operations.
#[derive(Error, Debug)]
pub enum GeometryError {
    /// An input matrix or collection was empty.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// A matrix that must be square is not.
    #[error("Matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    /// Two shapes that must agree do not.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// A scalar parameter is out of its valid range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A matrix needed to be positive definite for a log, inverse or root.
    #[error("Matrix is not positive definite: {context}")]
    NotPositiveDefinite { context: String },

    /// Numerical computation resulted in NaN or Inf.
    #[error("Numerical instability: {context}")]
    NumericalInstability { context: String },

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A metric or estimator tag could not be parsed.
    #[error("Unknown {kind} tag: {value}")]
    UnknownTag { kind: &'static str, value: String },

    /// The model has not been trained yet.
    #[error("Model is not trained: {0}")]
    NotTrained(String),

    /// A class identifier is outside the trained classes.
    #[error("Invalid class id {id} for {count} classes")]
    InvalidClass { id: usize, count: usize },

    /// A persisted document is malformed or does not match the target.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Reading or writing a document failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for SPD geometry operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

impl GeometryError {
    /// Create an empty input error.
    #[must_use]
    pub fn empty(what: impl Into<String>) -> Self {
        Self::EmptyInput(what.into())
    }

    /// Create a non-square matrix error.
    #[must_use]
    pub const fn not_square(rows: usize, cols: usize) -> Self {
        Self::NotSquare { rows, cols }
    }

    /// Create a dimension mismatch error from two `rows x cols` shapes.
    #[must_use]
    pub fn shape_mismatch(expected: (usize, usize), actual: (usize, usize)) -> Self {
        Self::DimensionMismatch {
            expected: format!("{}x{}", expected.0, expected.1),
            actual: format!("{}x{}", actual.0, actual.1),
        }
    }

    /// Create a dimension mismatch error from free-form descriptions.
    #[must_use]
    pub fn dimension_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a not positive definite error.
    #[must_use]
    pub fn not_positive_definite(context: impl Into<String>) -> Self {
        Self::NotPositiveDefinite {
            context: context.into(),
        }
    }

    /// Create a numerical instability error.
    #[must_use]
    pub fn numerical_instability(context: impl Into<String>) -> Self {
        Self::NumericalInstability {
            context: context.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an unknown tag error.
    #[must_use]
    pub fn unknown_tag(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownTag {
            kind,
            value: value.into(),
        }
    }

    /// Create a not trained error.
    #[must_use]
    pub fn not_trained(what: impl Into<String>) -> Self {
        Self::NotTrained(what.into())
    }

    /// Create an invalid class error.
    #[must_use]
    pub const fn invalid_class(id: usize, count: usize) -> Self {
        Self::InvalidClass { id, count }
    }

    /// Create a persistence error.
    #[must_use]
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}
