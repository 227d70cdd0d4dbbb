//! Numerical building blocks.
//!
//! This module provides:
//! - [`linalg`]: spectral matrix functions (square root, log, exp, powers)
//! - [`distribution`]: generalized Gaussian fit of clean amplitudes

pub mod distribution;
pub mod linalg;

pub use distribution::{fit_distribution, FittedDistribution};
pub use linalg::{expm, inv_sqrtm, logm, powm, sqrtm};
