//! SPD Geometry Library
//!
//! Covariance-matrix geometry for brain-computer-interface pipelines.
//!
//! This library turns multichannel signal epochs into symmetric positive
//! definite (SPD) covariance matrices and works with them on the SPD
//! manifold: distances, means, medians and geodesics under several metrics,
//! tangent-space features, minimum-distance-to-mean classification and
//! artifact subspace reconstruction.
//!
//! # Features
//!
//! - **Covariance estimators**: sample covariance, trace-normalized SCM,
//!   Ledoit-Wolf and OAS shrinkage, correlation
//! - **Metrics**: Riemann, Euclidean, log-Euclidean, log-det, Kullback,
//!   Wasserstein, harmonic, ALE and a degenerate identity metric
//! - **Classifiers**: MDM with online adaptation and an MDM variant that
//!   re-centres samples with a running bias
//! - **ASR**: calibration on clean windows, reconstruction of artifactual
//!   components
//! - **Persistence**: XML documents for every trained model
//!
//! # Quick Start
//!
//! ```
//! use spd_geometry::{
//!     covariance_matrix, Adaptation, Estimator, MatrixClassifier, MdmRebiasClassifier, Metric,
//!     Standardization,
//! };
//! use nalgebra::DMatrix;
//!
//! let epoch = |scale: f64, phase: f64| {
//!     DMatrix::from_fn(3, 128, |c, s| scale * ((s as f64 * 0.3 + phase) * (c + 1) as f64).sin())
//! };
//! let cov = |e: &DMatrix<f64>| covariance_matrix(e, Estimator::Lwf, Standardization::Center);
//!
//! let class_a = (0..4).map(|i| cov(&epoch(1.0, i as f64))).collect::<Result<Vec<_>, _>>()?;
//! let class_b = (0..4).map(|i| cov(&epoch(3.0, i as f64))).collect::<Result<Vec<_>, _>>()?;
//!
//! let mut classifier = MdmRebiasClassifier::new(Metric::Riemann);
//! classifier.train(&[class_a, class_b])?;
//!
//! let result = classifier.classify(&cov(&epoch(1.0, 0.5))?, Adaptation::None)?;
//! assert_eq!(result.probabilities.len(), 2);
//! # Ok::<(), spd_geometry::GeometryError>(())
//! ```
//!
//! # Metric support
//!
//! | Metric | Distance | Mean | Geodesic | Median |
//! |--------|----------|------|----------|--------|
//! | Riemann | yes | iterative | yes | iterative |
//! | Euclidean | yes | closed form | yes | iterative |
//! | LogEuclidean | yes | closed form | yes | Euclidean |
//! | LogDet | yes | iterative | Riemann | Euclidean |
//! | Kullback | yes | closed form | Riemann | Euclidean |
//! | Wasserstein | yes | iterative | yes | Euclidean |
//! | Harmonic | yes | closed form | yes | Euclidean |
//! | ALE | Riemann | iterative | Riemann | Euclidean |
//! | Identity | constant 1 | identity | identity | identity |
//!
//! Fallbacks are reported by [`Metric`]'s `*_metric` methods and logged
//! through `tracing`.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod artifacts;
pub mod basics;
pub mod classifier;
pub mod config;
pub mod covariance;
pub mod distance;
pub mod error;
pub mod featurization;
pub mod geodesic;
pub mod math;
pub mod mean;
pub mod median;
pub mod metric;
mod persistence;

// Re-exports for convenient access
pub use artifacts::Asr;
pub use basics::{are_equals, standardize, Standardization};
pub use classifier::{
    Adaptation, Bias, Classification, MatrixClassifier, MdmClassifier, MdmRebiasClassifier,
};
pub use config::{AsrConfig, FitDistributionConfig, IterationConfig};
pub use covariance::{covariance_matrices, covariance_matrix, shrunk_covariance, Estimator};
pub use distance::distance;
pub use error::{GeometryError, Result};
pub use featurization::{
    squeeze_upper_triangle, tangent_space, un_tangent_space, unsqueeze_upper_triangle,
};
pub use geodesic::geodesic;
pub use mean::{mean, mean_with};
pub use median::{median, median_with};
pub use metric::Metric;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
