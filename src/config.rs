//! Configuration for iterative geometry and artifact reconstruction.
//!
//! Tolerances and iteration limits are always passed explicitly. The structs
//! here carry the defaults and a few presets.
//!
//! # Example
//!
//! ```
//! use spd_geometry::{AsrConfig, IterationConfig};
//!
//! let iteration = IterationConfig::default();
//! assert_eq!(iteration.max_iterations, 50);
//!
//! let asr = AsrConfig::default().with_rejection_limit(3.0);
//! asr.validate()?;
//! # Ok::<(), spd_geometry::GeometryError>(())
//! ```

use crate::basics::Standardization;
use crate::covariance::Estimator;
use crate::error::{GeometryError, Result};

/// Stopping rule for fixed-point means, medians and geodesic flows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationConfig {
    /// Stop when the update norm (or the step size) falls below this value.
    pub tolerance: f64,

    /// Hard cap on iterations, bounding worst-case latency.
    pub max_iterations: usize,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 50,
        }
    }
}

impl IterationConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for offline analysis where accuracy matters more than time.
    #[must_use]
    pub const fn precise() -> Self {
        Self {
            tolerance: 1e-9,
            max_iterations: 200,
        }
    }

    /// Preset for per-epoch online updates.
    #[must_use]
    pub const fn realtime() -> Self {
        Self {
            tolerance: 1e-3,
            max_iterations: 20,
        }
    }

    /// Set the tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the iteration cap.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the tolerance is not positive and finite or the
    /// iteration cap is zero.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(GeometryError::invalid_config(
                "tolerance must be positive and finite",
            ));
        }
        if self.max_iterations == 0 {
            return Err(GeometryError::invalid_config(
                "max_iterations must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Parameters of the generalized Gaussian fit used to calibrate ASR
/// thresholds.
///
/// The fit searches shape parameters in `betas`, over windows of the sorted
/// data spanning between `min_clean_fraction` and the full quantile range,
/// and keeps the candidate with the lowest KL divergence.
#[derive(Debug, Clone, PartialEq)]
pub struct FitDistributionConfig {
    /// Candidate shape parameters.
    pub betas: Vec<f64>,

    /// Lower quantile of the search range.
    pub min_quantile: f64,

    /// Upper quantile of the search range.
    pub max_quantile: f64,

    /// Minimum fraction of data assumed clean.
    pub min_clean_fraction: f64,

    /// Maximum fraction of data that may be dropped on the left.
    pub max_dropout_fraction: f64,

    /// Step of the window-offset search, as a fraction of the data.
    pub step_bound: f64,

    /// Step of the window-width search, as a fraction of the data.
    pub step_scale: f64,
}

impl Default for FitDistributionConfig {
    fn default() -> Self {
        Self {
            betas: crate::math::distribution::double_range(1.7, 3.5, 0.15),
            min_quantile: 0.022,
            max_quantile: 0.6,
            min_clean_fraction: 0.25,
            max_dropout_fraction: 0.1,
            step_bound: 0.01,
            step_scale: 0.01,
        }
    }
}

impl FitDistributionConfig {
    /// Set the quantile range.
    #[must_use]
    pub fn with_quantiles(mut self, min: f64, max: f64) -> Self {
        self.min_quantile = min;
        self.max_quantile = max;
        self
    }

    /// Set the candidate shape parameters.
    #[must_use]
    pub fn with_betas(mut self, betas: Vec<f64>) -> Self {
        self.betas = betas;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a fraction lies outside `[0, 1]`, the quantiles are
    /// not ordered, a step is not positive, or a shape parameter is not
    /// positive.
    pub fn validate(&self) -> Result<()> {
        if self.betas.is_empty() || self.betas.iter().any(|&b| !(b > 0.0)) {
            return Err(GeometryError::invalid_config(
                "betas must be a non-empty list of positive values",
            ));
        }
        if !(0.0..1.0).contains(&self.min_quantile)
            || !(0.0..=1.0).contains(&self.max_quantile)
            || self.min_quantile >= self.max_quantile
        {
            return Err(GeometryError::invalid_config(
                "quantiles must satisfy 0 <= min < max <= 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_clean_fraction)
            || !(0.0..=1.0).contains(&self.max_dropout_fraction)
        {
            return Err(GeometryError::invalid_config(
                "clean and dropout fractions must be in [0, 1]",
            ));
        }
        if self.step_bound <= 0.0 || self.step_scale <= 0.0 {
            return Err(GeometryError::invalid_config("steps must be positive"));
        }
        Ok(())
    }
}

/// Configuration for Artifact Subspace Reconstruction.
#[derive(Debug, Clone, PartialEq)]
pub struct AsrConfig {
    /// Threshold in standard deviations above the clean mean amplitude.
    pub rejection_limit: f64,

    /// Fraction of components that may be reconstructed in one window.
    pub max_channel_fraction: f64,

    /// Below this many calibration windows the threshold uses mean and
    /// standard deviation instead of the generalized Gaussian fit.
    pub min_fit_windows: usize,

    /// Estimator for per-window covariances.
    pub estimator: Estimator,

    /// Standardization applied before covariance estimation.
    pub standardization: Standardization,

    /// Stopping rule for the calibration median.
    pub iteration: IterationConfig,

    /// Generalized Gaussian fit parameters.
    pub fit: FitDistributionConfig,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            rejection_limit: 5.0,
            max_channel_fraction: 1.0,
            min_fit_windows: 40,
            estimator: Estimator::Cov,
            standardization: Standardization::Center,
            iteration: IterationConfig::default(),
            fit: FitDistributionConfig::default(),
        }
    }
}

impl AsrConfig {
    /// Preset reconstructing at most two thirds of the components, which
    /// keeps some original signal even in heavily contaminated windows.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            max_channel_fraction: 0.66,
            rejection_limit: 10.0,
            ..Self::default()
        }
    }

    /// Set the rejection limit.
    #[must_use]
    pub fn with_rejection_limit(mut self, limit: f64) -> Self {
        self.rejection_limit = limit;
        self
    }

    /// Set the reconstructable fraction of components.
    #[must_use]
    pub fn with_max_channel_fraction(mut self, fraction: f64) -> Self {
        self.max_channel_fraction = fraction;
        self
    }

    /// Set the minimum window count for the distribution fit.
    #[must_use]
    pub fn with_min_fit_windows(mut self, windows: usize) -> Self {
        self.min_fit_windows = windows;
        self
    }

    /// Set the iteration rule of the calibration median.
    #[must_use]
    pub fn with_iteration(mut self, iteration: IterationConfig) -> Self {
        self.iteration = iteration;
        self
    }

    /// Set the per-window covariance estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    #[must_use]
    pub fn with_standardization(mut self, standardization: Standardization) -> Self {
        self.standardization = standardization;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the rejection limit is not positive, the channel
    /// fraction lies outside `[0, 1]`, or a nested configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if !(self.rejection_limit.is_finite() && self.rejection_limit > 0.0) {
            return Err(GeometryError::invalid_config(
                "rejection_limit must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.max_channel_fraction) {
            return Err(GeometryError::invalid_config(
                "max_channel_fraction must be in [0, 1]",
            ));
        }
        self.iteration.validate()?;
        self.fit.validate()
    }
}
