//! Artifact Subspace Reconstruction.
//!
//! Calibration learns a reference from clean windows: the geometric median
//! `C₀` of their covariances, the mixing matrix `M = C₀^½`, its eigenbasis
//! `V` and, per component, an amplitude threshold `μ + k·σ` of the clean RMS
//! distribution. The threshold matrix is `T = diag(μ + k·σ) · Vᵀ`.
//!
//! Processing decomposes the covariance of an incoming window as
//! `V' D V'ᵀ`. Component `c` is artifactual when its variance `D_c` reaches
//! the squared threshold `Σᵢ (T V')²ᵢ꜀` projected on it. Windows without
//! artifactual components pass through unchanged; otherwise the window is
//! rebuilt as `R · X` with `R = M · pinv(keep ⊙ V'ᵀ M) · V'ᵀ`, which
//! re-estimates the rejected components from the kept ones.
//!
//! Eigenvectors are always computed in the Euclidean sense, even when the
//! calibration median is Riemannian. [`Asr::eigen_metric`] reports this.

use crate::basics::{
    are_equals, ensure_not_empty, ensure_square, matrix_print, standardized, Standardization,
};
use crate::config::AsrConfig;
use crate::covariance::{covariance_matrices, covariance_matrix};
use crate::error::{GeometryError, Result};
use crate::math::distribution::fit_distribution;
use crate::math::linalg;
use crate::median::median_with;
use crate::metric::Metric;
use crate::persistence::{self, AsrData, AsrDocument};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// Trained artifact remover for `channels x samples` windows.
///
/// # Example
///
/// ```
/// use nalgebra::DMatrix;
/// use spd_geometry::{Asr, AsrConfig, Metric};
///
/// let clean: Vec<DMatrix<f64>> = (0..10)
///     .map(|w| DMatrix::from_fn(2, 64, |c, s| (((w * 64 + s) * (c + 3)) as f64 * 0.7).sin()))
///     .collect();
/// let mut asr = Asr::trained(Metric::Euclidean, &clean, AsrConfig::default())?;
/// let out = asr.process(&clean[0])?;
/// assert_eq!(out.shape(), clean[0].shape());
/// # Ok::<(), spd_geometry::GeometryError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Asr {
    metric: Metric,
    config: AsrConfig,
    channels: usize,
    trivial: bool,
    median: DMatrix<f64>,
    mixing: DMatrix<f64>,
    threshold: DMatrix<f64>,
    reconstruction: DMatrix<f64>,
    covariance: DMatrix<f64>,
}

impl Default for Asr {
    fn default() -> Self {
        Self::new(Metric::Euclidean)
    }
}

impl Asr {
    /// Untrained instance. Metrics other than Riemann become Euclidean.
    #[must_use]
    pub fn new(metric: Metric) -> Self {
        let empty = DMatrix::zeros(0, 0);
        Self {
            metric: metric.asr_metric(),
            config: AsrConfig::default(),
            channels: 0,
            trivial: true,
            median: empty.clone(),
            mixing: empty.clone(),
            threshold: empty.clone(),
            reconstruction: empty.clone(),
            covariance: empty,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: AsrConfig) -> Self {
        self.config = config;
        self
    }

    /// Build and calibrate in one step.
    ///
    /// # Errors
    ///
    /// See [`Asr::train`].
    pub fn trained(metric: Metric, dataset: &[DMatrix<f64>], config: AsrConfig) -> Result<Self> {
        let limit = config.rejection_limit;
        let mut asr = Self::new(metric).with_config(config);
        asr.train(dataset, limit)?;
        Ok(asr)
    }

    #[must_use]
    pub const fn metric(&self) -> Metric {
        self.metric
    }

    /// Metric of the eigen-decompositions, always Euclidean.
    #[must_use]
    pub const fn eigen_metric(&self) -> Metric {
        Metric::Euclidean
    }

    #[must_use]
    pub const fn config(&self) -> &AsrConfig {
        &self.config
    }

    #[must_use]
    pub const fn channel_count(&self) -> usize {
        self.channels
    }

    /// Fraction of components that may be reconstructed.
    #[must_use]
    pub const fn max_channel(&self) -> f64 {
        self.config.max_channel_fraction
    }

    /// Whether the last processed window passed through unchanged.
    #[must_use]
    pub const fn is_trivial(&self) -> bool {
        self.trivial
    }

    /// Geometric median of the calibration covariances.
    #[must_use]
    pub const fn median(&self) -> &DMatrix<f64> {
        &self.median
    }

    #[must_use]
    pub const fn threshold(&self) -> &DMatrix<f64> {
        &self.threshold
    }

    /// Reconstruction matrix of the last processed window.
    #[must_use]
    pub const fn reconstruction(&self) -> &DMatrix<f64> {
        &self.reconstruction
    }

    /// Covariance of the last processed window.
    #[must_use]
    pub const fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    pub fn set_metric(&mut self, metric: Metric) {
        self.metric = metric.asr_metric();
    }

    /// # Errors
    ///
    /// Returns an error unless `fraction` lies in `[0, 1]`.
    pub fn set_max_channel(&mut self, fraction: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(GeometryError::invalid_parameter(format!(
                "max channel fraction must be in [0, 1], got {fraction}"
            )));
        }
        self.config.max_channel_fraction = fraction;
        Ok(())
    }

    /// Install a reference computed elsewhere. The reconstruction matrix
    /// defaults to the identity and the covariance to empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the matrices are not square and of one size.
    pub fn set_matrices(
        &mut self,
        median: DMatrix<f64>,
        threshold: DMatrix<f64>,
        reconstruction: Option<DMatrix<f64>>,
        covariance: Option<DMatrix<f64>>,
    ) -> Result<()> {
        ensure_square(&median)?;
        let n = median.nrows();
        let check_shape = |m: &DMatrix<f64>| {
            if m.shape() == (n, n) {
                Ok(())
            } else {
                Err(GeometryError::shape_mismatch((n, n), m.shape()))
            }
        };
        check_shape(&threshold)?;
        let reconstruction = reconstruction.unwrap_or_else(|| DMatrix::identity(n, n));
        check_shape(&reconstruction)?;
        let covariance = covariance.unwrap_or_else(|| DMatrix::zeros(0, 0));
        if !covariance.is_empty() {
            check_shape(&covariance)?;
        }
        self.mixing = linalg::sqrtm(&median)?;
        self.median = median;
        self.threshold = threshold;
        self.reconstruction = reconstruction;
        self.covariance = covariance;
        self.channels = n;
        self.trivial = true;
        Ok(())
    }

    /// Calibrate on clean `channels x samples` windows.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset is empty, windows differ in channel
    /// count, `rejection_limit` is not positive, or a covariance, the median
    /// or an eigen-decomposition fails. The instance is unchanged on error.
    pub fn train(&mut self, dataset: &[DMatrix<f64>], rejection_limit: f64) -> Result<()> {
        let config = self.config.clone().with_rejection_limit(rejection_limit);
        config.validate()?;
        let first = dataset
            .first()
            .ok_or_else(|| GeometryError::empty("calibration dataset"))?;
        ensure_not_empty(first)?;
        let n = first.nrows();
        if let Some(w) = dataset.iter().find(|w| w.nrows() != n || w.ncols() == 0) {
            return Err(GeometryError::dimension_mismatch(
                format!("{n} channels"),
                format!("{}x{} window", w.nrows(), w.ncols()),
            ));
        }
        if self.metric == Metric::Riemann {
            warn!("riemannian eigen-decomposition is not available, using euclidean eigenvectors");
        }

        let covs = covariance_matrices(dataset, config.estimator, config.standardization)?;
        let median = median_with(&covs, self.metric, &config.iteration)?;
        let mixing = linalg::sqrtm(&median)?;
        let (v, _) = linalg::sorted_eigen(&mixing)?;
        let vt = v.transpose();

        // rms[w][c]: RMS amplitude of component c in window w.
        let rms = dataset
            .par_iter()
            .map(|w| -> Result<Vec<f64>> {
                let y = &vt * standardized(w, Standardization::Center)?;
                let samples = y.ncols() as f64;
                Ok(y.row_iter().map(|r| (r.norm_squared() / samples).sqrt()).collect())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut limits = DVector::zeros(n);
        for c in 0..n {
            let values: Vec<f64> = rms.iter().map(|r| r[c]).collect();
            let (mu, sigma) = amplitude_stats(&values, &config);
            limits[c] = mu + config.rejection_limit * sigma;
        }

        self.threshold = DMatrix::from_diagonal(&limits) * vt;
        self.median = median;
        self.mixing = mixing;
        self.reconstruction = DMatrix::identity(n, n);
        self.covariance = DMatrix::zeros(0, 0);
        self.channels = n;
        self.trivial = true;
        self.config = config;
        info!(
            windows = dataset.len(),
            channels = n,
            metric = %self.metric,
            "calibrated ASR reference"
        );
        Ok(())
    }

    /// Clean one `channels x samples` window.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance is untrained, the channel count
    /// differs from the calibration, or a decomposition fails. The instance
    /// is unchanged on error.
    pub fn process(&mut self, window: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if self.channels == 0 {
            return Err(GeometryError::not_trained("ASR reference"));
        }
        ensure_not_empty(window)?;
        if window.nrows() != self.channels {
            return Err(GeometryError::dimension_mismatch(
                format!("{} channels", self.channels),
                format!("{} channels", window.nrows()),
            ));
        }

        let n = self.channels;
        let cov = covariance_matrix(window, self.config.estimator, self.config.standardization)?;
        let (v, d) = linalg::sorted_eigen(&cov)?;
        let max_dims = (n as f64 * self.config.max_channel_fraction).round() as usize;
        let forced = n.saturating_sub(max_dims);
        let projected = &self.threshold * &v;
        let keep: Vec<bool> = (0..n)
            .map(|c| d[c] < projected.column(c).norm_squared() || c < forced)
            .collect();

        let (reconstruction, trivial) = if keep.iter().all(|&k| k) {
            (DMatrix::identity(n, n), true)
        } else {
            let vt = v.transpose();
            let mut masked = &vt * &self.mixing;
            for (c, &k) in keep.iter().enumerate() {
                if !k {
                    masked.row_mut(c).fill(0.0);
                }
            }
            (&self.mixing * linalg::pinv(&masked)? * vt, false)
        };
        debug!(
            rejected = keep.iter().filter(|&&k| !k).count(),
            trivial, "processed window"
        );

        let out = if trivial {
            window.clone()
        } else {
            &reconstruction * window
        };
        self.reconstruction = reconstruction;
        self.covariance = cov;
        self.trivial = trivial;
        Ok(out)
    }

    /// Same reference, state and settings within `precision`.
    #[must_use]
    pub fn is_equal(&self, other: &Self, precision: f64) -> bool {
        self.metric == other.metric
            && self.channels == other.channels
            && self.trivial == other.trivial
            && (self.max_channel() - other.max_channel()).abs() <= precision
            && self.config.estimator == other.config.estimator
            && self.config.standardization == other.config.standardization
            && (self.config.rejection_limit - other.config.rejection_limit).abs() <= precision
            && are_equals(&self.median, &other.median, precision)
            && are_equals(&self.threshold, &other.threshold, precision)
            && are_equals(&self.reconstruction, &other.reconstruction, precision)
            && are_equals(&self.covariance, &other.covariance, precision)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_xml(&self) -> Result<String> {
        let doc = AsrDocument {
            data: AsrData {
                metric: self.metric.as_str().to_string(),
                channel_count: self.channels,
                max_channel: self.max_channel(),
                trivial: self.trivial,
                estimator: Some(self.config.estimator.as_str().to_string()),
                standardization: Some(self.config.standardization.as_str().to_string()),
                rejection_limit: Some(self.config.rejection_limit),
                median: persistence::matrix_element(&self.median),
                threshold: persistence::matrix_element(&self.threshold),
                reconstruction: persistence::matrix_element(&self.reconstruction),
                covariance: persistence::matrix_element(&self.covariance),
            },
        };
        persistence::to_xml("ASR", &doc)
    }

    /// # Errors
    ///
    /// Returns an error if the document is malformed or its matrices do
    /// not match the channel count. The instance is unchanged on error.
    ///
    /// The estimator, standardization and rejection limit are restored when
    /// present. The remaining calibration settings keep their current values.
    pub fn load_xml_str(&mut self, xml: &str) -> Result<()> {
        let doc: AsrDocument = persistence::from_xml(xml)?;
        let data = doc.data;
        let metric: Metric = data.metric.parse()?;
        let mut config = self.config.clone();
        if let Some(tag) = &data.estimator {
            config.estimator = tag.parse()?;
        }
        if let Some(tag) = &data.standardization {
            config.standardization = tag.parse()?;
        }
        if let Some(limit) = data.rejection_limit {
            config.rejection_limit = limit;
        }
        config.validate()?;
        let mut loaded = Self::new(metric).with_config(config);
        loaded.set_max_channel(data.max_channel)?;

        let median = persistence::from_matrix_element(&data.median)?;
        let threshold = persistence::from_matrix_element(&data.threshold)?;
        let reconstruction = persistence::from_matrix_element(&data.reconstruction)?;
        let covariance = persistence::from_matrix_element(&data.covariance)?;
        if median.nrows() != data.channel_count {
            return Err(GeometryError::persistence(format!(
                "channel-count is {} but the median is {}x{}",
                data.channel_count,
                median.nrows(),
                median.ncols()
            )));
        }
        if data.channel_count > 0 {
            let reconstruction = (!reconstruction.is_empty()).then_some(reconstruction);
            let covariance = (!covariance.is_empty()).then_some(covariance);
            loaded
                .set_matrices(median, threshold, reconstruction, covariance)
                .map_err(|e| GeometryError::persistence(format!("inconsistent ASR matrices: {e}")))?;
        }
        loaded.trivial = data.trivial;
        *self = loaded;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_xml(&self, path: &Path) -> Result<()> {
        persistence::write_file(path, &self.to_xml()?)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is rejected.
    pub fn load_xml(&mut self, path: &Path) -> Result<()> {
        let xml = persistence::read_file(path)?;
        self.load_xml_str(&xml)
    }
}

/// Location and spread of clean component amplitudes. The generalized
/// Gaussian fit needs enough windows; below that, or when it fails, plain
/// mean and standard deviation are used.
fn amplitude_stats(values: &[f64], config: &AsrConfig) -> (f64, f64) {
    if values.len() >= config.min_fit_windows {
        match fit_distribution(values, &config.fit) {
            Ok(fit) => return (fit.mu, fit.sigma),
            Err(e) => warn!(error = %e, "distribution fit failed, using mean and deviation"),
        }
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn write_matrix(f: &mut fmt::Formatter<'_>, name: &str, m: &DMatrix<f64>) -> fmt::Result {
    write!(f, "{name} Matrix : ")?;
    if m.is_empty() {
        writeln!(f, "Not Computed")
    } else {
        writeln!(f, "\n{}", matrix_print(m))
    }
}

impl fmt::Display for Asr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Metric : {}", self.metric)?;
        writeln!(f, "Channel Number : {}", self.channels)?;
        writeln!(f, "Maximum channel reconstruct : {}", self.max_channel())?;
        writeln!(f, "Last Reconstruction Trivial : {}", self.trivial)?;
        write_matrix(f, "Median", &self.median)?;
        write_matrix(f, "Threshold", &self.threshold)?;
        write_matrix(f, "Reconstruction", &self.reconstruction)?;
        write_matrix(f, "Covariance", &self.covariance)
    }
}
