//! Running re-centring transform.
//!
//! The bias `B` is a reference SPD matrix; applying it maps a sample `C` to
//! `B^-½ C B^-½`, so that samples near `B` land near the identity. After
//! calibration the bias is updated from every incoming sample: the first
//! update restarts it from that sample, later updates move it along the
//! geodesic by `1/n`.

use crate::basics::{are_equals, ensure_same_size, ensure_square, flatten_dataset, matrix_print};
use crate::config::IterationConfig;
use crate::error::{GeometryError, Result};
use crate::geodesic::geodesic;
use crate::math::linalg;
use crate::mean::mean_with;
use crate::metric::Metric;
use crate::persistence::{self, BiasData, BiasDocument, BiasElement};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::fmt;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Bias {
    bias: DMatrix<f64>,
    inv_sqrt: DMatrix<f64>,
    updates: usize,
    iteration: IterationConfig,
}

impl Default for Bias {
    fn default() -> Self {
        Self::new()
    }
}

impl Bias {
    /// An empty bias. It must be computed or set before use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bias: DMatrix::zeros(0, 0),
            inv_sqrt: DMatrix::zeros(0, 0),
            updates: 0,
            iteration: IterationConfig::default(),
        }
    }

    #[must_use]
    pub const fn with_iteration(mut self, iteration: IterationConfig) -> Self {
        self.iteration = iteration;
        self
    }

    /// Current bias matrix (empty before calibration).
    #[must_use]
    pub const fn bias(&self) -> &DMatrix<f64> {
        &self.bias
    }

    /// `B^-½`.
    #[must_use]
    pub const fn inv_sqrt(&self) -> &DMatrix<f64> {
        &self.inv_sqrt
    }

    /// Samples folded in since the last calibration.
    #[must_use]
    pub const fn update_count(&self) -> usize {
        self.updates
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        !self.bias.is_empty()
    }

    /// Calibrate on every trial of a per-class dataset.
    ///
    /// # Errors
    ///
    /// See [`Bias::compute_flat`].
    pub fn compute(&mut self, dataset: &[Vec<DMatrix<f64>>], metric: Metric) -> Result<()> {
        self.compute_flat(&flatten_dataset(dataset), metric)
    }

    /// Calibrate on the mean of `trials` and reset the update counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the mean cannot be computed or is not positive
    /// definite. The bias is unchanged on error.
    pub fn compute_flat(&mut self, trials: &[DMatrix<f64>], metric: Metric) -> Result<()> {
        let bias = mean_with(trials, metric, &self.iteration)?;
        self.inv_sqrt = linalg::inv_sqrtm(&bias)?;
        self.bias = bias;
        self.updates = 0;
        debug!(trials = trials.len(), %metric, "computed bias");
        Ok(())
    }

    /// Replace the bias matrix, keeping the update counter.
    ///
    /// # Errors
    ///
    /// Returns an error if `bias` is not square or not positive definite.
    pub fn set_bias(&mut self, bias: DMatrix<f64>) -> Result<()> {
        ensure_square(&bias)?;
        self.inv_sqrt = linalg::inv_sqrtm(&bias)?;
        self.bias = bias;
        Ok(())
    }

    fn ensure_applicable(&self, sample: &DMatrix<f64>) -> Result<()> {
        if !self.is_computed() {
            return Err(GeometryError::not_trained("bias"));
        }
        ensure_square(sample)?;
        ensure_same_size(&self.bias, sample)
    }

    /// `B^-½ · sample · B^-½`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bias is not computed or sizes differ.
    pub fn apply(&self, sample: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.ensure_applicable(sample)?;
        Ok(linalg::symmetrize(&(&self.inv_sqrt * sample * self.inv_sqrt.transpose())))
    }

    /// [`Bias::apply`] on every trial.
    ///
    /// # Errors
    ///
    /// Returns the first error met.
    pub fn apply_all(&self, trials: &[DMatrix<f64>]) -> Result<Vec<DMatrix<f64>>> {
        trials.par_iter().map(|t| self.apply(t)).collect()
    }

    /// [`Bias::apply`] on every trial of every class.
    ///
    /// # Errors
    ///
    /// Returns the first error met.
    pub fn apply_dataset(&self, dataset: &[Vec<DMatrix<f64>>]) -> Result<Vec<Vec<DMatrix<f64>>>> {
        dataset.iter().map(|class| self.apply_all(class)).collect()
    }

    /// The bias after folding in `sample`, leaving `self` untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the bias is not computed, the sizes differ or the
    /// new bias is not positive definite.
    pub fn updated(&self, sample: &DMatrix<f64>, metric: Metric) -> Result<Self> {
        self.ensure_applicable(sample)?;
        let updates = self.updates + 1;
        let bias = if updates == 1 {
            sample.clone()
        } else {
            geodesic(&self.bias, sample, 1.0 / updates as f64, metric)?
        };
        Ok(Self {
            inv_sqrt: linalg::inv_sqrtm(&bias)?,
            bias,
            updates,
            iteration: self.iteration,
        })
    }

    /// Fold `sample` into the bias.
    ///
    /// # Errors
    ///
    /// See [`Bias::updated`]. The bias is unchanged on error.
    pub fn update(&mut self, sample: &DMatrix<f64>, metric: Metric) -> Result<()> {
        *self = self.updated(sample, metric)?;
        Ok(())
    }

    /// Same bias within `precision` and same update count.
    #[must_use]
    pub fn is_equal(&self, other: &Self, precision: f64) -> bool {
        self.updates == other.updates && are_equals(&self.bias, &other.bias, precision)
    }

    pub(crate) fn to_element(&self) -> BiasElement {
        let (size, values) = persistence::encode_matrix(&self.bias);
        BiasElement {
            n: self.updates,
            size,
            values,
        }
    }

    pub(crate) fn restored(&self, element: &BiasElement) -> Result<Self> {
        let bias = persistence::decode_matrix(element.size, &element.values)?;
        let inv_sqrt = if bias.is_empty() {
            DMatrix::zeros(0, 0)
        } else {
            linalg::inv_sqrtm(&bias)?
        };
        Ok(Self {
            bias,
            inv_sqrt,
            updates: element.n,
            iteration: self.iteration,
        })
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_xml(&self) -> Result<String> {
        let doc = BiasDocument {
            data: BiasData {
                bias: self.to_element(),
            },
        };
        persistence::to_xml("Bias", &doc)
    }

    /// # Errors
    ///
    /// Returns an error if the document is malformed or the stored bias is
    /// not positive definite. The bias is unchanged on error.
    pub fn load_xml_str(&mut self, xml: &str) -> Result<()> {
        let doc: BiasDocument = persistence::from_xml(xml)?;
        *self = self.restored(&doc.data.bias)?;
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

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Number of Classification : {}", self.updates)?;
        write!(f, "Bias Matrix : ")?;
        if self.bias.is_empty() {
            writeln!(f, "Not Computed")
        } else {
            writeln!(f, "\n{}", matrix_print(&self.bias))
        }
    }
}
