//! Minimum distance to mean.

use super::{probabilities_from_distances, Adaptation, Classification, MatrixClassifier};
use crate::basics::{are_equals, ensure_square, ensure_square_set, matrix_print};
use crate::config::IterationConfig;
use crate::distance::distance;
use crate::error::{GeometryError, Result};
use crate::geodesic::geodesic;
use crate::mean::mean_with;
use crate::metric::Metric;
use crate::persistence::{self, ClassElement, ClassifierData, ClassifierDocument};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::fmt;
use tracing::{debug, info};

/// Nearest-class-mean classifier.
///
/// # Example
///
/// ```
/// use nalgebra::DMatrix;
/// use spd_geometry::{Adaptation, MatrixClassifier, MdmClassifier, Metric};
///
/// let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 1.0]);
/// let b = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 3.0]);
///
/// let mut mdm = MdmClassifier::new(Metric::Riemann);
/// mdm.train(&[vec![a.clone()], vec![b]])?;
/// let result = mdm.classify(&a, Adaptation::None)?;
/// assert_eq!(result.class_id, 0);
/// # Ok::<(), spd_geometry::GeometryError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MdmClassifier {
    metric: Metric,
    means: Vec<DMatrix<f64>>,
    trials: Vec<usize>,
    iteration: IterationConfig,
}

impl Default for MdmClassifier {
    fn default() -> Self {
        Self::new(Metric::default())
    }
}

impl MdmClassifier {
    pub const KIND: &'static str = "MDM";

    #[must_use]
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            means: Vec::new(),
            trials: Vec::new(),
            iteration: IterationConfig::default(),
        }
    }

    /// Stopping rule used for the class means.
    #[must_use]
    pub const fn with_iteration(mut self, iteration: IterationConfig) -> Self {
        self.iteration = iteration;
        self
    }

    /// Resize to `count` classes. New classes have no mean yet.
    pub fn set_class_count(&mut self, count: usize) {
        self.means.resize(count, DMatrix::zeros(0, 0));
        self.trials.resize(count, 0);
    }

    pub fn set_metric(&mut self, metric: Metric) {
        self.metric = metric;
    }

    #[must_use]
    pub fn means(&self) -> &[DMatrix<f64>] {
        &self.means
    }

    /// Number of trials folded into each class mean.
    #[must_use]
    pub fn trials(&self) -> &[usize] {
        &self.trials
    }

    #[must_use]
    pub const fn iteration(&self) -> &IterationConfig {
        &self.iteration
    }

    /// Size of the class means, or an error when any of them is missing.
    fn trained_size(&self) -> Result<usize> {
        if self.means.is_empty() || self.means.iter().any(|m| m.is_empty()) {
            return Err(GeometryError::not_trained("MDM class means"));
        }
        Ok(self.means[0].nrows())
    }

    pub(crate) fn to_document(&self, kind: &str) -> ClassifierDocument {
        let classes = self
            .means
            .iter()
            .zip(&self.trials)
            .enumerate()
            .map(|(class_id, (mean, &nb_trials))| {
                let (size, values) = persistence::encode_matrix(mean);
                ClassElement {
                    class_id,
                    nb_trials,
                    size,
                    values,
                }
            })
            .collect();
        ClassifierDocument {
            data: ClassifierData {
                kind: kind.to_string(),
                class_count: self.class_count(),
                metric: self.metric.as_str().to_string(),
                bias: None,
                classes,
            },
        }
    }

    /// Build a classifier from the `<Classifier-data>` of a document.
    pub(crate) fn restored(&self, data: &ClassifierData, kind: &str) -> Result<Self> {
        if data.kind != kind {
            return Err(GeometryError::persistence(format!(
                "expected a {kind} classifier, found {}",
                data.kind
            )));
        }
        let metric: Metric = data.metric.parse()?;
        if data.classes.len() != data.class_count {
            return Err(GeometryError::persistence(format!(
                "class-count is {} but {} classes are stored",
                data.class_count,
                data.classes.len()
            )));
        }
        let mut means = Vec::with_capacity(data.class_count);
        let mut trials = Vec::with_capacity(data.class_count);
        for (k, class) in data.classes.iter().enumerate() {
            if class.class_id != k {
                return Err(GeometryError::persistence(format!(
                    "class {k} stored with id {}",
                    class.class_id
                )));
            }
            means.push(persistence::decode_matrix(class.size, &class.values)?);
            trials.push(class.nb_trials);
        }
        if means.iter().any(|m| m.nrows() != means[0].nrows()) {
            return Err(GeometryError::persistence("class means differ in size"));
        }
        Ok(Self {
            metric,
            means,
            trials,
            iteration: self.iteration,
        })
    }

    pub(crate) fn write_classes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, (mean, trials)) in self.means.iter().zip(&self.trials).enumerate() {
            write!(f, "Mean of class {k} ({trials} trials): ")?;
            if mean.is_empty() {
                writeln!(f, "Not Computed")?;
            } else {
                writeln!(f, "\n{}", matrix_print(mean))?;
            }
        }
        Ok(())
    }
}

/// Header common to every classifier printout.
pub(crate) fn write_header(
    f: &mut fmt::Formatter<'_>,
    kind: &str,
    metric: Metric,
    class_count: usize,
) -> fmt::Result {
    writeln!(f, "{kind} Classifier")?;
    writeln!(f, "Metric : {metric}")?;
    writeln!(f, "Number of Classes : {class_count}")
}

impl MatrixClassifier for MdmClassifier {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn class_count(&self) -> usize {
        self.means.len()
    }

    fn train(&mut self, dataset: &[Vec<DMatrix<f64>>]) -> Result<()> {
        if dataset.is_empty() {
            return Err(GeometryError::empty("training dataset"));
        }
        let mut size = None;
        for (k, trials) in dataset.iter().enumerate() {
            if trials.is_empty() {
                return Err(GeometryError::empty(format!("class {k} of the training dataset")));
            }
            let n = ensure_square_set(trials)?;
            let expected = *size.get_or_insert(n);
            if expected != n {
                return Err(GeometryError::shape_mismatch((expected, expected), (n, n)));
            }
        }

        let (metric, iteration) = (self.metric, self.iteration);
        let means = dataset
            .par_iter()
            .map(|trials| mean_with(trials, metric, &iteration))
            .collect::<Result<Vec<_>>>()?;

        self.trials = dataset.iter().map(Vec::len).collect();
        self.means = means;
        info!(
            classes = self.means.len(),
            metric = %self.metric,
            trials = ?self.trials,
            "trained MDM classifier"
        );
        Ok(())
    }

    fn classify(&mut self, sample: &DMatrix<f64>, adaptation: Adaptation) -> Result<Classification> {
        ensure_square(sample)?;
        let n = self.trained_size()?;
        if sample.nrows() != n {
            return Err(GeometryError::shape_mismatch((n, n), (sample.nrows(), sample.ncols())));
        }
        if let Adaptation::Supervised(id) = adaptation {
            if id >= self.class_count() {
                return Err(GeometryError::invalid_class(id, self.class_count()));
            }
        }

        let distances = self
            .means
            .iter()
            .map(|mean| distance(sample, mean, self.metric))
            .collect::<Result<Vec<_>>>()?;
        let class_id = distances
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(k, _)| k);
        let probabilities = probabilities_from_distances(&distances);

        let target = match adaptation {
            Adaptation::None => None,
            Adaptation::Supervised(id) => Some(id),
            Adaptation::Unsupervised => Some(class_id),
        };
        if let Some(id) = target {
            let count = self.trials[id] + 1;
            let moved = geodesic(&self.means[id], sample, 1.0 / count as f64, self.metric)?;
            self.means[id] = moved;
            self.trials[id] = count;
            debug!(class = id, trials = count, "adapted class mean");
        }

        Ok(Classification {
            class_id,
            distances,
            probabilities,
        })
    }

    fn to_xml(&self) -> Result<String> {
        persistence::to_xml("Classifier", &self.to_document(Self::KIND))
    }

    fn load_xml_str(&mut self, xml: &str) -> Result<()> {
        let doc: ClassifierDocument = persistence::from_xml(xml)?;
        *self = self.restored(&doc.data, Self::KIND)?;
        Ok(())
    }

    fn is_equal(&self, other: &Self, precision: f64) -> bool {
        self.metric == other.metric
            && self.class_count() == other.class_count()
            && self.trials == other.trials
            && self
                .means
                .iter()
                .zip(&other.means)
                .all(|(a, b)| are_equals(a, b, precision))
    }
}

impl fmt::Display for MdmClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_header(f, Self::KIND, self.metric, self.class_count())?;
        self.write_classes(f)
    }
}
