//! Minimum-distance-to-mean classifiers over SPD matrices.
//!
//! - [`MdmClassifier`]: one mean per class, nearest mean wins, optional
//!   online adaptation of the means.
//! - [`MdmRebiasClassifier`]: an [`MdmClassifier`] fed with samples
//!   re-centred by a running [`Bias`].
//!
//! Both implement [`MatrixClassifier`], so a pipeline can hold either one
//! behind `Box<dyn MatrixClassifier>`.

pub mod bias;
pub mod mdm;
pub mod mdm_rebias;

pub use bias::Bias;
pub use mdm::MdmClassifier;
pub use mdm_rebias::MdmRebiasClassifier;

use crate::error::Result;
use crate::metric::Metric;
use crate::persistence;
use nalgebra::DMatrix;
use std::fmt;
use std::path::Path;

/// Online update requested together with a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Adaptation {
    /// Leave the model untouched.
    #[default]
    None,
    /// Move the mean of the given (true) class toward the sample.
    Supervised(usize),
    /// Move the mean of the predicted class toward the sample.
    Unsupervised,
}

/// Outcome of classifying one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Index of the nearest class mean.
    pub class_id: usize,
    /// Distance from the sample to every class mean, in class order.
    pub distances: Vec<f64>,
    /// Class probabilities, in class order, summing to 1.
    pub probabilities: Vec<f64>,
}

/// Capability shared by every trainable matrix classifier.
pub trait MatrixClassifier: fmt::Display + Send {
    /// Type tag written to the `type` attribute of saved documents.
    fn kind(&self) -> &'static str;

    /// Metric used for class means and sample distances.
    fn metric(&self) -> Metric;

    /// Number of classes, zero before training.
    fn class_count(&self) -> usize;

    /// Train on a dataset of SPD matrices, one `Vec` per class.
    ///
    /// # Errors
    ///
    /// Returns an error if the dataset is empty, a class has no trial, the
    /// matrices do not share one square size, or a mean cannot be computed.
    /// The classifier is unchanged on error.
    fn train(&mut self, dataset: &[Vec<DMatrix<f64>>]) -> Result<()>;

    /// Classify one SPD matrix and apply the requested adaptation.
    ///
    /// # Errors
    ///
    /// Returns an error if the classifier is untrained, the sample size does
    /// not match the class means, or a supervised class id is out of range.
    /// The classifier is unchanged on error.
    fn classify(&mut self, sample: &DMatrix<f64>, adaptation: Adaptation) -> Result<Classification>;

    /// Predicted class id only.
    ///
    /// # Errors
    ///
    /// See [`MatrixClassifier::classify`].
    fn classify_id(&mut self, sample: &DMatrix<f64>, adaptation: Adaptation) -> Result<usize> {
        Ok(self.classify(sample, adaptation)?.class_id)
    }

    /// Serialize the trained state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn to_xml(&self) -> Result<String>;

    /// Replace the state with the one described by `xml`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed, of another type, or
    /// inconsistent. The classifier is unchanged on error.
    fn load_xml_str(&mut self, xml: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    fn save_xml(&self, path: &Path) -> Result<()> {
        persistence::write_file(path, &self.to_xml()?)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or
    /// [`MatrixClassifier::load_xml_str`] rejects it.
    fn load_xml(&mut self, path: &Path) -> Result<()> {
        let xml = persistence::read_file(path)?;
        self.load_xml_str(&xml)
    }

    /// Same metric, class count and state within `precision`.
    fn is_equal(&self, other: &Self, precision: f64) -> bool
    where
        Self: Sized;
}

/// Inverse-distance probabilities: `p_k ∝ d_min / d_k`.
///
/// When some distances are zero, those classes share the whole probability
/// mass equally.
#[must_use]
pub fn probabilities_from_distances(distances: &[f64]) -> Vec<f64> {
    if distances.is_empty() {
        return Vec::new();
    }
    let min = distances.iter().copied().fold(f64::INFINITY, f64::min);
    if min <= f64::EPSILON {
        let zeros = distances.iter().filter(|&&d| d <= f64::EPSILON).count() as f64;
        return distances
            .iter()
            .map(|&d| if d <= f64::EPSILON { 1.0 / zeros } else { 0.0 })
            .collect();
    }
    let raw: Vec<f64> = distances.iter().map(|&d| min / d).collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|p| p / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_probabilities_favor_nearest() {
        let p = probabilities_from_distances(&[1.0, 2.0, 4.0]);
        assert_relative_eq!(p.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(p[0] > p[1] && p[1] > p[2]);
        assert_relative_eq!(p[0] / p[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_probabilities_with_zero_distance() {
        assert_eq!(probabilities_from_distances(&[0.0, 3.0]), vec![1.0, 0.0]);
        assert_eq!(probabilities_from_distances(&[0.0, 3.0, 0.0]), vec![0.5, 0.0, 0.5]);
        assert!(probabilities_from_distances(&[]).is_empty());
    }

    #[test]
    fn test_adaptation_default() {
        assert_eq!(Adaptation::default(), Adaptation::None);
    }
}
