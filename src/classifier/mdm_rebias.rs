//! MDM with a running re-centring bias.

use super::mdm::write_header;
use super::{Adaptation, Bias, Classification, MatrixClassifier, MdmClassifier};
use crate::config::IterationConfig;
use crate::error::{GeometryError, Result};
use crate::metric::Metric;
use crate::persistence::{self, ClassifierDocument};
use nalgebra::DMatrix;
use std::fmt;
use tracing::info;

/// An [`MdmClassifier`] trained and queried on bias-corrected samples.
///
/// Training computes the bias over every trial, re-centres the dataset and
/// trains the inner classifier on it. Each classification re-centres the
/// sample with the current bias, folds the raw sample into the bias and
/// classifies the re-centred one. The bias is only updated when the whole
/// classification succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct MdmRebiasClassifier {
    mdm: MdmClassifier,
    bias: Bias,
}

impl Default for MdmRebiasClassifier {
    fn default() -> Self {
        Self::new(Metric::default())
    }
}

impl MdmRebiasClassifier {
    pub const KIND: &'static str = "MDM Rebias";

    #[must_use]
    pub fn new(metric: Metric) -> Self {
        Self {
            mdm: MdmClassifier::new(metric),
            bias: Bias::new(),
        }
    }

    #[must_use]
    pub fn with_iteration(self, iteration: IterationConfig) -> Self {
        Self {
            mdm: self.mdm.with_iteration(iteration),
            bias: self.bias.with_iteration(iteration),
        }
    }

    /// The classifier working on re-centred samples.
    #[must_use]
    pub const fn mdm(&self) -> &MdmClassifier {
        &self.mdm
    }

    #[must_use]
    pub const fn bias(&self) -> &Bias {
        &self.bias
    }

    pub fn set_metric(&mut self, metric: Metric) {
        self.mdm.set_metric(metric);
    }
}

impl MatrixClassifier for MdmRebiasClassifier {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn metric(&self) -> Metric {
        self.mdm.metric()
    }

    fn class_count(&self) -> usize {
        self.mdm.class_count()
    }

    fn train(&mut self, dataset: &[Vec<DMatrix<f64>>]) -> Result<()> {
        let metric = self.metric();
        let mut bias = self.bias.clone();
        bias.compute(dataset, metric)?;
        let centred = bias.apply_dataset(dataset)?;
        let mut mdm = self.mdm.clone();
        mdm.train(&centred)?;

        self.mdm = mdm;
        self.bias = bias;
        info!(classes = self.class_count(), %metric, "trained MDM rebias classifier");
        Ok(())
    }

    fn classify(&mut self, sample: &DMatrix<f64>, adaptation: Adaptation) -> Result<Classification> {
        let centred = self.bias.apply(sample)?;
        let next_bias = self.bias.updated(sample, self.metric())?;
        let result = self.mdm.classify(&centred, adaptation)?;
        self.bias = next_bias;
        Ok(result)
    }

    fn to_xml(&self) -> Result<String> {
        let mut doc = self.mdm.to_document(Self::KIND);
        doc.data.bias = Some(self.bias.to_element());
        persistence::to_xml("Classifier", &doc)
    }

    fn load_xml_str(&mut self, xml: &str) -> Result<()> {
        let doc: ClassifierDocument = persistence::from_xml(xml)?;
        let mdm = self.mdm.restored(&doc.data, Self::KIND)?;
        let element = doc
            .data
            .bias
            .as_ref()
            .ok_or_else(|| GeometryError::persistence("missing Bias element"))?;
        let bias = self.bias.restored(element)?;
        self.mdm = mdm;
        self.bias = bias;
        Ok(())
    }

    fn is_equal(&self, other: &Self, precision: f64) -> bool {
        self.mdm.is_equal(&other.mdm, precision) && self.bias.is_equal(&other.bias, precision)
    }
}

impl fmt::Display for MdmRebiasClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_header(f, Self::KIND, self.metric(), self.class_count())?;
        write!(f, "{}", self.bias)?;
        self.mdm.write_classes(f)
    }
}
