//! XML documents for trained models.
//!
//! Matrices are stored as an element with a `size` attribute (the side
//! length N) whose text holds the N×N values in row-major order. Loading
//! always parses into fresh values first; a model is only replaced once the
//! whole document has been validated.

use crate::basics::parse_values;
use crate::error::{GeometryError, Result};
use nalgebra::DMatrix;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// One class of a minimum-distance classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClassElement {
    #[serde(rename = "@class-id")]
    pub class_id: usize,
    #[serde(rename = "@nb-trials")]
    pub nb_trials: usize,
    #[serde(rename = "@size")]
    pub size: usize,
    #[serde(rename = "$text", default)]
    pub values: String,
}

/// Running bias matrix with its update counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BiasElement {
    #[serde(rename = "@n")]
    pub n: usize,
    #[serde(rename = "@size")]
    pub size: usize,
    #[serde(rename = "$text", default)]
    pub values: String,
}

/// Plain matrix element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MatrixElement {
    #[serde(rename = "@size")]
    pub size: usize,
    #[serde(rename = "$text", default)]
    pub values: String,
}

/// Attributes and children of `<Classifier-data>`. Extension elements such
/// as `<Bias>` come before the `<Class>` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClassifierData {
    #[serde(rename = "@type")]
    pub kind: String,
    #[serde(rename = "@class-count")]
    pub class_count: usize,
    #[serde(rename = "@metric")]
    pub metric: String,
    #[serde(rename = "Bias", default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<BiasElement>,
    #[serde(rename = "Class", default)]
    pub classes: Vec<ClassElement>,
}

/// `<Classifier>` root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ClassifierDocument {
    #[serde(rename = "Classifier-data")]
    pub data: ClassifierData,
}

/// `<Bias>` root of a standalone bias document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BiasDocument {
    #[serde(rename = "Bias-data")]
    pub data: BiasData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BiasData {
    #[serde(rename = "Bias")]
    pub bias: BiasElement,
}

/// `<ASR>` root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AsrDocument {
    #[serde(rename = "ASR-data")]
    pub data: AsrData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AsrData {
    #[serde(rename = "@metric")]
    pub metric: String,
    #[serde(rename = "@channel-count")]
    pub channel_count: usize,
    #[serde(rename = "@max-channel")]
    pub max_channel: f64,
    #[serde(rename = "@trivial")]
    pub trivial: bool,
    #[serde(rename = "@estimator", default, skip_serializing_if = "Option::is_none")]
    pub estimator: Option<String>,
    #[serde(rename = "@standardization", default, skip_serializing_if = "Option::is_none")]
    pub standardization: Option<String>,
    #[serde(rename = "@rejection-limit", default, skip_serializing_if = "Option::is_none")]
    pub rejection_limit: Option<f64>,
    #[serde(rename = "Median")]
    pub median: MatrixElement,
    #[serde(rename = "Threshold")]
    pub threshold: MatrixElement,
    #[serde(rename = "Reconstruction")]
    pub reconstruction: MatrixElement,
    #[serde(rename = "Covariance")]
    pub covariance: MatrixElement,
}

/// Side length and row-major text of a square matrix.
pub(crate) fn encode_matrix(m: &DMatrix<f64>) -> (usize, String) {
    let text = m
        .row_iter()
        .flat_map(|row| row.iter().map(f64::to_string).collect::<Vec<_>>())
        .collect::<Vec<_>>()
        .join(" ");
    (m.nrows(), text)
}

/// Parse an N×N matrix. `size == 0` is the empty matrix.
pub(crate) fn decode_matrix(size: usize, text: &str) -> Result<DMatrix<f64>> {
    if size == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    let values = parse_values(text, None)?;
    if values.len() != size * size {
        return Err(GeometryError::persistence(format!(
            "expected {} values for a {size}x{size} matrix, found {}",
            size * size,
            values.len()
        )));
    }
    Ok(DMatrix::from_row_slice(size, size, &values))
}

pub(crate) fn matrix_element(m: &DMatrix<f64>) -> MatrixElement {
    let (size, values) = encode_matrix(m);
    MatrixElement { size, values }
}

pub(crate) fn from_matrix_element(e: &MatrixElement) -> Result<DMatrix<f64>> {
    decode_matrix(e.size, &e.values)
}

/// Serialize `doc` under `root`, with an XML declaration.
pub(crate) fn to_xml<T: Serialize>(root: &str, doc: &T) -> Result<String> {
    let body = quick_xml::se::to_string_with_root(root, doc)
        .map_err(|e| GeometryError::persistence(format!("serialize {root}: {e}")))?;
    Ok(format!("{XML_DECLARATION}{body}\n"))
}

/// Deserialize a document.
pub(crate) fn from_xml<T: DeserializeOwned>(xml: &str) -> Result<T> {
    quick_xml::de::from_str(xml).map_err(|e| {
        warn!(error = %e, "rejected malformed document");
        GeometryError::persistence(format!("malformed document: {e}"))
    })
}

pub(crate) fn write_file(path: &Path, xml: &str) -> Result<()> {
    fs::write(path, xml)?;
    Ok(())
}

pub(crate) fn read_file(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}
