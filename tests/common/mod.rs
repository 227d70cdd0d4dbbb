//! Synthetic EEG-like epochs shared by the integration tests.

#![allow(dead_code)]

use nalgebra::DMatrix;
use spd_geometry::{covariance_matrix, Estimator, Standardization};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Per-channel amplitudes of the two synthetic classes.
pub const CLASS_SCALES: [[f64; 4]; 2] = [[1.0, 2.0, 0.5, 1.5], [2.0, 1.0, 1.5, 0.5]];

/// Deterministic noise with unit variance, scaled per channel.
pub fn epoch(channels: usize, samples: usize, scales: &[f64], seed: u64) -> DMatrix<f64> {
    DMatrix::from_fn(channels, samples, |c, s| {
        let mut hasher = DefaultHasher::new();
        (seed, c, s).hash(&mut hasher);
        let h = hasher.finish();
        let sum: f64 = (0..4)
            .map(|k| ((h >> (16 * k)) & 0xFFFF) as f64 / 65535.0 * 2.0 - 1.0)
            .sum();
        scales.get(c).copied().unwrap_or(1.0) * sum / (4.0_f64 / 3.0).sqrt()
    })
}

/// Raw epochs of one class.
pub fn class_epochs(class: usize, count: usize, samples: usize, seed: u64) -> Vec<DMatrix<f64>> {
    (0..count)
        .map(|t| epoch(4, samples, &CLASS_SCALES[class], seed + t as u64))
        .collect()
}

pub fn covariances(epochs: &[DMatrix<f64>]) -> Vec<DMatrix<f64>> {
    epochs
        .iter()
        .map(|e| covariance_matrix(e, Estimator::Lwf, Standardization::Center).unwrap())
        .collect()
}

/// Covariance dataset with `count` trials per class.
pub fn dataset(count: usize, seed: u64) -> Vec<Vec<DMatrix<f64>>> {
    (0..CLASS_SCALES.len())
        .map(|k| covariances(&class_epochs(k, count, 256, seed + 1000 * k as u64)))
        .collect()
}
