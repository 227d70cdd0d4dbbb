//! End-to-end classification on synthetic two-class data.
//!
//! Epochs go through covariance estimation, then training and online
//! classification with and without re-centring.

mod common;

use common::{class_epochs, covariances, dataset, CLASS_SCALES};
use nalgebra::DMatrix;
use spd_geometry::{
    mean, tangent_space, un_tangent_space, Adaptation, MatrixClassifier, MdmClassifier,
    MdmRebiasClassifier, Metric,
};

// =============================================================================
// HELPERS
// =============================================================================

/// Test samples alternating between the classes, with their labels.
fn interleaved(count: usize, scale: f64, seed: u64) -> Vec<(usize, DMatrix<f64>)> {
    let per_class: Vec<Vec<DMatrix<f64>>> = (0..CLASS_SCALES.len())
        .map(|k| {
            let epochs: Vec<_> = class_epochs(k, count, 256, seed + 500 * k as u64)
                .into_iter()
                .map(|e| e * scale)
                .collect();
            covariances(&epochs)
        })
        .collect();
    (0..count)
        .flat_map(|i| (0..per_class.len()).map(move |k| (k, i)))
        .map(|(k, i)| (k, per_class[k][i].clone()))
        .collect()
}

fn accuracy(clf: &mut dyn MatrixClassifier, samples: &[(usize, DMatrix<f64>)], adaptation: bool) -> f64 {
    let correct = samples
        .iter()
        .filter(|(label, sample)| {
            let mode = if adaptation {
                Adaptation::Supervised(*label)
            } else {
                Adaptation::None
            };
            clf.classify_id(sample, mode).unwrap() == *label
        })
        .count();
    correct as f64 / samples.len() as f64
}

// =============================================================================
// MDM
// =============================================================================

#[test]
fn test_mdm_separates_classes() {
    let train = dataset(10, 1);
    let test = interleaved(15, 1.0, 77);
    for metric in [
        Metric::Riemann,
        Metric::Euclidean,
        Metric::LogEuclidean,
        Metric::LogDet,
        Metric::Kullback,
        Metric::Harmonic,
        Metric::Wasserstein,
    ] {
        let mut mdm = MdmClassifier::new(metric);
        mdm.train(&train).unwrap();
        let acc = accuracy(&mut mdm, &test, false);
        assert!(acc >= 0.9, "{metric}: accuracy {acc}");
    }
}

#[test]
fn test_probabilities_follow_prediction() {
    let mut mdm = MdmClassifier::new(Metric::Riemann);
    mdm.train(&dataset(10, 1)).unwrap();
    for (_, sample) in interleaved(5, 1.0, 91) {
        let result = mdm.classify(&sample, Adaptation::None).unwrap();
        let sum: f64 = result.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        let best = result
            .probabilities
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(best, result.class_id);
    }
}

#[test]
fn test_supervised_adaptation_counts_trials() {
    let mut mdm = MdmClassifier::new(Metric::Riemann);
    mdm.train(&dataset(10, 1)).unwrap();
    let test = interleaved(5, 1.0, 33);
    let acc = accuracy(&mut mdm, &test, true);
    assert!(acc >= 0.9);
    assert_eq!(mdm.trials(), &[15, 15]);
}

// =============================================================================
// MDM REBIAS
// =============================================================================

#[test]
fn test_rebias_matches_mdm_without_drift() {
    let mut clf = MdmRebiasClassifier::new(Metric::Riemann);
    clf.train(&dataset(10, 1)).unwrap();
    let acc = accuracy(&mut clf, &interleaved(15, 1.0, 77), false);
    assert!(acc >= 0.9, "accuracy {acc}");
    assert_eq!(clf.bias().update_count(), 30);
}

#[test]
fn test_rebias_tracks_global_drift() {
    let mut clf = MdmRebiasClassifier::new(Metric::Riemann);
    clf.train(&dataset(10, 1)).unwrap();
    // Every channel three times louder than during calibration.
    let acc = accuracy(&mut clf, &interleaved(20, 3.0, 55), false);
    assert!(acc >= 0.8, "accuracy {acc}");
}

// =============================================================================
// FEATURIZATION
// =============================================================================

#[test]
fn test_tangent_features_at_dataset_mean() {
    let train = dataset(8, 3);
    let all: Vec<_> = train.iter().flatten().cloned().collect();
    let reference = mean(&all, Metric::Riemann).unwrap();

    let centroid = |class: &[DMatrix<f64>]| {
        let features: Vec<_> = class
            .iter()
            .map(|c| tangent_space(c, Some(&reference)).unwrap())
            .collect();
        features.iter().skip(1).fold(features[0].clone(), |acc, f| acc + f) / features.len() as f64
    };
    let (a, b) = (centroid(&train[0]), centroid(&train[1]));
    assert_eq!(a.len(), 10);
    assert!((a - b).norm() > 1.0);

    for c in &all {
        let v = tangent_space(c, Some(&reference)).unwrap();
        let back = un_tangent_space(&v, Some(&reference)).unwrap();
        assert!((back - c).amax() < 1e-6);
    }
}
