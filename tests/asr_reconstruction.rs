//! Artifact subspace reconstruction on synthetic windows.
//!
//! The reference is calibrated on one class; windows of the other class,
//! twice as loud, must be reconstructed while clean windows pass through.

mod common;

use common::class_epochs;
use nalgebra::DMatrix;
use spd_geometry::{Asr, AsrConfig, Metric};

// =============================================================================
// HELPERS
// =============================================================================

fn differs(a: &DMatrix<f64>, b: &DMatrix<f64>) -> bool {
    (a - b).norm() > 1e-3 * b.norm()
}

fn check_scaled_second_class(asr: &mut Asr) {
    let windows: Vec<_> = class_epochs(1, 20, 256, 9000)
        .into_iter()
        .map(|w| w * 2.0)
        .collect();
    let unchanged = windows
        .iter()
        .filter(|w| !differs(&asr.process(w).unwrap(), w))
        .count();
    assert!(unchanged <= 1, "{unchanged} windows left untouched");
}

// =============================================================================
// CALIBRATION PATHS
// =============================================================================

#[test]
fn test_second_class_is_reconstructed() {
    for metric in [Metric::Euclidean, Metric::Riemann] {
        let calibration = class_epochs(0, 30, 256, 100);
        let mut asr = Asr::trained(metric, &calibration, AsrConfig::default()).unwrap();
        check_scaled_second_class(&mut asr);
    }
}

#[test]
fn test_second_class_with_distribution_fit() {
    let calibration = class_epochs(0, 60, 256, 200);
    let config = AsrConfig::default().with_min_fit_windows(40);
    let mut asr = Asr::trained(Metric::Riemann, &calibration, config).unwrap();
    check_scaled_second_class(&mut asr);
}

#[test]
fn test_clean_windows_mostly_pass_through() {
    let mut asr = Asr::trained(Metric::Riemann, &class_epochs(0, 30, 256, 100), AsrConfig::default())
        .unwrap();
    let windows = class_epochs(0, 20, 256, 7000);
    let trivial = windows
        .iter()
        .filter(|w| {
            let out = asr.process(w).unwrap();
            asr.is_trivial() && out == **w
        })
        .count();
    assert!(trivial >= 16, "only {trivial} clean windows untouched");
}

// =============================================================================
// LIMITS
// =============================================================================

#[test]
fn test_channel_fraction_limits_reconstruction() {
    let calibration = class_epochs(0, 30, 256, 100);
    let mut asr = Asr::trained(Metric::Euclidean, &calibration, AsrConfig::conservative()).unwrap();
    let mut window = class_epochs(0, 1, 256, 4242).remove(0);
    window.row_mut(2).scale_mut(50.0);
    let out = asr.process(&window).unwrap();
    assert!(!asr.is_trivial());
    assert!(out.row(2).norm() < 0.5 * window.row(2).norm());
}

#[test]
fn test_wrong_channel_count_is_rejected() {
    let mut asr = Asr::trained(Metric::Euclidean, &class_epochs(0, 10, 128, 1), AsrConfig::default())
        .unwrap();
    let before = asr.clone();
    assert!(asr.process(&DMatrix::zeros(3, 128)).is_err());
    assert!(asr.is_equal(&before, 0.0));
}
