//! Range helpers, histograms, the regularized incomplete gamma function and
//! the generalized Gaussian fit used to calibrate ASR thresholds.

use crate::config::FitDistributionConfig;
use crate::error::{GeometryError, Result};

const GAMMA_EPS: f64 = 1e-14;
const GAMMA_FPMIN: f64 = 1e-300;
const GAMMA_MAX_ITER: usize = 500;

/// Fewer values than this cannot populate the fit grid.
pub const MIN_FIT_VALUES: usize = 8;

/// Number of elements of a closed range: the end is included when it falls
/// on a step.
fn range_len(begin: f64, end: f64, step: f64) -> usize {
    if end < begin || step <= 0.0 {
        return 0;
    }
    let size = (end - begin) / step;
    let nearest = size.round();
    if (size - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest as usize + 1
    } else {
        size.ceil() as usize
    }
}

/// Values `begin, begin + step, ...` up to and including `end`.
#[must_use]
pub fn double_range(begin: f64, end: f64, step: f64) -> Vec<f64> {
    (0..range_len(begin, end, step))
        .map(|i| begin + i as f64 * step)
        .collect()
}

/// Like [`double_range`] but every value is rounded to an index.
#[must_use]
pub fn round_index_range(begin: f64, end: f64, step: f64) -> Vec<usize> {
    (0..range_len(begin, end, step))
        .map(|i| (begin + i as f64 * step).round().max(0.0) as usize)
        .collect()
}

/// Histogram of non-negative values over `n` equal bins spanning `[0, max]`.
/// The maximum value lands in the last bin.
#[must_use]
pub fn bin_hist(values: &[f64], n: usize) -> Vec<usize> {
    let mut hist = vec![0; n];
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if n == 0 || !max.is_finite() || max.abs() <= f64::EPSILON {
        return hist;
    }
    let coef = n as f64 / max;
    for &v in values {
        let bin = (v * coef).floor();
        if bin < 0.0 {
            continue;
        }
        let bin = bin as usize;
        if bin < n {
            hist[bin] += 1;
        } else if bin == n {
            hist[n - 1] += 1;
        }
    }
    hist
}

/// Regularized lower incomplete gamma function `P(a, x)`.
#[must_use]
pub fn gamma_p(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    let gln = libm::lgamma(a);
    if x < a + 1.0 {
        // Series representation.
        let mut ap = a;
        let mut del = 1.0 / a;
        let mut sum = del;
        for _ in 0..GAMMA_MAX_ITER {
            ap += 1.0;
            del *= x / ap;
            sum += del;
            if del.abs() < sum.abs() * GAMMA_EPS {
                break;
            }
        }
        sum * (-x + a * x.ln() - gln).exp()
    } else {
        // Continued fraction, modified Lentz.
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / GAMMA_FPMIN;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..=GAMMA_MAX_ITER {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < GAMMA_FPMIN {
                d = GAMMA_FPMIN;
            }
            c = b + an / c;
            if c.abs() < GAMMA_FPMIN {
                c = GAMMA_FPMIN;
            }
            d = 1.0 / d;
            let del = d * c;
            h *= del;
            if (del - 1.0).abs() < GAMMA_EPS {
                break;
            }
        }
        1.0 - (-x + a * x.ln() - gln).exp() * h
    }
}

/// Inverse of [`gamma_p`] in `x`: the `x` such that `P(a, x) = p`.
///
/// Halley iteration from an asymptotic initial guess.
///
/// # Errors
///
/// Returns an error if `a <= 0` or `p` lies outside `[0, 1]`.
pub fn gamma_p_inv(a: f64, p: f64) -> Result<f64> {
    if !(a > 0.0) {
        return Err(GeometryError::invalid_parameter(format!(
            "gamma shape must be positive, got {a}"
        )));
    }
    if !(0.0..=1.0).contains(&p) {
        return Err(GeometryError::invalid_parameter(format!(
            "probability must be in [0, 1], got {p}"
        )));
    }
    if p >= 1.0 {
        return Ok((a + 100.0 * a.sqrt()).max(100.0));
    }
    if p <= 0.0 {
        return Ok(0.0);
    }

    let a1 = a - 1.0;
    let gln = libm::lgamma(a);
    let (lna1, afac) = if a > 1.0 {
        let lna1 = a1.ln();
        (lna1, (a1 * (lna1 - 1.0) - gln).exp())
    } else {
        (0.0, 0.0)
    };

    let mut x = if a > 1.0 {
        let pp = if p < 0.5 { p } else { 1.0 - p };
        let t = (-2.0 * pp.ln()).sqrt();
        let mut z = (2.307_53 + t * 0.270_61) / (1.0 + t * (0.992_29 + t * 0.044_81)) - t;
        if p < 0.5 {
            z = -z;
        }
        (a * (1.0 - 1.0 / (9.0 * a) - z / (3.0 * a.sqrt())).powi(3)).max(1e-3)
    } else {
        let t = 1.0 - a * (0.253 + a * 0.12);
        if p < t {
            (p / t).powf(1.0 / a)
        } else {
            1.0 - (1.0 - (p - t) / (1.0 - t)).ln()
        }
    };

    for _ in 0..12 {
        if x <= 0.0 {
            return Ok(0.0);
        }
        let err = gamma_p(a, x) - p;
        let t = if a > 1.0 {
            afac * (-(x - a1) + a1 * (x.ln() - lna1)).exp()
        } else {
            (-x + a1 * x.ln() - gln).exp()
        };
        let u = err / t;
        let step = u / (1.0 - 0.5 * (u * ((a - 1.0) / x - 1.0)).min(1.0));
        x -= step;
        if x <= 0.0 {
            x = 0.5 * (x + step);
        }
        if step.abs() < 1e-8 * x {
            break;
        }
    }
    Ok(x)
}

/// Location and scale of a clean-data amplitude distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedDistribution {
    /// Location of the clean distribution.
    pub mu: f64,
    /// Standard deviation of the clean distribution.
    pub sigma: f64,
    /// Selected shape parameter.
    pub beta: f64,
}

/// Fit a truncated generalized Gaussian to the clean part of `values`.
///
/// The data is sorted and, for every window width and offset on the grid,
/// a histogram of the window is compared with the distribution of each
/// candidate shape between its quantile bounds. The fit with the smallest
/// KL divergence gives `mu` and `sigma`.
///
/// # Errors
///
/// Returns an error if `values` is too short for the configured grid, or
/// the configuration is invalid.
pub fn fit_distribution(values: &[f64], config: &FitDistributionConfig) -> Result<FittedDistribution> {
    config.validate()?;
    if values.is_empty() {
        return Err(GeometryError::empty("distribution values"));
    }
    if values.len() < MIN_FIT_VALUES {
        return Err(GeometryError::invalid_parameter(format!(
            "distribution fit needs at least {MIN_FIT_VALUES} values, got {}",
            values.len()
        )));
    }

    let betas = &config.betas;
    let scales: Vec<f64> = betas
        .iter()
        .map(|&b| b / (2.0 * libm::tgamma(1.0 / b)))
        .collect();

    let sign_min = (config.min_quantile - 0.5).signum();
    let sign_max = (config.max_quantile - 0.5).signum();
    let coef_min = sign_min * (2.0 * config.min_quantile - 1.0);
    let coef_max = sign_max * (2.0 * config.max_quantile - 1.0);
    let z_bounds = betas
        .iter()
        .map(|&b| -> Result<(f64, f64)> {
            let inv = 1.0 / b;
            Ok((
                sign_min * gamma_p_inv(inv, coef_min)?.powf(inv),
                sign_max * gamma_p_inv(inv, coef_max)?.powf(inv),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;
    let span = config.max_quantile - config.min_quantile;

    let mut widths = round_index_range(
        n * span * config.min_clean_fraction,
        n * span,
        n * config.step_scale,
    );
    widths.retain(|&w| w > 0);
    widths.reverse();
    let bounds = round_index_range(
        n * config.min_quantile,
        n * (config.min_quantile + config.max_dropout_fraction),
        n * config.step_bound,
    );
    let max_width = widths.iter().copied().max().unwrap_or(0);
    let last_bound = bounds.iter().copied().max().unwrap_or(0);
    if max_width == 0 || bounds.is_empty() || last_bound + max_width > sorted.len() {
        return Err(GeometryError::invalid_parameter(format!(
            "{} values are not enough for a distribution fit",
            sorted.len()
        )));
    }

    // One row per offset, values shifted so each row starts at zero.
    let firsts: Vec<f64> = bounds.iter().map(|&b| sorted[b]).collect();
    let grid: Vec<Vec<f64>> = bounds
        .iter()
        .zip(&firsts)
        .map(|(&b, &first)| sorted[b..b + max_width].iter().map(|v| v - first).collect())
        .collect();

    let mut best_kl = f64::MAX;
    let (mut best_beta, mut best_id, mut best_width) = (0, 0, 0);

    for &w in &widths {
        let nbins = ((3.0 * (1.0 + w as f64 / 2.0).log2()).round() as usize).max(1);
        let hist: Vec<Vec<f64>> = grid
            .iter()
            .map(|row| {
                bin_hist(&row[..w], nbins)
                    .into_iter()
                    .map(|c| (c as f64 + 0.01).ln())
                    .collect()
            })
            .collect();

        for (b, (&beta, &(z0, z1))) in betas.iter().zip(&z_bounds).enumerate() {
            let mut prob: Vec<f64> = (0..nbins)
                .map(|i| {
                    let z = z0 + ((i as f64 + 0.5) / nbins as f64) * (z1 - z0);
                    (-z.abs().powf(beta)).exp() * scales[b]
                })
                .collect();
            let total: f64 = prob.iter().sum();
            if total.abs() > f64::EPSILON {
                prob.iter_mut().for_each(|p| *p /= total);
            }

            for (id, h) in hist.iter().enumerate() {
                let kl = (w as f64).ln()
                    + prob
                        .iter()
                        .zip(h)
                        .map(|(&p, &hv)| p * (p.ln() - hv))
                        .sum::<f64>();
                if kl < best_kl {
                    best_kl = kl;
                    best_beta = b;
                    best_id = id;
                    best_width = w - 1;
                }
            }
        }
    }

    let (z0, z1) = z_bounds[best_beta];
    let beta = betas[best_beta];
    let alpha = grid[best_id][best_width] / (z1 - z0);
    let mu = firsts[best_id] - z0 * alpha;
    let sigma = (alpha * alpha * libm::tgamma(3.0 / beta) / libm::tgamma(1.0 / beta)).sqrt();

    if !(mu.is_finite() && sigma.is_finite()) {
        return Err(GeometryError::numerical_instability("distribution fit diverged"));
    }
    Ok(FittedDistribution { mu, sigma, beta })
}
