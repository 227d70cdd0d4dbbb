//! Metric tags and their fallback tables.
//!
//! Not every operation is defined for every metric. Each operation family
//! resolves the requested metric through one of the `*_metric` methods, so
//! the metric that actually runs can be queried ahead of time.

use crate::error::{GeometryError, Result};
use std::fmt;
use std::str::FromStr;

/// Geometry on the SPD manifold used by distances, means and geodesics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Metric {
    /// Affine-invariant Riemannian metric.
    #[default]
    Riemann,
    /// Flat Frobenius geometry.
    Euclidean,
    /// Euclidean geometry of matrix logarithms.
    LogEuclidean,
    /// Log-determinant (Stein) divergence.
    LogDet,
    /// Symmetrized Kullback-Leibler divergence.
    Kullback,
    /// Bures-Wasserstein geometry.
    Wasserstein,
    /// Euclidean geometry of inverses.
    Harmonic,
    /// Approximate joint diagonalization based log-Euclidean mean.
    Ale,
    /// Degenerate metric: constant distance, identity mean.
    Identity,
}

impl Metric {
    /// Every metric.
    pub const ALL: [Self; 9] = [
        Self::Riemann,
        Self::Euclidean,
        Self::LogEuclidean,
        Self::LogDet,
        Self::Kullback,
        Self::Wasserstein,
        Self::Harmonic,
        Self::Ale,
        Self::Identity,
    ];

    /// Tag used in text and XML representations.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Riemann => "Riemann",
            Self::Euclidean => "Euclidian",
            Self::LogEuclidean => "Log Euclidian",
            Self::LogDet => "Log Determinant",
            Self::Kullback => "Kullback",
            Self::Wasserstein => "Wasserstein",
            Self::Harmonic => "Harmonic",
            Self::Ale => "ALE",
            Self::Identity => "Identity",
        }
    }

    /// Metric used by [`crate::distance`]. ALE has no distance of its own.
    #[must_use]
    pub const fn distance_metric(self) -> Self {
        match self {
            Self::Ale => Self::Riemann,
            other => other,
        }
    }

    /// Metric used by [`crate::geodesic`].
    #[must_use]
    pub const fn geodesic_metric(self) -> Self {
        match self {
            Self::LogDet | Self::Kullback | Self::Ale => Self::Riemann,
            other => other,
        }
    }

    /// Metric used by the geometric median.
    #[must_use]
    pub const fn median_metric(self) -> Self {
        match self {
            Self::Riemann | Self::Euclidean | Self::Identity => self,
            _ => Self::Euclidean,
        }
    }

    /// Metric used by artifact subspace reconstruction.
    #[must_use]
    pub const fn asr_metric(self) -> Self {
        match self {
            Self::Riemann => Self::Riemann,
            _ => Self::Euclidean,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = GeometryError;

    /// Accepts the display tag, ignoring case, spaces and the
    /// `Euclidian`/`Euclidean` spelling.
    fn from_str(s: &str) -> Result<Self> {
        let key = |t: &str| {
            t.chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase()
                .replace("euclidean", "euclidian")
        };
        let wanted = key(s);
        Self::ALL
            .into_iter()
            .find(|m| key(m.as_str()) == wanted)
            .or(match wanted.as_str() {
                "logdet" => Some(Self::LogDet),
                "logeuclid" => Some(Self::LogEuclidean),
                _ => None,
            })
            .ok_or_else(|| GeometryError::unknown_tag("metric", s))
    }
}
