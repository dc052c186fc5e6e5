//! Three-sigma outlier detection.
//!
//! A candidate is compared against the readings already stored for its
//! metric. The candidate itself never contributes to the statistics.

use crate::error::ValidationError;
use crate::types::MetricId;

/// Default rejection threshold in standard deviations.
pub const DEFAULT_SIGMA: f64 = 3.0;

/// Standard deviation at or below this fraction of `|mean|` is rounding noise.
const SPREAD_NOISE_FLOOR: f64 = 1e-12;

/// Result of checking one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutlierVerdict {
    /// Within the threshold, or no spread to measure against
    Accept,
    /// Deviation exceeds the threshold
    Reject { mean: f64, std_dev: f64, z_score: f64 },
}

impl OutlierVerdict {
    pub fn is_reject(&self) -> bool {
        matches!(self, OutlierVerdict::Reject { .. })
    }
}

/// Detector with a configurable sigma threshold.
#[derive(Debug, Clone, Copy)]
pub struct OutlierDetector {
    sigma: f64,
}

impl OutlierDetector {
    /// Create a detector using the three-sigma rule.
    pub fn new() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
        }
    }

    /// Create with a custom threshold.
    pub fn with_sigma(sigma: f64) -> Self {
        Self { sigma }
    }

    /// Rejection threshold in standard deviations.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Classify a candidate against historical values.
    ///
    /// With zero spread (no history, one point, or identical values) the
    /// candidate is always accepted.
    pub fn classify(&self, candidate: f64, history: &[f64]) -> OutlierVerdict {
        let Some((mean, std_dev)) = mean_and_std_dev(history) else {
            return OutlierVerdict::Accept;
        };

        if has_no_spread(history, mean, std_dev) {
            return OutlierVerdict::Accept;
        }

        let z_score = (candidate - mean).abs() / std_dev;
        if z_score > self.sigma {
            OutlierVerdict::Reject {
                mean,
                std_dev,
                z_score,
            }
        } else {
            OutlierVerdict::Accept
        }
    }

    /// Check one metric's candidate, producing a validation error on rejection.
    pub fn check(&self, metric: MetricId, candidate: f64, history: &[f64]) -> Result<(), ValidationError> {
        match self.classify(candidate, history) {
            OutlierVerdict::Accept => Ok(()),
            OutlierVerdict::Reject {
                mean,
                std_dev,
                z_score,
            } => Err(ValidationError::Outlier {
                metric,
                value: candidate,
                mean,
                std_dev,
                z_score,
                sigma: self.sigma,
            }),
        }
    }
}

impl Default for OutlierDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Three-sigma check with the default threshold.
pub fn is_outlier(candidate: f64, history: &[f64]) -> bool {
    OutlierDetector::new().classify(candidate, history).is_reject()
}

/// Identical values sum to a mean that can be one ulp off, leaving a
/// standard deviation around 1e-14 instead of zero.
fn has_no_spread(history: &[f64], mean: f64, std_dev: f64) -> bool {
    std_dev <= SPREAD_NOISE_FLOOR * mean.abs()
        || history.iter().all(|v| *v == history[0])
}

/// Mean and population standard deviation; `None` for empty input.
pub fn mean_and_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some((mean, variance.sqrt()))
}
