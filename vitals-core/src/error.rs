//! Validation errors for incoming readings.

use crate::types::MetricId;

/// Why a reading was refused before any side effect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Request body is not a JSON object
    #[error("Reading must be a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("Missing field: {0}")]
    MissingField(MetricId),

    /// A field is present but not a number
    #[error("Field {metric} is not numeric: {found}")]
    NotNumeric { metric: MetricId, found: String },

    /// NaN or infinite value
    #[error("Field {metric} is not finite: {value}")]
    NotFinite { metric: MetricId, value: f64 },

    /// Candidate deviates too far from the stored history
    #[error(
        "Outlier on {metric}: {value} deviates {z_score:.2} standard deviations from mean {mean:.4} (limit {sigma})"
    )]
    Outlier {
        metric: MetricId,
        value: f64,
        mean: f64,
        std_dev: f64,
        z_score: f64,
        sigma: f64,
    },
}
