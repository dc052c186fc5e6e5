//! Outcome of one ingestion request.

use serde::{Deserialize, Serialize};

use vitals_core::MetricId;

/// What happened to the batch hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorStatus {
    /// Handed to the anchor worker
    Sent,
    /// Hash equals the most recent anchor
    SkippedDuplicate,
    /// Anchoring required but could not be dispatched; retried on the next ingestion
    Pending,
}

impl AnchorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorStatus::Sent => "sent",
            AnchorStatus::SkippedDuplicate => "skipped-duplicate",
            AnchorStatus::Pending => "pending",
        }
    }
}

/// Response class for the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Success,
    ClientError,
    ServerError,
}

impl StatusClass {
    /// HTTP status code for this class.
    pub fn http_code(&self) -> u16 {
        match self {
            StatusClass::Success => 200,
            StatusClass::ClientError => 400,
            StatusClass::ServerError => 500,
        }
    }
}

/// A failed aggregate write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricWriteError {
    pub metric: MetricId,
    pub error: String,
}

/// A metric left out of aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedMetric {
    pub metric: MetricId,
    pub reason: String,
}

/// Structured result of an ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    /// Whether the reading was accepted
    pub accepted: bool,
    /// Why the reading was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Anchor decision; absent when the reading was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchored: Option<AnchorStatus>,
    /// Aggregate writes that failed
    pub per_metric_write_errors: Vec<MetricWriteError>,
    /// Metrics without an aggregate, or whose aggregate could not be read
    pub skipped_metrics: Vec<SkippedMetric>,
    /// Hash of the accepted batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Ingestion time used for the hash (ms since epoch)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Response class
    pub status: StatusClass,
}

impl IngestResult {
    /// A refused request.
    pub fn rejected(status: StatusClass, reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
            anchored: None,
            per_metric_write_errors: Vec::new(),
            skipped_metrics: Vec::new(),
            content_hash: None,
            timestamp: None,
            status,
        }
    }
}
