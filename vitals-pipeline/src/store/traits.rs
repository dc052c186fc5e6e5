//! Core traits for storage collaborators.

use async_trait::async_trait;

use vitals_core::{AnchorEntry, MetricAggregate, MetricId};

/// Error types for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store is not reachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(String),

    /// Stored bytes could not be decoded, or a document could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Document id does not belong to the metric it is written under
    #[error("Aggregate id {found} does not match metric {metric} (expected {expected})")]
    IdMismatch {
        metric: MetricId,
        expected: String,
        found: String,
    },
}

/// Per-metric aggregate documents.
///
/// Documents are provisioned out-of-band; the pipeline only reads and
/// replaces them. A replace is atomic per document.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Fetch a metric's aggregate, `None` if it was never provisioned.
    async fn get_aggregate(&self, metric: MetricId) -> Result<Option<MetricAggregate>, StoreError>;

    /// Replace a metric's aggregate document as a whole.
    async fn replace_aggregate(
        &self,
        metric: MetricId,
        aggregate: &MetricAggregate,
    ) -> Result<(), StoreError>;

    /// All provisioned aggregates, ordered by metric.
    async fn list_aggregates(&self) -> Result<Vec<MetricAggregate>, StoreError>;
}

/// Append-only log of ledger anchors.
///
/// Entries are ordered by insertion; the most recent entry is the last one
/// appended, regardless of `created_at` ties.
#[async_trait]
pub trait AnchorLog: Send + Sync {
    /// The most recently appended entry.
    async fn most_recent(&self) -> Result<Option<AnchorEntry>, StoreError>;

    /// Append a new entry.
    async fn append(&self, entry: AnchorEntry) -> Result<(), StoreError>;

    /// Up to `limit` entries, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<AnchorEntry>, StoreError>;
}

/// Reject writes of a document under the wrong metric.
pub(crate) fn check_aggregate_id(metric: MetricId, aggregate: &MetricAggregate) -> Result<(), StoreError> {
    if aggregate.metric_id() != Some(metric) {
        return Err(StoreError::IdMismatch {
            metric,
            expected: metric.doc_id().to_string(),
            found: aggregate.id.clone(),
        });
    }
    Ok(())
}
