//! IngestPipeline - main entry point for reading ingestion.
//!
//! Runs one reading through read → validate → aggregate → hash → dedup →
//! anchor. Only input validation and a total aggregate read failure abort a
//! request; every other failure is contained and reported in the result.

use std::sync::Arc;
use tracing::{debug, info, warn};

use vitals_core::aggregate::{date_label, month_label};
use vitals_core::{
    CanonicalBatch, Clock, MetricAggregate, MetricId, OutlierDetector, SensorReading,
    ValidationError,
};

use crate::anchor::AnchorHandle;
use crate::result::{AnchorStatus, IngestResult, MetricWriteError, SkippedMetric, StatusClass};
use crate::store::{AggregateStore, AnchorLog};

/// Error types that abort an ingestion.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Reading refused before any side effect
    #[error("Invalid reading: {0}")]
    Validation(#[from] ValidationError),

    /// None of the aggregates could be read
    #[error("Aggregate store unavailable: {0}")]
    StoreUnavailable(String),

    /// Accepted batch could not be put in canonical form
    #[error("Failed to encode batch: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl IngestError {
    /// Response class for this error.
    pub fn status_class(&self) -> StatusClass {
        match self {
            IngestError::Validation(_) => StatusClass::ClientError,
            IngestError::StoreUnavailable(_) | IngestError::Encoding(_) => StatusClass::ServerError,
        }
    }
}

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Outlier threshold in standard deviations
    pub outlier_sigma: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outlier_sigma: vitals_core::outlier::DEFAULT_SIGMA,
        }
    }
}

/// Orchestrates ingestion of sensor readings.
///
/// All collaborators are injected; the pipeline holds no mutable state of
/// its own, so one instance can serve concurrent requests.
pub struct IngestPipeline {
    detector: OutlierDetector,
    aggregates: Arc<dyn AggregateStore>,
    anchors: Arc<dyn AnchorLog>,
    anchor_worker: AnchorHandle,
    clock: Arc<dyn Clock>,
}

impl IngestPipeline {
    /// Create a new pipeline over its collaborators.
    pub fn new(
        aggregates: Arc<dyn AggregateStore>,
        anchors: Arc<dyn AnchorLog>,
        anchor_worker: AnchorHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            detector: OutlierDetector::new(),
            aggregates,
            anchors,
            anchor_worker,
            clock,
        }
    }

    /// Create with configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.detector = OutlierDetector::with_sigma(config.outlier_sigma);
        self
    }

    /// Handle to the anchor worker used by this pipeline.
    pub fn anchor_worker(&self) -> &AnchorHandle {
        &self.anchor_worker
    }

    /// Ingest an untyped JSON reading.
    pub async fn ingest_json(&self, body: &serde_json::Value) -> IngestResult {
        match SensorReading::from_json(body) {
            Ok(reading) => self.ingest(reading).await,
            Err(e) => {
                debug!(error = %e, "Rejected malformed reading");
                IngestResult::rejected(StatusClass::ClientError, e.to_string())
            }
        }
    }

    /// Ingest a reading, always producing a structured result.
    pub async fn ingest(&self, reading: SensorReading) -> IngestResult {
        match self.try_ingest(reading).await {
            Ok(result) => result,
            Err(e) => {
                match e.status_class() {
                    StatusClass::ServerError => warn!(error = %e, "Ingestion aborted"),
                    _ => info!(error = %e, "Reading rejected"),
                }
                IngestResult::rejected(e.status_class(), e.to_string())
            }
        }
    }

    /// Ingest a reading, returning abort conditions as errors.
    pub async fn try_ingest(&self, reading: SensorReading) -> Result<IngestResult, IngestError> {
        reading.validate()?;

        // Read phase: the four reads are independent
        let (temperature, heart_rate, spo2, last_anchor) = tokio::join!(
            self.aggregates.get_aggregate(MetricId::Temperature),
            self.aggregates.get_aggregate(MetricId::HeartRate),
            self.aggregates.get_aggregate(MetricId::Spo2),
            self.anchors.most_recent(),
        );

        let mut present: Vec<(MetricId, MetricAggregate)> = Vec::with_capacity(3);
        let mut skipped_metrics = Vec::new();
        let mut read_failures = Vec::new();

        for (metric, read) in MetricId::ALL.into_iter().zip([temperature, heart_rate, spo2]) {
            match read {
                Ok(Some(aggregate)) => present.push((metric, aggregate)),
                Ok(None) => {
                    debug!(metric = %metric, "No aggregate provisioned, skipping metric");
                    skipped_metrics.push(SkippedMetric {
                        metric,
                        reason: "aggregate not provisioned".to_string(),
                    });
                }
                Err(e) => {
                    warn!(metric = %metric, error = %e, "Aggregate read failed, skipping metric");
                    read_failures.push(format!("{}: {}", metric, e));
                    skipped_metrics.push(SkippedMetric {
                        metric,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if read_failures.len() == MetricId::ALL.len() {
            return Err(IngestError::StoreUnavailable(read_failures.join("; ")));
        }

        let last_hash = match last_anchor {
            Ok(entry) => entry.map(|e| e.content_hash),
            Err(e) => {
                warn!(error = %e, "Anchor log read failed, assuming anchoring is required");
                None
            }
        };

        // Validation phase: every check runs before any mutation
        for (metric, aggregate) in &present {
            self.detector.check(
                *metric,
                reading.value(*metric),
                &aggregate.historical_values(),
            )?;
        }

        // Aggregation phase
        let now = self.clock.now();
        let month = month_label(now);
        let date = date_label(now);

        for (metric, aggregate) in present.iter_mut() {
            aggregate.record(&month, &date, reading.value(*metric));
        }

        let writes = present.iter().map(|(metric, aggregate)| async move {
            (*metric, self.aggregates.replace_aggregate(*metric, aggregate).await)
        });

        let mut per_metric_write_errors = Vec::new();
        for (metric, written) in futures::future::join_all(writes).await {
            if let Err(e) = written {
                warn!(metric = %metric, error = %e, "Aggregate write failed");
                per_metric_write_errors.push(MetricWriteError {
                    metric,
                    error: e.to_string(),
                });
            }
        }

        // Hash phase
        let batch = CanonicalBatch::new(&reading, now);
        let content_hash = batch.content_hash()?;

        // Dedup decision and anchor dispatch
        let anchored = if last_hash.as_deref() == Some(content_hash.as_str()) {
            debug!(hash = %content_hash, "Hash matches most recent anchor, skipping");
            AnchorStatus::SkippedDuplicate
        } else {
            match self.anchor_worker.submit(content_hash.clone()) {
                Ok(()) => AnchorStatus::Sent,
                Err(e) => {
                    warn!(hash = %content_hash, error = %e, "Could not dispatch anchor, leaving pending");
                    AnchorStatus::Pending
                }
            }
        };

        info!(
            hash = %content_hash,
            anchored = anchored.as_str(),
            aggregated = present.len(),
            write_errors = per_metric_write_errors.len(),
            "Reading ingested"
        );

        Ok(IngestResult {
            accepted: true,
            reason: None,
            anchored: Some(anchored),
            per_metric_write_errors,
            skipped_metrics,
            content_hash: Some(content_hash),
            timestamp: Some(batch.timestamp),
            status: StatusClass::Success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{AnchorWorker, AnchorWorkerConfig};
    use crate::ledger::MockLedger;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use vitals_core::{FixedClock, MonthlySummary, Reading};

    struct Harness {
        store: Arc<MemoryStore>,
        ledger: Arc<MockLedger>,
        clock: Arc<FixedClock>,
        pipeline: IngestPipeline,
    }

    fn harness(store: MemoryStore) -> Harness {
        let store = Arc::new(store);
        let ledger = Arc::new(MockLedger::default());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap(),
        ));
        let worker = AnchorWorker::spawn(
            ledger.clone(),
            store.clone(),
            clock.clone(),
            AnchorWorkerConfig::default(),
        );
        let pipeline = IngestPipeline::new(store.clone(), store.clone(), worker, clock.clone());
        Harness {
            store,
            ledger,
            clock,
            pipeline,
        }
    }

    fn reading() -> SensorReading {
        SensorReading::new(37.0, 70.0, 98.0).unwrap()
    }

    fn with_history(metric: MetricId, values: &[f64]) -> MetricAggregate {
        let mut aggregate = MetricAggregate::empty(metric);
        aggregate.monthly_data.push(MonthlySummary {
            month: "september".to_string(),
            average: 0.0,
            min: 0.0,
            max: 0.0,
            readings: values
                .iter()
                .map(|v| Reading {
                    date: "2026-09-01".to_string(),
                    value: *v,
                })
                .collect(),
        });
        aggregate
    }

    #[tokio::test]
    async fn test_first_ingestion_creates_summary_and_sends() {
        let h = harness(MemoryStore::seeded());

        let result = h.pipeline.ingest(reading()).await;

        assert!(result.accepted);
        assert_eq!(result.anchored, Some(AnchorStatus::Sent));
        assert_eq!(result.status, StatusClass::Success);

        let temperature = h.store.aggregate(MetricId::Temperature).unwrap();
        let october = temperature.month("october").unwrap();
        assert_eq!(october.readings.len(), 1);
        assert_eq!(october.readings[0].date, "2026-10-16");
        assert_eq!(october.min, 37.0);
        assert_eq!(october.max, 37.0);
        assert_eq!(october.average, 37.0);

        h.pipeline.anchor_worker().flush().await.unwrap();
        let latest = h.store.most_recent().await.unwrap().unwrap();
        assert_eq!(Some(latest.content_hash), result.content_hash);
    }

    #[tokio::test]
    async fn test_same_millisecond_duplicate_is_skipped() {
        let h = harness(MemoryStore::seeded());

        let first = h.pipeline.ingest(reading()).await;
        h.pipeline.anchor_worker().flush().await.unwrap();

        let second = h.pipeline.ingest(reading()).await;

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(second.anchored, Some(AnchorStatus::SkippedDuplicate));
        assert_eq!(h.ledger.call_count(), 1);
    }

    #[tokio::test]
    async fn test_new_timestamp_is_sent_again() {
        let h = harness(MemoryStore::seeded());

        h.pipeline.ingest(reading()).await;
        h.pipeline.anchor_worker().flush().await.unwrap();

        h.clock.advance(chrono::Duration::milliseconds(1));
        let second = h.pipeline.ingest(reading()).await;

        assert_eq!(second.anchored, Some(AnchorStatus::Sent));
    }

    #[tokio::test]
    async fn test_outlier_rejects_whole_request() {
        let store = MemoryStore::seeded()
            .with_aggregate(MetricId::HeartRate, with_history(MetricId::HeartRate, &[60.0, 62.0, 64.0]));
        let h = harness(store);

        let result = h
            .pipeline
            .ingest(SensorReading::new(37.0, 180.0, 98.0).unwrap())
            .await;

        assert!(!result.accepted);
        assert_eq!(result.status, StatusClass::ClientError);
        assert!(result.reason.unwrap().contains("heartRate"));
        assert_eq!(result.anchored, None);
        assert_eq!(h.store.write_count(), 0);

        h.pipeline.anchor_worker().flush().await.unwrap();
        assert_eq!(h.ledger.call_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_inexact_history_accepts_new_value() {
        let store = MemoryStore::seeded()
            .with_aggregate(MetricId::Spo2, with_history(MetricId::Spo2, &[98.6, 98.6, 98.6]))
            .with_aggregate(
                MetricId::Temperature,
                with_history(MetricId::Temperature, &[36.6; 10]),
            );
        let h = harness(store);

        let result = h
            .pipeline
            .ingest(SensorReading::new(36.7, 70.0, 98.7).unwrap())
            .await;

        assert!(result.accepted, "rejected: {:?}", result.reason);
        assert_eq!(h.store.write_count(), 3);
        assert_eq!(
            h.store.aggregate(MetricId::Spo2).unwrap().historical_values(),
            vec![98.6, 98.6, 98.6, 98.7]
        );
    }

    #[tokio::test]
    async fn test_missing_aggregate_is_skipped() {
        let store = MemoryStore::new()
            .with_aggregate(MetricId::Temperature, MetricAggregate::empty(MetricId::Temperature));
        let h = harness(store);

        let result = h.pipeline.ingest(reading()).await;

        assert!(result.accepted);
        assert_eq!(result.skipped_metrics.len(), 2);
        assert_eq!(h.store.write_count(), 1);
        assert!(h.store.aggregate(MetricId::Spo2).is_none());
    }

    #[tokio::test]
    async fn test_all_reads_failing_aborts() {
        let store = MemoryStore::seeded();
        for metric in MetricId::ALL {
            store.fail_reads_for(metric);
        }
        let h = harness(store);

        let result = h.pipeline.ingest(reading()).await;

        assert!(!result.accepted);
        assert_eq!(result.status, StatusClass::ServerError);
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_anchor_log_read_failure_still_anchors() {
        let h = harness(MemoryStore::seeded());
        h.store.set_anchor_log_available(false);

        let result = h.pipeline.ingest(reading()).await;

        assert!(result.accepted);
        assert_eq!(result.anchored, Some(AnchorStatus::Sent));
    }

    #[tokio::test]
    async fn test_stopped_worker_leaves_anchor_pending() {
        let h = harness(MemoryStore::seeded());
        h.pipeline.anchor_worker().shutdown().await.unwrap();

        let result = h.pipeline.ingest(reading()).await;

        assert!(result.accepted);
        assert_eq!(result.anchored, Some(AnchorStatus::Pending));
        assert_eq!(h.store.anchor_count().await, 0);
    }

    #[tokio::test]
    async fn test_ingest_json_validation() {
        let h = harness(MemoryStore::seeded());

        let result = h
            .pipeline
            .ingest_json(&serde_json::json!({"temperature": 37.0, "heartRate": "fast", "spo2": 98}))
            .await;

        assert!(!result.accepted);
        assert_eq!(result.status.http_code(), 400);
        assert_eq!(h.store.write_count(), 0);
    }
}
