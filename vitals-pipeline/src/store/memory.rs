//! In-memory store for tests and offline runs.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;

use vitals_core::{AnchorEntry, MetricAggregate, MetricId};

use super::traits::{check_aggregate_id, AggregateStore, AnchorLog, StoreError};

/// Aggregate store and anchor log held in memory.
///
/// Failures can be injected per metric (reads, writes) and for the anchor log
/// as a whole.
pub struct MemoryStore {
    aggregates: DashMap<MetricId, MetricAggregate>,
    anchors: RwLock<Vec<AnchorEntry>>,
    failing_reads: DashSet<MetricId>,
    failing_writes: DashSet<MetricId>,
    anchor_log_available: AtomicBool,
    write_count: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            aggregates: DashMap::new(),
            anchors: RwLock::new(Vec::new()),
            failing_reads: DashSet::new(),
            failing_writes: DashSet::new(),
            anchor_log_available: AtomicBool::new(true),
            write_count: AtomicU32::new(0),
        }
    }

    /// Create a store with an empty aggregate for every metric.
    pub fn seeded() -> Self {
        let store = Self::new();
        for metric in MetricId::ALL {
            store.insert_aggregate(metric, MetricAggregate::empty(metric));
        }
        store
    }

    /// Add an aggregate document.
    pub fn with_aggregate(self, metric: MetricId, aggregate: MetricAggregate) -> Self {
        self.insert_aggregate(metric, aggregate);
        self
    }

    /// Insert or overwrite an aggregate without going through the trait.
    pub fn insert_aggregate(&self, metric: MetricId, aggregate: MetricAggregate) {
        self.aggregates.insert(metric, aggregate);
    }

    /// Current aggregate, bypassing injected failures.
    pub fn aggregate(&self, metric: MetricId) -> Option<MetricAggregate> {
        self.aggregates.get(&metric).map(|a| a.value().clone())
    }

    /// Make reads of a metric's aggregate fail.
    pub fn fail_reads_for(&self, metric: MetricId) {
        self.failing_reads.insert(metric);
    }

    /// Make writes of a metric's aggregate fail.
    pub fn fail_writes_for(&self, metric: MetricId) {
        self.failing_writes.insert(metric);
    }

    /// Clear injected failures for a metric.
    pub fn heal(&self, metric: MetricId) {
        self.failing_reads.remove(&metric);
        self.failing_writes.remove(&metric);
    }

    /// Set anchor log availability.
    pub fn set_anchor_log_available(&self, available: bool) {
        self.anchor_log_available.store(available, Ordering::SeqCst);
    }

    /// Number of successful aggregate writes.
    pub fn write_count(&self) -> u32 {
        self.write_count.load(Ordering::SeqCst)
    }

    /// Number of anchor entries.
    pub async fn anchor_count(&self) -> usize {
        self.anchors.read().await.len()
    }

    fn ensure_anchor_log(&self) -> Result<(), StoreError> {
        if self.anchor_log_available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("anchor log disabled".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AggregateStore for MemoryStore {
    async fn get_aggregate(&self, metric: MetricId) -> Result<Option<MetricAggregate>, StoreError> {
        if self.failing_reads.contains(&metric) {
            return Err(StoreError::Unavailable(format!("reads of {} disabled", metric)));
        }
        Ok(self.aggregate(metric))
    }

    async fn replace_aggregate(
        &self,
        metric: MetricId,
        aggregate: &MetricAggregate,
    ) -> Result<(), StoreError> {
        check_aggregate_id(metric, aggregate)?;
        if self.failing_writes.contains(&metric) {
            return Err(StoreError::Unavailable(format!("writes of {} disabled", metric)));
        }

        self.aggregates.insert(metric, aggregate.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_aggregates(&self) -> Result<Vec<MetricAggregate>, StoreError> {
        Ok(MetricId::ALL
            .into_iter()
            .filter_map(|metric| self.aggregate(metric))
            .collect())
    }
}

#[async_trait]
impl AnchorLog for MemoryStore {
    async fn most_recent(&self) -> Result<Option<AnchorEntry>, StoreError> {
        self.ensure_anchor_log()?;
        Ok(self.anchors.read().await.last().cloned())
    }

    async fn append(&self, entry: AnchorEntry) -> Result<(), StoreError> {
        self.ensure_anchor_log()?;
        self.anchors.write().await.push(entry);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnchorEntry>, StoreError> {
        self.ensure_anchor_log()?;
        let anchors = self.anchors.read().await;
        Ok(anchors.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_seeded_store() {
        let store = MemoryStore::seeded();
        let all = store.list_aggregates().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "101");

        let spo2 = store.get_aggregate(MetricId::Spo2).await.unwrap().unwrap();
        assert_eq!(spo2.unit, "%");
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = MemoryStore::seeded();
        store.fail_reads_for(MetricId::HeartRate);
        store.fail_writes_for(MetricId::Spo2);

        assert!(store.get_aggregate(MetricId::HeartRate).await.is_err());
        assert!(store.get_aggregate(MetricId::Spo2).await.unwrap().is_some());

        let spo2 = MetricAggregate::empty(MetricId::Spo2);
        assert!(store.replace_aggregate(MetricId::Spo2, &spo2).await.is_err());
        assert_eq!(store.write_count(), 0);

        store.heal(MetricId::Spo2);
        store.replace_aggregate(MetricId::Spo2, &spo2).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_rejects_wrong_id() {
        let store = MemoryStore::seeded();
        let spo2 = MetricAggregate::empty(MetricId::Spo2);
        let err = store
            .replace_aggregate(MetricId::Temperature, &spo2)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IdMismatch { .. }));
    }

    #[tokio::test]
    async fn test_anchor_log_order() {
        let store = MemoryStore::new();
        assert!(store.most_recent().await.unwrap().is_none());

        let at = Utc::now();
        store.append(AnchorEntry::new("aa", "0x1", at)).await.unwrap();
        store.append(AnchorEntry::new("bb", "0x2", at)).await.unwrap();

        let latest = store.most_recent().await.unwrap().unwrap();
        assert_eq!(latest.content_hash, "bb");

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content_hash, "aa");

        store.set_anchor_log_available(false);
        assert!(store.most_recent().await.is_err());
    }
}
