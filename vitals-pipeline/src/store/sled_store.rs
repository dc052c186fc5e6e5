//! sled-backed aggregate store and anchor log.
//!
//! Aggregates are JSON documents keyed by their fixed id in the `aggregates`
//! tree. Anchor entries live in the `anchors` tree under big-endian ids from
//! `Db::generate_id`, so key order is insertion order.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use vitals_core::{AnchorEntry, MetricAggregate, MetricId};

use super::traits::{check_aggregate_id, AggregateStore, AnchorLog, StoreError};

/// Configuration for the sled store.
#[derive(Debug, Clone)]
pub struct SledStoreConfig {
    /// Path to sled database
    pub db_path: PathBuf,
    /// Cache size in bytes
    pub cache_size: u64,
}

impl Default for SledStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("vitals.sled"),
            cache_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Store backed by sled.
pub struct SledStore {
    db: sled::Db,
    aggregates: sled::Tree,
    anchors: sled::Tree,
}

impl SledStore {
    /// Open (or create) the store.
    pub async fn new(config: SledStoreConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }

        let db = sled::Config::new()
            .path(&config.db_path)
            .cache_capacity(config.cache_size)
            .open()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let aggregates = db
            .open_tree("aggregates")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let anchors = db
            .open_tree("anchors")
            .map_err(|e| StoreError::Database(e.to_string()))?;

        info!(path = %config.db_path.display(), "SledStore initialized");

        Ok(Self {
            db,
            aggregates,
            anchors,
        })
    }

    /// Open a store at a specific path.
    pub async fn at_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::new(SledStoreConfig {
            db_path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
        .await
    }

    /// Flush changes to disk.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush_async()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn decode_aggregate(bytes: &[u8]) -> Result<MetricAggregate, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode_anchor(bytes: &[u8]) -> Result<AnchorEntry, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl AggregateStore for SledStore {
    async fn get_aggregate(&self, metric: MetricId) -> Result<Option<MetricAggregate>, StoreError> {
        match self.aggregates.get(metric.doc_id().as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::decode_aggregate(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    async fn replace_aggregate(
        &self,
        metric: MetricId,
        aggregate: &MetricAggregate,
    ) -> Result<(), StoreError> {
        check_aggregate_id(metric, aggregate)?;

        let bytes =
            serde_json::to_vec(aggregate).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.aggregates
            .insert(metric.doc_id().as_bytes(), bytes)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(metric = %metric, months = aggregate.monthly_data.len(), "Aggregate replaced");
        Ok(())
    }

    async fn list_aggregates(&self) -> Result<Vec<MetricAggregate>, StoreError> {
        let mut aggregates = Vec::new();
        for metric in MetricId::ALL {
            if let Some(aggregate) = self.get_aggregate(metric).await? {
                aggregates.push(aggregate);
            }
        }
        Ok(aggregates)
    }
}

#[async_trait]
impl AnchorLog for SledStore {
    async fn most_recent(&self) -> Result<Option<AnchorEntry>, StoreError> {
        match self.anchors.last() {
            Ok(Some((_, bytes))) => Ok(Some(Self::decode_anchor(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }

    async fn append(&self, entry: AnchorEntry) -> Result<(), StoreError> {
        let sequence = self
            .db
            .generate_id()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let bytes =
            serde_json::to_vec(&entry).map_err(|e| StoreError::Serialization(e.to_string()))?;

        self.anchors
            .insert(sequence.to_be_bytes(), bytes)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(sequence, hash = %entry.content_hash, "Anchor entry appended");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AnchorEntry>, StoreError> {
        let mut entries = Vec::with_capacity(limit.min(64));
        for item in self.anchors.iter().rev().take(limit) {
            let (_, bytes) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            entries.push(Self::decode_anchor(&bytes)?);
        }
        Ok(entries)
    }
}
