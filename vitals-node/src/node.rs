//! Node assembly: sled store, ledger client, anchor worker and pipeline.

use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use vitals_core::{MetricAggregate, MetricId, SystemClock};
use vitals_pipeline::ledger::{JsonRpcLedger, MockLedger};
use vitals_pipeline::store::{SledStore, SledStoreConfig};
use vitals_pipeline::{
    AggregateStore, AnchorWorker, IngestPipeline, IngestResult, LedgerClient, StatusClass,
    StoreError,
};

use crate::config::{Config, LedgerConfig, LedgerKind};

/// A running node.
pub struct Node {
    store: Arc<SledStore>,
    pipeline: IngestPipeline,
    ledger_reachable: bool,
}

impl Node {
    /// Open the store and start the anchor worker.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let db_path = config.node.db_path();
        info!("Opening store at {}", db_path.display());
        let store = Arc::new(
            SledStore::new(SledStoreConfig {
                db_path,
                ..Default::default()
            })
            .await?,
        );

        let ledger = build_ledger(&config.ledger)?;
        let ledger_reachable = ledger.is_available().await;
        if ledger_reachable {
            info!(ledger = %ledger.id(), "Ledger client ready");
        } else {
            warn!(ledger = %ledger.id(), "Ledger unreachable at startup; anchors will be retried on later ingestions");
        }

        let clock = Arc::new(SystemClock);
        let worker = AnchorWorker::spawn(
            ledger,
            store.clone(),
            clock.clone(),
            config.pipeline.worker_config(),
        );
        let pipeline = IngestPipeline::new(store.clone(), store.clone(), worker, clock)
            .with_config(config.pipeline.pipeline_config());

        Ok(Self {
            store,
            pipeline,
            ledger_reachable,
        })
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }

    pub fn store(&self) -> &SledStore {
        &self.store
    }

    /// Whether the ledger answered when the node opened.
    pub fn ledger_reachable(&self) -> bool {
        self.ledger_reachable
    }

    /// Provision missing aggregates.
    pub async fn seed(&self) -> Result<Vec<MetricId>, StoreError> {
        seed(self.store.as_ref()).await
    }

    /// Let in-flight anchors finish, then flush the store to disk.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.pipeline.anchor_worker().shutdown().await?;
        self.store.flush().await?;
        let stats = self.pipeline.anchor_worker().stats();
        info!(
            queued = stats.queued,
            anchored = stats.anchored,
            ledger_failures = stats.ledger_failures,
            log_failures = stats.log_failures,
            "Node stopped"
        );
        Ok(())
    }
}

/// Create an empty aggregate for every metric that has none.
///
/// Returns the metrics that were created; existing aggregates are untouched.
pub async fn seed(store: &dyn AggregateStore) -> Result<Vec<MetricId>, StoreError> {
    let mut created = Vec::new();
    for metric in MetricId::ALL {
        if store.get_aggregate(metric).await?.is_some() {
            debug!(metric = %metric, "Aggregate already provisioned");
            continue;
        }
        store
            .replace_aggregate(metric, &MetricAggregate::empty(metric))
            .await?;
        info!(metric = %metric, id = metric.doc_id(), "Provisioned aggregate");
        created.push(metric);
    }
    Ok(created)
}

/// Build the configured ledger client.
pub fn build_ledger(config: &LedgerConfig) -> anyhow::Result<Arc<dyn LedgerClient>> {
    match config.kind {
        LedgerKind::JsonRpc => Ok(Arc::new(JsonRpcLedger::new(config.json_rpc()?)?)),
        LedgerKind::Mock => Ok(Arc::new(MockLedger::default())),
    }
}

/// Counts from one stream run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub accepted: usize,
    pub rejected: usize,
}

/// Ingest one JSON reading per line, writing one result per line.
///
/// Lines are handled in order; blank lines are ignored.
pub async fn ingest_lines<R, W>(
    pipeline: &IngestPipeline,
    reader: R,
    mut writer: W,
) -> anyhow::Result<StreamSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = StreamSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(body) => pipeline.ingest_json(&body).await,
            Err(e) => IngestResult::rejected(StatusClass::ClientError, format!("Invalid JSON: {}", e)),
        };

        if result.accepted {
            summary.accepted += 1;
        } else {
            summary.rejected += 1;
        }

        let mut out = serde_json::to_vec(&result)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
    }

    writer.flush().await?;
    Ok(summary)
}
