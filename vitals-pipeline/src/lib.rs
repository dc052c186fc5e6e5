//! Vitals Pipeline - ingestion, aggregation and ledger anchoring
//!
//! Coordinates the pure logic from `vitals-core` with its collaborators:
//! - Trait-based aggregate store and anchor log (in-memory, sled)
//! - Trait-based ledger clients (Ethereum JSON-RPC, mock)
//! - A background anchor worker that detaches ledger submissions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            IngestPipeline               │
//! │  read → validate → aggregate → hash     │
//! └───────┬──────────────┬──────────────────┘
//!         │              │ dedup miss
//!         ▼              ▼
//! ┌──────────────┐ ┌─────────────┐    ┌──────────────┐
//! │AggregateStore│ │ AnchorWorker│───▶│ LedgerClient │
//! │  AnchorLog   │◀┤ (detached)  │    │ (JSON-RPC)   │
//! └──────────────┘ └─────────────┘    └──────────────┘
//! ```

pub mod anchor;
pub mod ledger;
pub mod pipeline;
pub mod result;
pub mod store;

// Re-export main types for convenience
pub use anchor::{AnchorHandle, AnchorStats, AnchorWorker, AnchorWorkerConfig, DispatchError};
pub use ledger::{LedgerClient, LedgerError, LedgerReceipt};
pub use pipeline::{IngestError, IngestPipeline, PipelineConfig};
pub use result::{AnchorStatus, IngestResult, MetricWriteError, SkippedMetric, StatusClass};
pub use store::{AggregateStore, AnchorLog, StoreError};
