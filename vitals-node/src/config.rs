//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use vitals_pipeline::ledger::JsonRpcLedgerConfig;
use vitals_pipeline::{AnchorWorkerConfig, PipelineConfig};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl NodeConfig {
    /// Location of the sled database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("vitals.sled")
    }
}

/// Ingestion and anchoring tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Outlier threshold in standard deviations
    #[serde(default = "default_outlier_sigma")]
    pub outlier_sigma: f64,

    /// Queued anchor submissions before new ones are left pending
    #[serde(default = "default_anchor_queue_capacity")]
    pub anchor_queue_capacity: usize,

    /// Concurrent ledger submissions
    #[serde(default = "default_anchor_max_in_flight")]
    pub anchor_max_in_flight: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            outlier_sigma: default_outlier_sigma(),
            anchor_queue_capacity: default_anchor_queue_capacity(),
            anchor_max_in_flight: default_anchor_max_in_flight(),
        }
    }
}

impl PipelineSection {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            outlier_sigma: self.outlier_sigma,
        }
    }

    pub fn worker_config(&self) -> AnchorWorkerConfig {
        AnchorWorkerConfig {
            queue_capacity: self.anchor_queue_capacity,
            max_in_flight: self.anchor_max_in_flight,
        }
    }
}

/// Which ledger client the node uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerKind {
    JsonRpc,
    #[default]
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub kind: LedgerKind,

    /// Node RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Hash storage contract address
    #[serde(default)]
    pub contract_address: Option<String>,

    /// Sending account address
    #[serde(default)]
    pub from_address: Option<String>,

    /// Gas limit (node estimate when unset)
    #[serde(default)]
    pub gas: Option<u64>,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub wait_for_receipt: bool,

    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    #[serde(default = "default_receipt_max_polls")]
    pub receipt_max_polls: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            kind: LedgerKind::default(),
            rpc_url: default_rpc_url(),
            contract_address: None,
            from_address: None,
            gas: None,
            request_timeout_ms: default_request_timeout_ms(),
            wait_for_receipt: true,
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            receipt_max_polls: default_receipt_max_polls(),
        }
    }
}

impl LedgerConfig {
    /// JSON-RPC client settings; contract and sender must be set.
    pub fn json_rpc(&self) -> Result<JsonRpcLedgerConfig, ConfigError> {
        let contract_address = self.contract_address.clone().ok_or_else(|| {
            ConfigError::Invalid("ledger.contract_address is required for json-rpc".to_string())
        })?;
        let from_address = self.from_address.clone().ok_or_else(|| {
            ConfigError::Invalid("ledger.from_address is required for json-rpc".to_string())
        })?;

        Ok(JsonRpcLedgerConfig {
            rpc_url: self.rpc_url.clone(),
            contract_address,
            from_address,
            gas: self.gas,
            request_timeout_ms: self.request_timeout_ms,
            wait_for_receipt: self.wait_for_receipt,
            receipt_poll_interval_ms: self.receipt_poll_interval_ms,
            receipt_max_polls: self.receipt_max_polls,
        })
    }
}

impl Config {
    /// Load from a TOML file, or defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Check values the types cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pipeline.outlier_sigma.is_finite() || self.pipeline.outlier_sigma <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "pipeline.outlier_sigma must be a positive number, got {}",
                self.pipeline.outlier_sigma
            )));
        }
        if self.pipeline.anchor_queue_capacity == 0 || self.pipeline.anchor_max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "anchor queue capacity and in-flight limit must be at least 1".to_string(),
            ));
        }
        if self.ledger.kind == LedgerKind::JsonRpc {
            self.ledger.json_rpc()?;
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf { PathBuf::from("./vitals-data") }
fn default_outlier_sigma() -> f64 { vitals_core::outlier::DEFAULT_SIGMA }
fn default_anchor_queue_capacity() -> usize { 256 }
fn default_anchor_max_in_flight() -> usize { 4 }
fn default_rpc_url() -> String { "http://127.0.0.1:8545".to_string() }
fn default_request_timeout_ms() -> u64 { 30_000 }
fn default_true() -> bool { true }
fn default_receipt_poll_interval_ms() -> u64 { 2_000 }
fn default_receipt_max_polls() -> u32 { 90 }
