//! Core traits for ledger clients.
//!
//! This module defines the `LedgerClient` trait - the abstraction over the
//! external immutable ledger that content hashes are anchored to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Ledger is not available
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    /// Hash is not a 32-byte hex digest
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// The node rejected the request
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Transaction was mined but reverted
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// No receipt within the polling budget
    #[error("Timed out waiting for receipt of {0}")]
    ReceiptTimeout(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Parsing error
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Acknowledgement of an anchored hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    /// Opaque ledger reference (transaction hash)
    pub ledger_reference: String,
    /// Block the transaction was included in, when known
    pub block_number: Option<u64>,
}

impl LedgerReceipt {
    pub fn new(ledger_reference: impl Into<String>) -> Self {
        Self {
            ledger_reference: ledger_reference.into(),
            block_number: None,
        }
    }
}

/// Core trait for ledger clients.
///
/// Submitting the same hash twice must be safe; the ledger contract is
/// expected to reject or ignore duplicates.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Identifier of the ledger (network or contract).
    fn id(&self) -> &str;

    /// Check if the ledger is currently reachable.
    async fn is_available(&self) -> bool;

    /// Anchor a hex-encoded SHA-256 digest. May take arbitrarily long.
    async fn submit_hash(&self, hex_hash: &str) -> Result<LedgerReceipt, LedgerError>;
}

/// Decode a 32-byte hex digest, with or without `0x` prefix.
pub fn parse_hash(hex_hash: &str) -> Result<[u8; 32], LedgerError> {
    let digits = hex_hash.strip_prefix("0x").unwrap_or(hex_hash);
    let bytes = hex::decode(digits).map_err(|e| LedgerError::InvalidHash(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| LedgerError::InvalidHash(format!("expected 32 bytes, got {}", b.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hash() {
        let hex = "ab".repeat(32);
        assert_eq!(parse_hash(&hex).unwrap(), [0xab; 32]);
        assert_eq!(parse_hash(&format!("0x{}", hex)).unwrap(), [0xab; 32]);
        assert!(matches!(parse_hash("abcd"), Err(LedgerError::InvalidHash(_))));
        assert!(matches!(parse_hash("zz"), Err(LedgerError::InvalidHash(_))));
    }
}
