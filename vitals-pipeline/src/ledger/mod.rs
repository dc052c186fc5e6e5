//! Ledger client abstraction layer.
//!
//! Provides a trait-based interface for anchoring content hashes:
//! - Ethereum JSON-RPC (`storeReading(bytes32)` contract call)
//! - Mock ledger for testing and offline runs

pub mod jsonrpc;
pub mod mock;
pub mod traits;

pub use jsonrpc::{JsonRpcLedger, JsonRpcLedgerConfig};
pub use mock::MockLedger;
pub use traits::{LedgerClient, LedgerError, LedgerReceipt};
