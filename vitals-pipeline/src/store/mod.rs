//! Storage collaborators.
//!
//! Two narrow interfaces over a document store:
//! - `AggregateStore`: one aggregate document per metric, get and replace
//! - `AnchorLog`: append-only record of ledger anchors
//!
//! Implementations:
//! - In-memory store with fault injection for tests
//! - sled-backed store for the node

pub mod memory;
pub mod sled_store;
pub mod traits;

pub use memory::MemoryStore;
pub use sled_store::{SledStore, SledStoreConfig};
pub use traits::{AggregateStore, AnchorLog, StoreError};
