//! vitals-node: ingests vital-sign readings into monthly aggregates and
//! anchors each accepted batch to a ledger.

pub mod config;
pub mod node;

pub use config::Config;
pub use node::Node;
