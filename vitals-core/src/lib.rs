//! Vitals Core - reading model and pure pipeline logic
//!
//! Everything in this crate is free of I/O:
//!
//! - **Types**: metric identifiers, monthly aggregates, anchor entries
//! - **Aggregation**: folding a reading into a monthly summary
//! - **Outlier detection**: three-sigma rule over historical readings
//! - **Content hashing**: canonical serialization of a reading batch
//!
//! # Example
//!
//! ```
//! use vitals_core::{aggregate, outlier};
//!
//! let summary = aggregate::fold(None, "october", "2026-10-16", 37.0);
//! assert_eq!(summary.average, 37.0);
//!
//! assert!(!outlier::is_outlier(37.2, &[36.9, 37.0, 37.1]));
//! ```

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod hash;
pub mod outlier;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::ValidationError;
pub use hash::{content_hash, CanonicalBatch};
pub use outlier::{OutlierDetector, OutlierVerdict};
pub use types::*;
