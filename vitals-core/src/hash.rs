//! Content hashing of accepted reading batches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::SensorReading;

/// The canonical form of one accepted batch.
///
/// Field order is fixed by declaration order: temperature, heartRate, spo2,
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBatch {
    pub temperature: f64,
    pub heart_rate: f64,
    pub spo2: f64,
    /// Ingestion time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl CanonicalBatch {
    /// Batch for a reading ingested at `at`.
    pub fn new(reading: &SensorReading, at: DateTime<Utc>) -> Self {
        Self {
            temperature: reading.temperature,
            heart_rate: reading.heart_rate,
            spo2: reading.spo2,
            timestamp: at.timestamp_millis(),
        }
    }

    /// Compact JSON serialization used as hash input.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Lower-case hex SHA-256 of the canonical JSON.
    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        Ok(content_hash(self.canonical_json()?.as_bytes()))
    }
}

/// Lower-case hex SHA-256 of arbitrary bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
