//! Core types for the vitals pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// One of the three tracked physiological metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetricId {
    /// Body temperature
    #[serde(rename = "temperature")]
    Temperature,
    /// Heart rate
    #[serde(rename = "heartRate")]
    HeartRate,
    /// Blood-oxygen saturation
    #[serde(rename = "spo2")]
    Spo2,
}

impl MetricId {
    /// All metrics, in the order they appear in a reading.
    pub const ALL: [MetricId; 3] = [MetricId::Temperature, MetricId::HeartRate, MetricId::Spo2];

    /// Wire name used in readings and hashes.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::Temperature => "temperature",
            MetricId::HeartRate => "heartRate",
            MetricId::Spo2 => "spo2",
        }
    }

    /// Fixed document id of this metric's aggregate.
    pub fn doc_id(&self) -> &'static str {
        match self {
            MetricId::Spo2 => "100",
            MetricId::Temperature => "101",
            MetricId::HeartRate => "102",
        }
    }

    /// Resolve a metric from its aggregate document id.
    pub fn from_doc_id(doc_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.doc_id() == doc_id)
    }

    /// Human readable metric name.
    pub fn display_name(&self) -> &'static str {
        match self {
            MetricId::Temperature => "Body Temperature",
            MetricId::HeartRate => "Heart Rate",
            MetricId::Spo2 => "Oxygen Saturation",
        }
    }

    /// Unit used when provisioning the aggregate.
    pub fn default_unit(&self) -> &'static str {
        match self {
            MetricId::Temperature => "°C",
            MetricId::HeartRate => "BPM",
            MetricId::Spo2 => "%",
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "temperature" | "bodytemperature" | "101" => Ok(MetricId::Temperature),
            "heartrate" | "heart-rate" | "102" => Ok(MetricId::HeartRate),
            "spo2" | "oxygensaturation" | "100" => Ok(MetricId::Spo2),
            other => Err(format!("unknown metric: {}", other)),
        }
    }
}

/// A single dated value inside a monthly summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Calendar date of the reading (`YYYY-MM-DD`)
    pub date: String,
    /// Observed value
    pub value: f64,
}

/// Derived statistics plus the readings of one metric in one calendar month.
///
/// `average`, `min` and `max` are only ever produced by
/// [`crate::aggregate::fold`] and always describe `readings` exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    /// Lower-case month label, e.g. `"october"`
    pub month: String,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub readings: Vec<Reading>,
}

impl MonthlySummary {
    /// Case-insensitive match on the month label.
    pub fn is_month(&self, month: &str) -> bool {
        self.month.eq_ignore_ascii_case(month)
    }
}

/// The aggregate document of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAggregate {
    /// Fixed document id (see [`MetricId::doc_id`])
    pub id: String,
    /// Display name of the metric
    pub metric: String,
    /// Display unit
    pub unit: String,
    /// Monthly summaries, unique by month label
    pub monthly_data: Vec<MonthlySummary>,
}

impl MetricAggregate {
    /// Provision an empty aggregate for a metric.
    pub fn empty(metric: MetricId) -> Self {
        Self {
            id: metric.doc_id().to_string(),
            metric: metric.display_name().to_string(),
            unit: metric.default_unit().to_string(),
            monthly_data: Vec::new(),
        }
    }

    /// Which metric this document belongs to, if the id is known.
    pub fn metric_id(&self) -> Option<MetricId> {
        MetricId::from_doc_id(&self.id)
    }

    /// Summary for a month, matched case-insensitively.
    pub fn month(&self, month: &str) -> Option<&MonthlySummary> {
        self.monthly_data.iter().find(|m| m.is_month(month))
    }

    /// Every stored reading value across all months.
    pub fn historical_values(&self) -> Vec<f64> {
        self.monthly_data
            .iter()
            .flat_map(|m| m.readings.iter().map(|r| r.value))
            .collect()
    }

    /// Total number of stored readings.
    pub fn reading_count(&self) -> usize {
        self.monthly_data.iter().map(|m| m.readings.len()).sum()
    }
}

/// A ledger anchor of one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorEntry {
    /// Unique entry ID
    pub id: String,
    /// Hex digest of the anchored batch
    pub content_hash: String,
    /// Reference returned by the ledger (transaction hash)
    pub ledger_reference: String,
    /// When the anchor was recorded
    pub created_at: DateTime<Utc>,
}

impl AnchorEntry {
    /// Create a new entry.
    pub fn new(
        content_hash: impl Into<String>,
        ledger_reference: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash: content_hash.into(),
            ledger_reference: ledger_reference.into(),
            created_at,
        }
    }
}

/// One reading triple from the device stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub temperature: f64,
    pub heart_rate: f64,
    pub spo2: f64,
}

impl SensorReading {
    /// Build a reading, rejecting non-finite values.
    pub fn new(temperature: f64, heart_rate: f64, spo2: f64) -> Result<Self, ValidationError> {
        let reading = Self {
            temperature,
            heart_rate,
            spo2,
        };
        reading.validate()?;
        Ok(reading)
    }

    /// Parse a reading from an untyped JSON body.
    ///
    /// Each field must be present and a finite JSON number.
    pub fn from_json(body: &serde_json::Value) -> Result<Self, ValidationError> {
        let object = body.as_object().ok_or(ValidationError::NotAnObject)?;

        let field = |metric: MetricId| -> Result<f64, ValidationError> {
            let value = object
                .get(metric.as_str())
                .filter(|v| !v.is_null())
                .ok_or(ValidationError::MissingField(metric))?;
            value
                .as_f64()
                .ok_or_else(|| ValidationError::NotNumeric {
                    metric,
                    found: value.to_string(),
                })
        };

        Self::new(
            field(MetricId::Temperature)?,
            field(MetricId::HeartRate)?,
            field(MetricId::Spo2)?,
        )
    }

    /// Check that every value is finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for metric in MetricId::ALL {
            let value = self.value(metric);
            if !value.is_finite() {
                return Err(ValidationError::NotFinite { metric, value });
            }
        }
        Ok(())
    }

    /// Value of one metric.
    pub fn value(&self, metric: MetricId) -> f64 {
        match metric {
            MetricId::Temperature => self.temperature,
            MetricId::HeartRate => self.heart_rate,
            MetricId::Spo2 => self.spo2,
        }
    }
}
