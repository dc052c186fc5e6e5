//! Monthly aggregation.
//!
//! A reading is folded into the summary of its calendar month. Statistics are
//! always recomputed from the full reading list; there is no running update.

use chrono::{DateTime, Utc};

use crate::types::{MetricAggregate, MonthlySummary, Reading};

/// Normalized month label for a timestamp, e.g. `"october"`.
pub fn month_label(at: DateTime<Utc>) -> String {
    at.format("%B").to_string().to_lowercase()
}

/// Calendar date label for a timestamp, e.g. `"2026-10-16"`.
pub fn date_label(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Fold a reading into a monthly summary.
///
/// With no existing summary a new one is created for `month`. The returned
/// summary's `min`, `max` and `average` describe its readings exactly.
pub fn fold(summary: Option<MonthlySummary>, month: &str, date: &str, value: f64) -> MonthlySummary {
    let reading = Reading {
        date: date.to_string(),
        value,
    };

    match summary {
        None => MonthlySummary {
            month: month.to_lowercase(),
            average: value,
            min: value,
            max: value,
            readings: vec![reading],
        },
        Some(mut summary) => {
            summary.month = month.to_lowercase();
            summary.readings.push(reading);
            recompute(&mut summary);
            summary
        }
    }
}

fn recompute(summary: &mut MonthlySummary) {
    let values = summary.readings.iter().map(|r| r.value);

    let (min, max, sum) = values.fold(
        (f64::INFINITY, f64::NEG_INFINITY, 0.0_f64),
        |(min, max, sum), v| (min.min(v), max.max(v), sum + v),
    );
    let mean = sum / summary.readings.len() as f64;

    summary.min = min;
    summary.max = max;
    // Summation error must not push the mean outside the extrema
    summary.average = mean.clamp(min, max);
}

impl MetricAggregate {
    /// Fold a reading into this aggregate's summary for `month`.
    ///
    /// The matching summary (case-insensitive) is replaced in place; when none
    /// exists a new one is appended. Month labels stay unique.
    pub fn record(&mut self, month: &str, date: &str, value: f64) -> &MonthlySummary {
        match self.monthly_data.iter().position(|m| m.is_month(month)) {
            Some(index) => {
                let current = self.monthly_data[index].clone();
                self.monthly_data[index] = fold(Some(current), month, date, value);
                &self.monthly_data[index]
            }
            None => {
                self.monthly_data.push(fold(None, month, date, value));
                let last = self.monthly_data.len() - 1;
                &self.monthly_data[last]
            }
        }
    }
}
