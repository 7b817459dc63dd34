// Descriptive statistics over value series
use super::error::AnalysisError;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// Readings strictly greater than zero; negative values (export) do not count.
    pub non_zero_count: usize,
    pub total: usize,
}

impl StatsSummary {
    pub fn non_zero_ratio(&self) -> f64 {
        self.non_zero_count as f64 / self.total as f64
    }
}

/// Population statistics (divides by N) over `values`.
pub fn summarize(values: &[f64]) -> Result<StatsSummary, AnalysisError> {
    if values.is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let total = values.len();
    let mean = values.iter().sum::<f64>() / total as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / total as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(StatsSummary {
        min,
        max,
        mean,
        std_dev: variance.sqrt(),
        non_zero_count: values.iter().filter(|v| **v > 0.0).count(),
        total,
    })
}

/// Mean gap between consecutive instants, in minutes. `None` below two instants.
pub fn mean_interval_minutes(timestamps: &[DateTime<FixedOffset>]) -> Option<f64> {
    if timestamps.len() < 2 {
        return None;
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort();

    let gaps: i64 = sorted
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds())
        .sum();
    Some(gaps as f64 / (sorted.len() - 1) as f64 / 60_000.0)
}
