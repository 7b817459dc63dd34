// Reading and meter domain models
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Confidence the metering point attaches to a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Measured,
    Estimated,
    Unknown,
}

impl Quality {
    /// Unrecognised labels map to `Unknown` rather than failing the record.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "measured" => Quality::Measured,
            "estimated" => Quality::Estimated,
            _ => Quality::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Measured => "measured",
            Quality::Estimated => "estimated",
            Quality::Unknown => "unknown",
        }
    }
}

/// A single timestamped measurement from one meter.
///
/// The timestamp keeps the UTC offset it was recorded with; bucketing
/// relies on it to find local hour and day boundaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(rename = "muid")]
    pub meter_id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
    pub quality: Quality,
}

impl Reading {
    pub fn new(
        meter_id: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        value: f64,
        quality: Quality,
    ) -> Self {
        Self {
            meter_id: meter_id.into(),
            timestamp,
            value,
            quality,
        }
    }
}

/// A meter as listed by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSummary {
    pub muid: String,
    pub reading_count: usize,
}

/// Oldest and newest instant of a set of readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
}

impl TimeRange {
    pub fn of(readings: &[Reading]) -> Self {
        let start = readings.iter().map(|r| r.timestamp).min();
        let end = readings.iter().map(|r| r.timestamp).max();
        Self { start, end }
    }
}
