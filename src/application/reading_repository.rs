// Repository trait for reading storage
use crate::domain::reading::{MeterSummary, Reading};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage query error: {0}")]
    Query(String),
}

/// Selection of readings. Bounds are inclusive; `None` leaves a side open.
#[derive(Debug, Clone, Default)]
pub struct ReadingFilter {
    pub meter_id: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    /// Maximum number of readings, most recent first. `None` is unbounded.
    pub limit: Option<usize>,
}

impl ReadingFilter {
    pub fn for_meter(meter_id: impl Into<String>) -> Self {
        Self {
            meter_id: Some(meter_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, reading: &Reading) -> bool {
        self.meter_id.as_deref().is_none_or(|m| m == reading.meter_id)
            && self.start.is_none_or(|s| reading.timestamp >= s)
            && self.end.is_none_or(|e| reading.timestamp <= e)
    }
}

#[async_trait]
pub trait ReadingRepository: Send + Sync {
    /// Readings matching `filter`, ordered by timestamp descending
    async fn fetch_readings(&self, filter: &ReadingFilter) -> Result<Vec<Reading>, StorageError>;

    /// Register a meter; registering an existing meter is a no-op
    async fn upsert_meter(&self, muid: &str) -> Result<(), StorageError>;

    /// Insert readings, skipping any whose (meter, instant) already exists.
    /// Returns the number of readings actually inserted.
    async fn bulk_insert_readings(&self, readings: &[Reading]) -> Result<usize, StorageError>;

    /// All registered meters with their reading counts, ordered by muid
    async fn list_meters(&self) -> Result<Vec<MeterSummary>, StorageError>;
}
