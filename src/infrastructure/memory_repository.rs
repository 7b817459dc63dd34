// In-memory repository implementation
use crate::application::reading_repository::{ReadingFilter, ReadingRepository, StorageError};
use crate::domain::reading::{MeterSummary, Reading};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::collections::{BTreeMap, btree_map::Entry};
use tokio::sync::RwLock;

/// Readings per meter, keyed by instant so a second reading for the same
/// meter and instant is a duplicate.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    meters: RwLock<BTreeMap<String, BTreeMap<DateTime<FixedOffset>, Reading>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadingRepository for InMemoryRepository {
    async fn fetch_readings(&self, filter: &ReadingFilter) -> Result<Vec<Reading>, StorageError> {
        let meters = self.meters.read().await;

        let mut readings: Vec<Reading> = meters
            .iter()
            .filter(|(muid, _)| filter.meter_id.as_deref().is_none_or(|m| m == muid.as_str()))
            .flat_map(|(_, readings)| readings.values())
            .filter(|reading| filter.matches(reading))
            .cloned()
            .collect();

        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = filter.limit {
            readings.truncate(limit);
        }
        Ok(readings)
    }

    async fn upsert_meter(&self, muid: &str) -> Result<(), StorageError> {
        let mut meters = self.meters.write().await;
        meters.entry(muid.to_string()).or_default();
        Ok(())
    }

    async fn bulk_insert_readings(&self, readings: &[Reading]) -> Result<usize, StorageError> {
        let mut meters = self.meters.write().await;
        let mut inserted = 0;

        for reading in readings {
            let series = meters.entry(reading.meter_id.clone()).or_default();
            if let Entry::Vacant(slot) = series.entry(reading.timestamp) {
                slot.insert(reading.clone());
                inserted += 1;
            }
        }

        tracing::debug!(
            "Inserted {} readings, skipped {} duplicates",
            inserted,
            readings.len() - inserted
        );
        Ok(inserted)
    }

    async fn list_meters(&self) -> Result<Vec<MeterSummary>, StorageError> {
        let meters = self.meters.read().await;
        Ok(meters
            .iter()
            .map(|(muid, readings)| MeterSummary {
                muid: muid.clone(),
                reading_count: readings.len(),
            })
            .collect())
    }
}
