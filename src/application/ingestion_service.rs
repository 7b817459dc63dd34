// Ingestion service - Loads meter export files into the repository
use crate::application::error::{Result, ServiceError};
use crate::application::reading_repository::ReadingRepository;
use crate::domain::normalizer::{Normalizer, RawDocument};
use crate::infrastructure::config::IngestConfig;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub success: bool,
    /// Readings actually inserted; duplicates already stored are not counted
    pub records_processed: usize,
    /// Malformed records dropped (only when skipping is enabled)
    pub skipped: usize,
    pub muid: String,
}

#[derive(Clone)]
pub struct IngestionService {
    repository: Arc<dyn ReadingRepository>,
    normalizer: Normalizer,
    skip_malformed: bool,
}

impl IngestionService {
    pub fn new(repository: Arc<dyn ReadingRepository>, config: &IngestConfig) -> Self {
        Self {
            repository,
            normalizer: Normalizer::new(config.measurement_prefix.clone()),
            skip_malformed: config.skip_malformed,
        }
    }

    pub async fn ingest_file(&self, path: impl AsRef<Path>) -> Result<IngestionReport> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let document: RawDocument = serde_json::from_str(&content)
            .map_err(|e| ServiceError::InvalidDocument(format!("{}: {}", path.display(), e)))?;

        tracing::info!("Ingesting {}", path.display());
        self.ingest_document(document).await
    }

    pub async fn ingest_document(&self, document: RawDocument) -> Result<IngestionReport> {
        let records = document
            .data
            .filter(|records| !records.is_empty())
            .ok_or_else(|| ServiceError::InvalidDocument("'data' must be a non-empty array".to_string()))?;

        let mut readings = Vec::with_capacity(records.len());
        let mut skipped = 0;
        for (index, record) in records.iter().enumerate() {
            match self.normalizer.normalize(index, record) {
                Ok(reading) => readings.push(reading),
                Err(e) if self.skip_malformed => {
                    tracing::warn!("Skipping record: {}", e);
                    skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let muid = readings
            .first()
            .map(|r| r.meter_id.clone())
            .ok_or_else(|| ServiceError::InvalidDocument("no valid records".to_string()))?;

        let meters: BTreeSet<&str> = readings.iter().map(|r| r.meter_id.as_str()).collect();
        for meter in meters {
            self.repository.upsert_meter(meter).await?;
        }

        let inserted = self.repository.bulk_insert_readings(&readings).await?;
        tracing::info!(
            "Ingested {} of {} readings for {} ({} skipped)",
            inserted,
            readings.len(),
            muid,
            skipped
        );

        Ok(IngestionReport {
            success: true,
            records_processed: inserted,
            skipped,
            muid,
        })
    }
}
