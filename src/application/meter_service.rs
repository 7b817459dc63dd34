// Meter service - Use case for listing meters
use crate::application::error::Result;
use crate::application::reading_repository::ReadingRepository;
use crate::domain::reading::MeterSummary;
use std::sync::Arc;

#[derive(Clone)]
pub struct MeterService {
    repository: Arc<dyn ReadingRepository>,
}

impl MeterService {
    pub fn new(repository: Arc<dyn ReadingRepository>) -> Self {
        Self { repository }
    }

    pub async fn list_meters(&self) -> Result<Vec<MeterSummary>> {
        Ok(self.repository.list_meters().await?)
    }
}
