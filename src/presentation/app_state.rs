// Application state for HTTP handlers
use crate::application::ingestion_service::IngestionService;
use crate::application::meter_service::MeterService;
use crate::application::query_service::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub query_service: QueryService,
    pub ingestion_service: IngestionService,
    pub meter_service: MeterService,
}
