// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::ingestion_service::IngestionService;
use crate::application::meter_service::MeterService;
use crate::application::query_service::QueryService;
use crate::application::reading_repository::ReadingRepository;
use crate::infrastructure::config::{StorageBackend, StorageConfig, load_service_config};
use crate::infrastructure::influx_repository::InfluxRepository;
use crate::infrastructure::memory_repository::InMemoryRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    get_analysis, get_readings, get_statistics, health_check, ingest, list_meters,
};

fn build_repository(storage: &StorageConfig) -> anyhow::Result<Arc<dyn ReadingRepository>> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory reading storage");
            Ok(Arc::new(InMemoryRepository::new()))
        }
        StorageBackend::Influx => {
            let influx = storage
                .influx
                .clone()
                .ok_or_else(|| anyhow::anyhow!("missing [storage.influx] settings"))?;
            tracing::info!("Using InfluxDB reading storage at {}", influx.host);
            Ok(Arc::new(InfluxRepository::new(
                influx.host,
                influx.token,
                influx.database,
                influx.retention_policy,
            )))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = load_service_config()?;

    // Initialize tracing; RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Create repository (infrastructure layer)
    let repository = build_repository(&config.storage)?;

    // Create services (application layer)
    let query_service =
        QueryService::new(repository.clone(), config.query.clone(), config.analysis.clone());
    let ingestion_service = IngestionService::new(repository.clone(), &config.ingest);
    let meter_service = MeterService::new(repository);

    let state = Arc::new(AppState {
        query_service,
        ingestion_service,
        meter_service,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/api/energy/readings", get(get_readings))
        .route("/api/energy/statistics/:muid", get(get_statistics))
        .route("/api/energy/analysis/:muid", get(get_analysis))
        .route("/api/energy/meters", get(list_meters))
        .route("/api/energy/ingest", post(ingest))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting meter-analytics service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
