// Application layer - Use cases over the reading repository
pub mod error;
pub mod ingestion_service;
pub mod meter_service;
pub mod query_service;
pub mod reading_repository;
