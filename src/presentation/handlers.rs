// HTTP request handlers
use crate::application::error::ServiceError;
use crate::application::ingestion_service::IngestionReport;
use crate::application::query_service::{MeterAnalysis, MeterStatistics, ReadingsPage, ReadingsQuery};
use crate::domain::reading::MeterSummary;
use crate::infrastructure::http_response::ApiError;
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ReadingsParams {
    pub muid: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<String>,
    pub interval: Option<String>,
    pub method: Option<String>,
}

impl ReadingsParams {
    fn into_query(self) -> Result<ReadingsQuery, ServiceError> {
        Ok(ReadingsQuery {
            muid: self.muid.filter(|m| !m.is_empty()),
            start: self.start.as_deref().map(|s| parse_instant("start", s)).transpose()?,
            end: self.end.as_deref().map(|s| parse_instant("end", s)).transpose()?,
            limit: self.limit.as_deref().map(parse_limit).transpose()?,
            interval: self.interval.as_deref().map(parse_param).transpose()?,
            method: self.method.as_deref().map(parse_param).transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
}

fn parse_instant(name: &str, value: &str) -> Result<DateTime<FixedOffset>, ServiceError> {
    DateTime::parse_from_rfc3339(value).map_err(|e| {
        ServiceError::InvalidParameter(format!("'{}' is not an RFC 3339 instant ({}): {}", name, value, e))
    })
}

fn parse_limit(value: &str) -> Result<usize, ServiceError> {
    value.trim().parse().map_err(|_| {
        ServiceError::InvalidParameter(format!("'limit' must be a non-negative integer, got '{}'", value))
    })
}

fn parse_param<T: FromStr<Err = String>>(value: &str) -> Result<T, ServiceError> {
    value.parse().map_err(ServiceError::InvalidParameter)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Readings for a meter and range, raw or bucketed
pub async fn get_readings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadingsParams>,
) -> Result<Json<ReadingsPage>, ApiError> {
    let query = params.into_query()?;
    let page = state.query_service.query_readings(query).await?;
    Ok(Json(page))
}

pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    Path(muid): Path<String>,
) -> Result<Json<MeterStatistics>, ApiError> {
    Ok(Json(state.query_service.statistics(&muid).await?))
}

/// Statistics, autocorrelation profile and daily pattern for a meter
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(muid): Path<String>,
) -> Result<Json<MeterAnalysis>, ApiError> {
    Ok(Json(state.query_service.analyze(&muid).await?))
}

pub async fn list_meters(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MeterSummary>>, ApiError> {
    Ok(Json(state.meter_service.list_meters().await?))
}

/// Ingest a meter export file from the server's filesystem
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestionReport>, ApiError> {
    let path = request
        .file_path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ServiceError::InvalidParameter("filePath is required".to_string()))?;

    Ok(Json(state.ingestion_service.ingest_file(path).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ingestion_service::IngestionService;
    use crate::application::meter_service::MeterService;
    use crate::application::query_service::{QueryData, QueryService};
    use crate::application::reading_repository::ReadingRepository;
    use crate::domain::bucket::{AggregationMethod, Interval};
    use crate::domain::reading::{Quality, Reading};
    use crate::infrastructure::config::{AnalysisConfig, IngestConfig, QueryConfig};
    use crate::infrastructure::memory_repository::InMemoryRepository;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    async fn state() -> Arc<AppState> {
        let repository = Arc::new(InMemoryRepository::new());
        let start = DateTime::parse_from_rfc3339("2023-02-01T10:00:00+01:00").unwrap();
        let readings: Vec<Reading> = (0..3)
            .map(|i| {
                Reading::new(
                    "m1",
                    start + chrono::TimeDelta::minutes(15 * i),
                    [5.0, 0.0, 3.0][i as usize],
                    Quality::Measured,
                )
            })
            .collect();
        repository.bulk_insert_readings(&readings).await.unwrap();

        Arc::new(AppState {
            query_service: QueryService::new(
                repository.clone(),
                QueryConfig::default(),
                AnalysisConfig::default(),
            ),
            ingestion_service: IngestionService::new(repository.clone(), &IngestConfig::default()),
            meter_service: MeterService::new(repository),
        })
    }

    #[test]
    fn test_params_into_query() {
        let params = ReadingsParams {
            muid: Some("m1".to_string()),
            start: Some("2023-02-01T00:00:00Z".to_string()),
            interval: Some("1day".to_string()),
            method: Some("average".to_string()),
            ..ReadingsParams::default()
        };

        let query = params.into_query().unwrap();
        assert_eq!(query.interval, Some(Interval::Day));
        assert_eq!(query.method, Some(AggregationMethod::Average));
        assert!(query.start.is_some());
        assert!(query.end.is_none());
    }

    #[test]
    fn test_bad_params_are_rejected() {
        let params = ReadingsParams {
            start: Some("last tuesday".to_string()),
            ..ReadingsParams::default()
        };
        assert!(matches!(params.into_query(), Err(ServiceError::InvalidParameter(_))));

        let params = ReadingsParams {
            interval: Some("fortnightly".to_string()),
            ..ReadingsParams::default()
        };
        assert!(matches!(params.into_query(), Err(ServiceError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn test_non_numeric_limit_is_json_bad_request() {
        let params = ReadingsParams {
            muid: Some("m1".to_string()),
            limit: Some("abc".to_string()),
            ..ReadingsParams::default()
        };

        let response = get_readings(State(state().await), Query(params))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("limit"));

        let params = ReadingsParams {
            limit: Some("2".to_string()),
            ..ReadingsParams::default()
        };
        assert_eq!(params.into_query().unwrap().limit, Some(2));
    }

    #[tokio::test]
    async fn test_get_readings_hourly() {
        let params = ReadingsParams {
            muid: Some("m1".to_string()),
            interval: Some("1hour".to_string()),
            ..ReadingsParams::default()
        };

        let Json(page) = get_readings(State(state().await), Query(params)).await.unwrap();
        let QueryData::Buckets(buckets) = page.data else {
            panic!("expected buckets");
        };
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 3);
        assert!((buckets[0].aggregate - 2.6667).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_inverted_range_is_bad_request() {
        let params = ReadingsParams {
            start: Some("2023-02-02T00:00:00Z".to_string()),
            end: Some("2023-02-01T00:00:00Z".to_string()),
            ..ReadingsParams::default()
        };

        let err = get_readings(State(state().await), Query(params)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_statistics_of_unknown_meter_is_not_found() {
        let err = get_statistics(State(state().await), Path("nope".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ingest_requires_file_path() {
        let err = ingest(State(state().await), Json(IngestRequest { file_path: None }))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
