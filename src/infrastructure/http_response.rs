// HTTP response utilities for JSON payloads and service errors
use crate::application::error::ServiceError;
use crate::domain::error::AnalysisError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Wraps `ServiceError` so it can be returned straight from handlers
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidRange { .. }
        | ServiceError::InvalidParameter(_)
        | ServiceError::InvalidDocument(_)
        | ServiceError::Io(_) => StatusCode::BAD_REQUEST,
        ServiceError::Analysis(AnalysisError::MalformedRecord { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Analysis(AnalysisError::EmptyInput) => StatusCode::NOT_FOUND,
        ServiceError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        (
            status,
            Json(ErrorBody {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
