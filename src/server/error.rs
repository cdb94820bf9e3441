use crate::error::{ScanError, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Scan(ScanError::Store(e))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Scan(e) => match e {
                ScanError::NotAnImage { .. }
                | ScanError::FileTooLarge { .. }
                | ScanError::ImageDecode { .. } => StatusCode::BAD_REQUEST,
                ScanError::Unauthenticated => StatusCode::UNAUTHORIZED,
                ScanError::Forbidden(_) => StatusCode::FORBIDDEN,
                ScanError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
                ScanError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
                ScanError::Store(
                    StoreError::DuplicateName { .. }
                    | StoreError::MissingFields(_)
                    | StoreError::InvalidRating { .. },
                ) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = match &self {
            ApiError::Scan(ScanError::QuotaExceeded { used, limit }) => json!({
                "error": self.to_string(),
                "count": used,
                "limit": limit,
            }),
            ApiError::Scan(ScanError::BatchFailed { added, updated, .. }) => json!({
                "error": self.to_string(),
                "added": added,
                "updated": updated,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
