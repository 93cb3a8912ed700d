use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use aegis_db::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid email or password")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("internal server error")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Duplicate(what) => ApiError::Conflict(format!("{} already exists", what)),
            StoreError::CapacityExceeded => {
                ApiError::Conflict("trusted contact limit reached (max 3 active)".into())
            }
            StoreError::InvalidTransition => {
                ApiError::Conflict("alert is no longer active".into())
            }
            StoreError::InvalidInput(detail) => ApiError::Validation(detail),
            StoreError::Sqlite(e) => ApiError::Internal(e.to_string()),
            StoreError::Internal(e) => ApiError::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Validation(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "resource not found".into()),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, detail.clone()),
            ApiError::Internal(detail) => {
                // Details go to the log, not to the client.
                error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "an internal server error occurred".into(),
                )
            }
        };

        let body = Json(json!({
            "error": { "message": message }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
