use crate::models::ErrorRes;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use report_store_core::{ErrorKind, StoreError};

/// Failure of a REST handler, rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    /// Malformed request that never reached the store.
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::NotFound | ErrorKind::NotRendered => StatusCode::NOT_FOUND,
        ErrorKind::PathEscape => StatusCode::FORBIDDEN,
        ErrorKind::RenderFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Store(err) => {
                let kind = err.kind();
                let message = match kind {
                    ErrorKind::Storage => {
                        tracing::error!("Storage error: {:?}", err);
                        "Internal error".to_string()
                    }
                    // do not echo resolved filesystem paths back to callers
                    ErrorKind::PathEscape => "Invalid path".to_string(),
                    _ => {
                        tracing::debug!("Request failed: {}", err);
                        err.to_string()
                    }
                };
                (status_for(kind), message)
            }
        };

        (status, Json(ErrorRes { error: message })).into_response()
    }
}
