use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use kindred_db::StoreError;
use kindred_types::error::ErrorKind;

/// Error type for HTTP handlers.
///
/// Wraps [`StoreError`] for domain failures and adds the few cases only the
/// HTTP surface can produce. Renders as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::SelfReference | ErrorKind::InvalidIdentifier | ErrorKind::InvalidMessage => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Store(StoreError::Conflict(existing)) => {
                let body = json!({
                    "error": self.to_string(),
                    "code": ErrorKind::Conflict.as_str(),
                    "existing": existing,
                });
                return (StatusCode::CONFLICT, axum::Json(body)).into_response();
            }
            ApiError::Store(err @ (StoreError::Database(_) | StoreError::Internal(_))) => {
                tracing::error!(error = %err, "Storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Internal.as_str(),
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Store(err) => {
                let kind = err.kind();
                (status_of(kind), kind.as_str(), err.to_string())
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorKind::Unauthorized.as_str(),
                "Missing or invalid credentials".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorKind::Internal.as_str(),
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kindred_db::Entity;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::SelfReference, StatusCode::BAD_REQUEST),
            (StoreError::NotFound(Entity::User), StatusCode::NOT_FOUND),
            (StoreError::Forbidden("nope"), StatusCode::FORBIDDEN),
            (StoreError::InvalidIdentifier("x".into()), StatusCode::BAD_REQUEST),
            (StoreError::UsernameTaken, StatusCode::CONFLICT),
            (StoreError::Internal("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
