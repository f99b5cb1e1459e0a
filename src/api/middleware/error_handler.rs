//! `AppError` to HTTP response mapping.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::dto::ErrorResponse;
use crate::error::AppError;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Duplicate { .. } => StatusCode::CONFLICT,
            AppError::Validation { .. }
            | AppError::ValidationErrors { .. }
            | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::UnprocessableContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ConnectionPool { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database { .. } | AppError::Configuration { .. } | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Duplicate { .. } => "DUPLICATE_ENTRY",
            AppError::Validation { .. } | AppError::ValidationErrors { .. } => "VALIDATION_ERROR",
            AppError::BadRequest { .. } => "BAD_REQUEST",
            AppError::UnprocessableContent { .. } => "UNPROCESSABLE_CONTENT",
            AppError::Database { .. } => "DATABASE_ERROR",
            AppError::Configuration { .. } => "CONFIGURATION_ERROR",
            AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Server-side failures are logged in full and answered with a sanitized message.
        let body = match self {
            AppError::NotFound { entity, field, value } => {
                ErrorResponse::new(code, format!("{} not found", entity))
                    .with_details(json!({ "field": field, "value": value }))
            }
            AppError::Duplicate { entity, field, value } => {
                ErrorResponse::new(code, format!("{}.{} already exists", entity, field))
                    .with_details(json!({ "value": value }))
            }
            AppError::Validation { field, reason } => {
                ErrorResponse::new(code, "Request validation failed")
                    .with_details(json!({ "field": field, "reason": reason }))
            }
            AppError::ValidationErrors { errors } => {
                ErrorResponse::new(code, "Request validation failed").with_errors(errors)
            }
            AppError::BadRequest { message } | AppError::UnprocessableContent { message } => {
                ErrorResponse::new(code, message)
            }
            AppError::ConnectionPool { ref source } => {
                tracing::error!(error = %source, "Store unavailable");
                ErrorResponse::new(code, "Store temporarily unavailable")
            }
            ref err @ (AppError::Database { .. }
            | AppError::Configuration { .. }
            | AppError::Internal { .. }) => {
                tracing::error!(error = ?err, "Request failed");
                ErrorResponse::new(code, "An internal error occurred")
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match &rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Expected request with `Content-Type: application/json`".to_string()
            }
            _ => rejection.body_text(),
        };
        AppError::BadRequest { message }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest {
            message: rejection.body_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_of(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::not_found("Job", "id", 1), StatusCode::NOT_FOUND),
            (AppError::validation("priority", "too high"), StatusCode::BAD_REQUEST),
            (
                AppError::UnprocessableContent { message: "not pending".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::ConnectionPool { source: anyhow::anyhow!("timed out") },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::Internal { source: anyhow::anyhow!("boom") },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_are_sanitized() {
        let response = AppError::Database {
            operation: "claim job".into(),
            source: anyhow::anyhow!("password authentication failed"),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["code"], "DATABASE_ERROR");
        assert!(!body.to_string().contains("password"));
    }

    #[tokio::test]
    async fn test_not_found_body_carries_lookup_key() {
        let response = AppError::not_found("Batch", "id", "abc").into_response();
        let body = body_of(response).await;
        assert_eq!(body["message"], "Batch not found");
        assert_eq!(body["details"]["value"], "abc");
    }
}
