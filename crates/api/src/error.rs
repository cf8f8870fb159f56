//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use serde::Serialize;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The request body or its variables could not be read.
    BadRequest(String),
    /// The named operation does not exist.
    UnknownOperation(String),
    /// Domain logic error.
    Domain(DomainError),
}

/// One entry of the `errors` array.
#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, ErrorEntry) {
        let entry = |code, field| ErrorEntry {
            message: self.message(),
            code,
            field,
        };

        match self {
            ApiError::BadRequest(_) | ApiError::UnknownOperation(_) => {
                (StatusCode::BAD_REQUEST, entry("BAD_REQUEST", None))
            }
            ApiError::Domain(err) => match err {
                DomainError::Validation { field, .. } => (
                    StatusCode::BAD_REQUEST,
                    entry("VALIDATION_ERROR", Some(*field)),
                ),
                DomainError::InvalidInput(_) => {
                    (StatusCode::BAD_REQUEST, entry("INVALID_INPUT", None))
                }
                DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, entry("NOT_FOUND", None)),
                DomainError::DuplicateKey { .. } => {
                    (StatusCode::CONFLICT, entry("DUPLICATE_KEY", None))
                }
                DomainError::Store(_) => {
                    tracing::error!(error = %err, "internal server error");
                    (StatusCode::INTERNAL_SERVER_ERROR, entry("INTERNAL", None))
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::UnknownOperation(name) => format!("Unknown operation: {name}"),
            ApiError::Domain(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, entry) = self.parts();
        let body = serde_json::json!({ "data": null, "errors": [entry] });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(format!("Invalid variables: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_store::{StoreError, UniqueField};

    fn status_and_code(err: ApiError) -> (StatusCode, &'static str) {
        let (status, entry) = err.parts();
        (status, entry.code)
    }

    #[test]
    fn domain_errors_map_to_statuses() {
        assert_eq!(
            status_and_code(
                DomainError::Validation {
                    field: "email",
                    message: "bad".to_string()
                }
                .into()
            ),
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        );
        assert_eq!(
            status_and_code(DomainError::InvalidInput("no".to_string()).into()),
            (StatusCode::BAD_REQUEST, "INVALID_INPUT")
        );
        assert_eq!(
            status_and_code(
                DomainError::NotFound {
                    entity: "Order",
                    id: "x".to_string()
                }
                .into()
            ),
            (StatusCode::NOT_FOUND, "NOT_FOUND")
        );
        assert_eq!(
            status_and_code(
                DomainError::from(StoreError::DuplicateKey {
                    field: UniqueField::Email,
                    value: "ada@x.com".to_string(),
                })
                .into()
            ),
            (StatusCode::CONFLICT, "DUPLICATE_KEY")
        );
    }

    #[test]
    fn validation_errors_name_the_field() {
        let (_, entry) = ApiError::from(DomainError::Validation {
            field: "phone",
            message: "bad phone".to_string(),
        })
        .parts();
        assert_eq!(entry.field, Some("phone"));
        assert_eq!(entry.message, "bad phone");
    }

    #[test]
    fn unknown_operation_is_bad_request() {
        let (status, entry) = ApiError::UnknownOperation("dropTables".to_string()).parts();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(entry.message, "Unknown operation: dropTables");
    }
}
