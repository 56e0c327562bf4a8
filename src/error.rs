// HTTP API error types and the mapping from arbitrary errors to responses
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::any::Any;
use thiserror::Error;

use crate::auth::AuthError;
use crate::backend::BackendError;
use crate::schema::{ErrorTree, SchemaError};

const GENERIC_MESSAGE: &str = "An error occurred while processing your request";

/// Errors a business function can raise to pick its own status code.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    ValidationError { message: String, fields: Option<ErrorTree> },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{0}")]
    InternalServerError(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    /// Explicit status and body, emitted verbatim.
    #[error("HTTP {status}")]
    Custom { status: StatusCode, body: Value },
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Custom { status, .. } => *status,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Custom { .. } => "CUSTOM",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, fields } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": self.error_code(),
                });
                if let Some(fields) = fields {
                    response["fields"] = json!(fields);
                }
                response
            }
            ApiError::Custom { body, .. } => body.clone(),
            _ => json!({
                "error": true,
                "message": self.to_string(),
                "code": self.error_code(),
            }),
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, fields: Option<ErrorTree>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            fields,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        ApiError::TooManyRequests(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    pub fn custom(status: StatusCode, body: Value) -> Self {
        ApiError::Custom { status, body }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

/// Status and body chosen for a failed invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub response: Value,
    pub status_code: StatusCode,
}

impl ErrorResponse {
    fn internal() -> Self {
        Self {
            response: json!({
                "error": true,
                "message": GENERIC_MESSAGE,
                "code": "INTERNAL_SERVER_ERROR",
            }),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(self.response)).into_response()
    }
}

/// Map any error to the response the caller sees.
///
/// Walks the error chain looking for a known kind; anything unrecognized becomes
/// an opaque 500.
pub fn map_error(err: &anyhow::Error) -> ErrorResponse {
    for cause in err.chain() {
        if let Some(api) = cause.downcast_ref::<ApiError>() {
            return ErrorResponse {
                response: api.to_json(),
                status_code: api.status_code(),
            };
        }
        if let Some(schema) = cause.downcast_ref::<SchemaError>() {
            return ErrorResponse {
                response: json!({ "error": schema.detail(), "message": "Invalid input" }),
                status_code: StatusCode::BAD_REQUEST,
            };
        }
        if let Some(AuthError::InvalidToken(_)) = cause.downcast_ref::<AuthError>() {
            let api = ApiError::unauthorized("Unauthorized");
            return ErrorResponse {
                response: api.to_json(),
                status_code: api.status_code(),
            };
        }
        if let Some(BackendError::NotFound { collection, id }) = cause.downcast_ref::<BackendError>() {
            let api = ApiError::not_found(format!("{}/{} not found", collection, id));
            return ErrorResponse {
                response: api.to_json(),
                status_code: api.status_code(),
            };
        }
    }
    ErrorResponse::internal()
}

/// Turn a caught panic payload into an error for logging. The message never
/// reaches a response body since it maps to an opaque 500.
pub fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("handler panicked: {}", message)
}
