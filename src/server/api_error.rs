//! Standardized API error responses for the structured endpoints.
//!
//! All error responses follow this JSON structure:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "LICENSE_NOT_FOUND",
//!     "message": "License key not found",
//!     "details": null
//!   }
//! }
//! ```
//!
//! Internal failure detail is never put in the body. It rides along as an
//! [`ErrorDetail`] response extension so the fail-open wrapper can log it.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::LicenseError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Not Found (404) ===
    /// License key was not found
    LicenseNotFound,
    /// Device was not found, or is not bound to the given license
    DeviceNotFound,
    /// Any other missing resource
    NotFound,

    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A field value is invalid
    InvalidField,
    /// The license key is already in use
    DuplicateLicenseKey,

    // === Authentication (401) ===
    /// Missing or wrong admin credentials
    Unauthorized,

    // === Server Errors (5xx) ===
    /// Database operation failed
    DatabaseError,
    /// Server configuration error
    ConfigError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::LicenseNotFound | ErrorCode::DeviceNotFound | ErrorCode::NotFound => {
                StatusCode::NOT_FOUND
            }
            ErrorCode::InvalidRequest
            | ErrorCode::InvalidField
            | ErrorCode::DuplicateLicenseKey => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::DatabaseError | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::LicenseNotFound => "License key not found",
            ErrorCode::DeviceNotFound => "Device not found",
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::DuplicateLicenseKey => "License key already exists",
            ErrorCode::Unauthorized => "Invalid username or password",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
    /// Server-side cause, logged but never serialized.
    #[serde(skip)]
    cause: Option<String>,
}

/// Server-side cause of a failed response, attached as a response extension.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
            cause: None,
        }
    }

    /// Creates a new API error with a custom message and details.
    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        let mut err = Self::with_message(code, message);
        err.error.details = Some(details);
        err
    }

    /// Record the server-side cause of this error.
    pub fn caused_by(mut self, cause: impl ToString) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    // === Convenience constructors for common errors ===

    pub fn license_not_found() -> Self {
        Self::new(ErrorCode::LicenseNotFound)
    }

    pub fn device_not_found() -> Self {
        Self::new(ErrorCode::DeviceNotFound)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::with_message(ErrorCode::NotFound, format!("{} not found", resource))
    }

    /// Invalid request error with field details.
    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("Invalid value for '{}': {}", field, reason),
            serde_json::json!({ "field": field }),
        )
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized)
    }

    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let cause = self.cause.clone();
        let mut response = (status, Json(self)).into_response();
        if let Some(cause) = cause {
            response.extensions_mut().insert(ErrorDetail(cause));
        }
        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error.code, self.error.message)
    }
}

impl std::error::Error for ApiError {}

// === Conversions from existing error types ===

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match &err {
            LicenseError::NotFound(what) => ApiError::not_found(what),
            LicenseError::Conflict(_) => ApiError::new(ErrorCode::DuplicateLicenseKey),
            LicenseError::ConfigError(_) => ApiError::new(ErrorCode::ConfigError).caused_by(&err),
            LicenseError::DatabaseError(_) => {
                ApiError::new(ErrorCode::DatabaseError).caused_by(&err)
            }
            LicenseError::ServerError(_) => ApiError::internal_error().caused_by(&err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(
            ErrorCode::LicenseNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::DuplicateLicenseKey.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn api_error_serialization_hides_cause() {
        let err = ApiError::new(ErrorCode::DatabaseError).caused_by("disk I/O error");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("DATABASE_ERROR"));
        assert!(!json.contains("disk I/O error"));
    }

    #[test]
    fn cause_is_attached_as_extension() {
        let response = ApiError::internal_error().caused_by("boom").into_response();
        let detail = response.extensions().get::<ErrorDetail>().unwrap();
        assert_eq!(detail.0, "boom");
    }

    #[test]
    fn not_found_names_the_resource() {
        let api_err: ApiError = LicenseError::NotFound("device 'dev-1'".into()).into();
        assert_eq!(api_err.error.code, ErrorCode::NotFound);
        assert_eq!(api_err.error.message, "device 'dev-1' not found");
        assert_eq!(api_err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_duplicate_key() {
        let api_err: ApiError = LicenseError::Conflict("UNIQUE constraint failed".into()).into();
        assert_eq!(api_err.error.code, ErrorCode::DuplicateLicenseKey);
        assert_eq!(api_err.status_code(), StatusCode::BAD_REQUEST);
    }
}
