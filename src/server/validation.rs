//! Input validation for the admin API.
//!
//! Device-facing endpoints deliberately validate nothing beyond JSON shape;
//! only administrator input is checked here.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::server::api_error::ApiError;

/// Longest license key or description the admin API accepts.
pub const MAX_FIELD_LENGTH: usize = 100;

/// Validation error type.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate that a string is not empty or whitespace only.
///
/// # Example
/// ```
/// use sufuss::server::validation::validate_not_empty;
///
/// assert!(validate_not_empty("hello", "name").is_ok());
/// assert!(validate_not_empty("", "name").is_err());
/// assert!(validate_not_empty("   ", "name").is_err());
/// ```
pub fn validate_not_empty(value: &str, field_name: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError {
            field: field_name.to_string(),
            message: "cannot be empty".to_string(),
        })
    } else {
        Ok(())
    }
}

/// Validate string length is within bounds.
///
/// # Example
/// ```
/// use sufuss::server::validation::validate_length;
///
/// assert!(validate_length("hello", 1, 10, "name").is_ok());
/// assert!(validate_length("", 1, 10, "name").is_err());
/// assert!(validate_length("a".repeat(100).as_str(), 1, 10, "name").is_err());
/// ```
pub fn validate_length(
    value: &str,
    min: usize,
    max: usize,
    field_name: &str,
) -> ValidationResult<()> {
    let len = value.chars().count();
    if len < min {
        Err(ValidationError {
            field: field_name.to_string(),
            message: format!("must be at least {} characters", min),
        })
    } else if len > max {
        Err(ValidationError {
            field: field_name.to_string(),
            message: format!("must be at most {} characters", max),
        })
    } else {
        Ok(())
    }
}

/// Validate a license key supplied by an administrator.
///
/// Keys are opaque, so only emptiness and length are checked.
pub fn validate_license_key(value: &str, field_name: &str) -> ValidationResult<()> {
    validate_not_empty(value, field_name)?;
    validate_length(value, 1, MAX_FIELD_LENGTH, field_name)
}

/// Parse an expiry date.
///
/// Accepts formats:
/// - Date only: `2025-12-31` (midnight UTC)
/// - RFC 3339: `2025-12-31T23:59:59Z`, converted to UTC
/// - Without timezone: `2025-12-31T23:59:59`, taken as UTC
pub fn parse_expiry_date(value: &str, field_name: &str) -> ValidationResult<NaiveDateTime> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt);
    }

    Err(ValidationError {
        field: field_name.to_string(),
        message: "invalid date format (expected: '2025-12-31' or '2025-12-31T23:59:59Z')"
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(validate_not_empty("hello", "field").is_ok());
        assert!(validate_not_empty("", "field").is_err());
        assert!(validate_not_empty("\t\n", "field").is_err());
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("hello", 1, 10, "field").is_ok());
        assert!(validate_length("", 1, 10, "field").is_err());
        assert!(validate_length("hello world", 1, 10, "field").is_err());
    }

    #[test]
    fn license_keys_are_opaque() {
        assert!(validate_license_key("SUFUSS-XXXX-YYYY-ZZZZ-DEMO1", "license_key").is_ok());
        assert!(validate_license_key("anything goes", "license_key").is_ok());
        assert!(validate_license_key(" ", "license_key").is_err());
        assert!(validate_license_key(&"K".repeat(101), "license_key").is_err());
    }

    #[test]
    fn expiry_date_formats() {
        let midnight = parse_expiry_date("2030-06-01", "expiry_date").unwrap();
        assert_eq!(midnight.to_string(), "2030-06-01 00:00:00");

        let offset = parse_expiry_date("2030-06-01T12:00:00+02:00", "expiry_date").unwrap();
        assert_eq!(offset.to_string(), "2030-06-01 10:00:00");

        let naive = parse_expiry_date("2030-06-01T12:30:00", "expiry_date").unwrap();
        assert_eq!(naive.to_string(), "2030-06-01 12:30:00");

        let err = parse_expiry_date("01/06/2030", "expiry_date").unwrap_err();
        assert_eq!(err.field, "expiry_date");
    }

    #[test]
    fn validation_error_becomes_invalid_field() {
        let err: ApiError = ValidationError {
            field: "expiry_date".to_string(),
            message: "bad".to_string(),
        }
        .into();
        assert_eq!(err.error.code, crate::server::api_error::ErrorCode::InvalidField);
    }
}
