use thiserror::Error;

/// Crate-wide error type.
///
/// Handlers convert this into an HTTP response through
/// `server::api_error::ApiError`.
#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("server error: {0}")]
    ServerError(String),
}

pub type LicenseResult<T> = Result<T, LicenseError>;

impl From<sqlx::Error> for LicenseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                LicenseError::Conflict(db_err.message().to_string())
            }
            _ => LicenseError::DatabaseError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_resource() {
        let err = LicenseError::NotFound("device 'dev-1'".to_string());
        assert_eq!(err.to_string(), "device 'dev-1' not found");
    }

    #[test]
    fn row_not_found_maps_to_database_error() {
        let err: LicenseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, LicenseError::DatabaseError(_)));
    }
}
