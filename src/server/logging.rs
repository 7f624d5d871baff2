//! Request logging middleware and structured license events.
//!
//! Every request gets:
//! - A unique request ID, echoed back in `X-Request-Id`
//! - A tracing span carrying method and path
//! - Start and completion log lines with status and timing
//!
//! # Usage
//!
//! ```rust,ignore
//! use sufuss::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// License and device state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// License was created through the admin API or seeding
    Created,
    /// License was edited through the admin API
    Updated,
    /// License was deleted along with its devices and services
    Deleted,
    /// License was validated successfully
    Validated,
    /// License validation failed
    ValidationFailed,
    /// Device was bound to a license
    Activated,
    /// Activation was refused
    ActivationFailed,
    /// Device asked for its license status
    StatusChecked,
    /// Device was registered
    DeviceRegistered,
    /// Device reported in
    Heartbeat,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Created => "created",
            LicenseEvent::Updated => "updated",
            LicenseEvent::Deleted => "deleted",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::Activated => "activated",
            LicenseEvent::ActivationFailed => "activation_failed",
            LicenseEvent::StatusChecked => "status_checked",
            LicenseEvent::DeviceRegistered => "device_registered",
            LicenseEvent::Heartbeat => "heartbeat",
        };
        write!(f, "{}", s)
    }
}

impl LicenseEvent {
    fn is_failure(self) -> bool {
        matches!(
            self,
            LicenseEvent::ValidationFailed | LicenseEvent::ActivationFailed
        )
    }
}

/// Log a license state change event.
///
/// # Arguments
///
/// * `event` - The type of license event
/// * `license_key` - The license key involved
/// * `details` - Optional additional details about the event
pub fn log_license_event(event: LicenseEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %license_key,
    );
    let _enter = span.enter();

    match (event.is_failure(), details) {
        (true, Some(d)) => warn!(reason = %d, "License event occurred"),
        (true, None) => warn!("License event occurred"),
        (false, Some(d)) => info!(details = %d, "License event occurred"),
        (false, None) => info!("License event occurred"),
    }
}

/// Log an event concerning one device and the license it is bound to.
pub fn log_device_event(
    event: LicenseEvent,
    license_key: &str,
    device_id: &str,
    device_name: Option<&str>,
) {
    let span = info_span!(
        "device_event",
        event = %event,
        license_key = %license_key,
        device_id = %device_id,
    );
    let _enter = span.enter();

    if let Some(name) = device_name {
        info!(device_name = %name, "Device event occurred");
    } else {
        info!("Device event occurred");
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Generate a new unique request ID.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Logging middleware that tracks request timing and generates request IDs.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();

    let response = async move {
        info!("Started processing request");
        next.run(request).await
    }
    .instrument(span.clone())
    .await;

    let duration = start.elapsed();
    let status = response.status();

    let _enter = span.enter();
    info!(
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Health check response structure.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status, always "healthy"
    pub status: String,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Database connectivity status
    pub database: DatabaseHealth,
}

/// Database health status.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub db_type: String,
}

impl HealthResponse {
    /// Health report. The service answers as long as it runs; the database
    /// state is only reported in `database.connected`.
    pub fn healthy(db_connected: bool) -> Self {
        Self {
            status: "healthy".to_string(),
            service: "sufuss".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: "sqlite".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_stays_healthy_without_database() {
        let report = HealthResponse::healthy(false);
        assert_eq!(report.status, "healthy");
        assert!(!report.database.connected);
    }

    #[test]
    fn request_id_is_valid_uuid() {
        let id = generate_request_id();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn event_names() {
        assert_eq!(LicenseEvent::DeviceRegistered.to_string(), "device_registered");
        assert_eq!(LicenseEvent::ActivationFailed.to_string(), "activation_failed");
        assert!(LicenseEvent::ValidationFailed.is_failure());
        assert!(!LicenseEvent::Heartbeat.is_failure());
    }

    #[test]
    fn health_response_healthy() {
        let health = HealthResponse::healthy(true);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "sufuss");
        assert_eq!(health.database.db_type, "sqlite");
        assert!(health.database.connected);
    }
}
