use std::sync::Arc;

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::SufussConfig;
use crate::server::database::Database;
use crate::server::emulation::{IdGenerator, Templates, UuidGenerator};
use crate::server::logging::HealthResponse;

/// Shared application state for handlers.
///
/// Cheap to clone: everything lives behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<SufussConfig>,
    /// Source of the fresh identifiers put into fabricated responses.
    pub ids: Arc<dyn IdGenerator>,
}

impl AppState {
    pub fn new(db: Arc<Database>, config: Arc<SufussConfig>) -> Self {
        Self {
            db,
            config,
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Replace the identifier source, e.g. with a deterministic one in tests.
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Response templates bound to `now` and this state's emulation profile.
    pub fn templates(&self, now: NaiveDateTime) -> Templates<'_> {
        Templates::new(now, self.ids.as_ref(), &self.config.emulation)
    }
}

/// Current time as naive UTC, the representation stored in the database.
pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub status: String,
}

/// `GET /` - service banner.
pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to Sufuss - Sophos License Server Simulator".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

/// `GET /health` - liveness. Always 200 and "healthy"; database reachability
/// is reported separately.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.db.ping().await;
    if !connected {
        warn!("Health check could not reach the database");
    }
    Json(HealthResponse::healthy(connected))
}

/// `GET /certificates/ca` - the CA certificate devices must trust.
///
/// A missing file is not an error for the device, so it gets a 200 JSON body.
pub async fn ca_certificate_handler(State(state): State<AppState>) -> Response {
    let path = &state.config.certificates.ca_path;

    match tokio::fs::read(path).await {
        Ok(content) => {
            info!("Serving CA certificate from {path}");
            (
                [
                    (header::CONTENT_TYPE, "application/x-x509-ca-cert"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=sufuss-ca.crt",
                    ),
                ],
                content,
            )
                .into_response()
        }
        Err(e) => {
            warn!("CA certificate unavailable at {path}: {e}");
            Json(json!({ "error": "Certificate not found" })).into_response()
        }
    }
}
