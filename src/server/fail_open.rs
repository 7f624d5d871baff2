//! Fail-open wrapper around the public router.
//!
//! A device that gets an error from a licensing endpoint may disable features,
//! so any server-side failure on a license-shaped path is turned into a
//! synthetic "licensed" answer. Failures elsewhere become a generic 500 that
//! leaks nothing. Client errors (4xx) are the caller's fault and pass through.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::FutureExt;
use serde_json::json;
use tracing::{error, warn};

use crate::server::api_error::ErrorDetail;
use crate::server::handlers::{utc_now, AppState};

/// Path fragments that mark a request as license-shaped.
const LICENSE_MARKERS: [&str; 4] = ["license", "installations", "validate", "sync"];

const INTERNAL_ERROR_DETAIL: &str = "Internal server error. Please check the logs for more details.";

/// Whether a failure on `path` should be answered with a synthetic license.
pub fn is_license_shaped(path: &str) -> bool {
    let path = path.to_lowercase();
    LICENSE_MARKERS.iter().any(|marker| path.contains(marker))
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Outermost middleware of the public router.
pub async fn fail_open(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.config.emulation.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path, "Could not buffer request body: {e}");
            Bytes::new()
        }
    };
    let request = Request::from_parts(parts, Body::from(body.clone()));

    let failure = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) if response.status().is_server_error() => response
            .extensions()
            .get::<ErrorDetail>()
            .map(|d| d.0.clone())
            .unwrap_or_else(|| format!("handler returned {}", response.status())),
        Ok(response) => return response,
        Err(payload) => format!("handler panicked: {}", panic_message(payload.as_ref())),
    };

    error!(
        path = %path,
        body = %String::from_utf8_lossy(&body),
        "Request failed: {failure}"
    );

    if is_license_shaped(&path) {
        warn!(path = %path, "Answering failed license request with a synthetic license");
        return Json(state.templates(utc_now()).recovered_license()).into_response();
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": INTERNAL_ERROR_DETAIL })),
    )
        .into_response()
}
