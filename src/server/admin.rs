//! Admin API for license management.
//!
//! Served on its own listener, never behind the fail-open wrapper, so an
//! administrator always sees real errors. Every route requires HTTP Basic
//! credentials matching `admin.username` / `admin.password`.
//!
//! # Endpoints
//!
//! - `GET /licenses` - List licenses with their services
//! - `POST /licenses` - Create a license (key generated when omitted)
//! - `GET /licenses/{id}` - Get a license by id
//! - `PATCH /licenses/{id}` - Update a license
//! - `DELETE /licenses/{id}` - Delete a license with its devices and services
//! - `GET /devices?skip=&limit=` - List devices

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::errors::LicenseResult;
use crate::license_key::{generate_unique_license_key, LicenseKeyConfig};
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::database::{Database, Device, License, LicenseChanges, NewLicense, Service};
use crate::server::devices::Pagination;
use crate::server::handlers::{utc_now, AppState};
use crate::server::logging::{log_license_event, LicenseEvent};
use crate::server::validation::{
    parse_expiry_date, validate_length, validate_license_key, MAX_FIELD_LENGTH,
};

// ============================================================================
// Authentication
// ============================================================================

/// Decode `Authorization: Basic …` into (username, password).
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Compare fixed-size digests so the comparison does not depend on the
/// length of the guess.
fn digest_eq(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

fn unauthorized() -> Response {
    let mut response = ApiError::unauthorized().into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
    response
}

/// Route layer guarding every admin route.
pub async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let admin = &state.config.admin;
    let authorized = basic_credentials(request.headers()).is_some_and(|(user, pass)| {
        // Evaluate both so a wrong username costs the same as a wrong password.
        let user_ok = digest_eq(&user, &admin.username);
        let pass_ok = digest_eq(&pass, &admin.password);
        user_ok && pass_ok
    });

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected admin request with bad credentials");
        return unauthorized();
    }

    next.run(request).await
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateLicenseRequest {
    /// Generated from the configured key shape when omitted
    pub license_key: Option<String>,
    pub description: Option<String>,
    /// Defaults to `license.default_status`
    pub status: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339; defaults to now + `license.default_duration_days`
    pub expiry_date: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLicenseRequest {
    pub license_key: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub expiry_date: Option<String>,
    pub is_active: Option<bool>,
}

/// A license together with its services and the number of bound devices.
#[derive(Debug, Serialize)]
pub struct LicenseResponse {
    #[serde(flatten)]
    pub license: License,
    pub services: Vec<Service>,
    pub device_count: i64,
}

impl LicenseResponse {
    async fn load(db: &Database, license: License) -> LicenseResult<Self> {
        let services = db.list_services(license.id).await?;
        let device_count = db.count_devices(license.id).await?;
        Ok(Self {
            license,
            services,
            device_count,
        })
    }
}

fn license_missing(id: i64) -> ApiError {
    ApiError::with_details(
        ErrorCode::LicenseNotFound,
        "License not found",
        serde_json::json!({ "id": id }),
    )
}

fn duplicate_key(key: &str) -> ApiError {
    ApiError::with_details(
        ErrorCode::DuplicateLicenseKey,
        "License key already exists",
        serde_json::json!({ "license_key": key }),
    )
}

fn check_description(description: Option<&str>) -> Result<(), ApiError> {
    if let Some(d) = description {
        validate_length(d, 0, MAX_FIELD_LENGTH, "description")?;
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /licenses`
pub async fn list_licenses_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<LicenseResponse>>, ApiError> {
    let licenses = state.db.list_licenses().await?;
    let mut responses = Vec::with_capacity(licenses.len());
    for license in licenses {
        responses.push(LicenseResponse::load(&state.db, license).await?);
    }
    Ok(Json(responses))
}

/// `POST /licenses`
pub async fn create_license_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateLicenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LicenseResponse>), ApiError> {
    let Json(payload) = payload?;
    let defaults = &state.config.license;
    let now = utc_now();

    let expiry_date = match payload.expiry_date.as_deref() {
        Some(raw) => parse_expiry_date(raw, "expiry_date")?,
        None => now + Duration::days(defaults.default_duration_days),
    };
    check_description(payload.description.as_deref())?;

    let license_key = match payload.license_key {
        Some(key) => {
            validate_license_key(&key, "license_key")?;
            if state.db.license_key_exists(&key).await? {
                return Err(duplicate_key(&key));
            }
            key
        }
        None => {
            let db = state.db.clone();
            generate_unique_license_key(&LicenseKeyConfig::from(defaults), move |candidate| {
                let db = db.clone();
                async move { db.license_key_exists(&candidate).await }
            })
            .await?
        }
    };

    let new = NewLicense {
        license_key,
        description: payload.description,
        status: payload
            .status
            .unwrap_or_else(|| defaults.default_status.clone()),
        expiry_date,
        is_active: payload.is_active.unwrap_or(true),
    };
    let license = state
        .db
        .create_license(new, &defaults.default_service_status, now)
        .await?;
    log_license_event(
        LicenseEvent::Created,
        &license.license_key,
        license.description.as_deref(),
    );

    let response = LicenseResponse::load(&state.db, license).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /licenses/{id}`
pub async fn get_license_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let license = state
        .db
        .get_license(id)
        .await?
        .ok_or_else(|| license_missing(id))?;
    Ok(Json(LicenseResponse::load(&state.db, license).await?))
}

/// `PATCH /licenses/{id}`
pub async fn update_license_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<UpdateLicenseRequest>, JsonRejection>,
) -> Result<Json<LicenseResponse>, ApiError> {
    let Json(payload) = payload?;
    let current = state
        .db
        .get_license(id)
        .await?
        .ok_or_else(|| license_missing(id))?;

    if let Some(key) = payload.license_key.as_deref() {
        validate_license_key(key, "license_key")?;
        if key != current.license_key && state.db.license_key_exists(key).await? {
            return Err(duplicate_key(key));
        }
    }
    check_description(payload.description.as_deref())?;

    let changes = LicenseChanges {
        license_key: payload.license_key,
        description: payload.description,
        status: payload.status,
        expiry_date: payload
            .expiry_date
            .as_deref()
            .map(|raw| parse_expiry_date(raw, "expiry_date"))
            .transpose()?,
        is_active: payload.is_active,
    };

    let license = state
        .db
        .update_license(id, changes, utc_now())
        .await?
        .ok_or_else(|| license_missing(id))?;
    log_license_event(LicenseEvent::Updated, &license.license_key, None);

    Ok(Json(LicenseResponse::load(&state.db, license).await?))
}

/// `DELETE /licenses/{id}`
pub async fn delete_license_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let license = state
        .db
        .get_license(id)
        .await?
        .ok_or_else(|| license_missing(id))?;

    if !state.db.delete_license(id).await? {
        return Err(license_missing(id));
    }
    log_license_event(LicenseEvent::Deleted, &license.license_key, None);
    info!(id, "Deleted license with its devices and services");

    Ok(StatusCode::NO_CONTENT)
}

/// `GET /devices`
pub async fn list_devices_handler(
    State(state): State<AppState>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<Vec<Device>>, ApiError> {
    let Query(page) = query?;
    let devices = state
        .db
        .list_devices(page.skip.max(0), page.limit.max(0))
        .await?;
    Ok(Json(devices))
}
