//! License validation, activation and status endpoints.
//!
//! # Endpoints
//!
//! - `POST /api/v1/license/validate` - Check a key without side effects
//! - `POST /api/v1/license/activate` - Bind a device to a key
//! - `POST /api/v1/license/status` - Status of a key for a bound device
//!
//! Validate and activate never fail with an HTTP error for a bad key: the
//! refusal is reported in the body (`valid`/`success` false). Status is strict
//! and answers 404 for an unknown key or an unbound device.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{LicenseError, LicenseResult};
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::database::{Database, Device, DeviceAttributes, License, Service};
use crate::server::handlers::{utc_now, AppState};
use crate::server::logging::{log_device_event, log_license_event, LicenseEvent};

// ============================================================================
// Gate
// ============================================================================

/// Whether a license may be used at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseState {
    Inactive,
    Expired,
    Usable,
}

impl LicenseState {
    /// Checks `is_active` first, then expiry. A license expiring exactly at
    /// `now` is still usable.
    pub fn of(license: &License, now: NaiveDateTime) -> Self {
        if !license.is_active {
            LicenseState::Inactive
        } else if license.expiry_date < now {
            LicenseState::Expired
        } else {
            LicenseState::Usable
        }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub license_key: String,
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub license_key: String,
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    /// Defaults to "physical" for new devices; kept as-is for known ones.
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl ActivateRequest {
    fn attributes(&self) -> DeviceAttributes {
        DeviceAttributes {
            name: self.device_name.clone(),
            device_type: self.device_type.clone(),
            model: self.model.clone(),
            firmware_version: self.firmware_version.clone(),
            ip_address: self.ip_address.clone(),
        }
        .supplied()
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub license_key: String,
    pub device_id: String,
}

/// A license's service as reported to devices.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub feature_code: String,
    pub status: String,
    pub description: Option<String>,
}

impl From<Service> for ServiceInfo {
    fn from(service: Service) -> Self {
        Self {
            name: service.name,
            feature_code: service.feature_code,
            status: service.status,
            description: service.description,
        }
    }
}

/// Fields shared by validate and activate answers. Absent fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LicenseDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ServiceInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LicenseDetails {
    fn unknown_key() -> Self {
        Self {
            message: Some("License key not found".to_string()),
            ..Default::default()
        }
    }

    /// Details of a license the gate refused, or `None` if it is usable.
    fn refusal(license: &License, now: NaiveDateTime) -> Option<Self> {
        match LicenseState::of(license, now) {
            LicenseState::Inactive => Some(Self {
                license_key: Some(license.license_key.clone()),
                status: Some("inactive".to_string()),
                message: Some("License is inactive".to_string()),
                ..Default::default()
            }),
            LicenseState::Expired => Some(Self {
                license_key: Some(license.license_key.clone()),
                status: Some("expired".to_string()),
                expiry_date: Some(license.expiry_date),
                message: Some("License has expired".to_string()),
                ..Default::default()
            }),
            LicenseState::Usable => None,
        }
    }

    fn granted(license: &License, services: Vec<ServiceInfo>, message: &str) -> Self {
        Self {
            license_key: Some(license.license_key.clone()),
            status: Some(license.status.clone()),
            expiry_date: Some(license.expiry_date),
            services: Some(services),
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(flatten)]
    pub details: LicenseDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateResponse {
    pub success: bool,
    #[serde(flatten)]
    pub details: LicenseDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub license_key: String,
    pub status: String,
    pub expiry_date: NaiveDateTime,
    pub is_active: bool,
    pub services: Vec<ServiceInfo>,
}

// ============================================================================
// Engines
// ============================================================================

async fn service_infos(db: &Database, license_id: i64) -> LicenseResult<Vec<ServiceInfo>> {
    Ok(db
        .list_services(license_id)
        .await?
        .into_iter()
        .map(ServiceInfo::from)
        .collect())
}

/// Check a license key. Read-only; `device_id` is accepted but not consulted.
pub async fn validate_license(
    db: &Database,
    license_key: &str,
    now: NaiveDateTime,
) -> LicenseResult<ValidateResponse> {
    let Some(license) = db.get_license_by_key(license_key).await? else {
        log_license_event(LicenseEvent::ValidationFailed, license_key, Some("not found"));
        return Ok(ValidateResponse {
            valid: false,
            details: LicenseDetails::unknown_key(),
        });
    };

    if let Some(details) = LicenseDetails::refusal(&license, now) {
        log_license_event(
            LicenseEvent::ValidationFailed,
            license_key,
            details.status.as_deref(),
        );
        return Ok(ValidateResponse {
            valid: false,
            details,
        });
    }

    let services = service_infos(db, license.id).await?;
    log_license_event(LicenseEvent::Validated, license_key, None);
    Ok(ValidateResponse {
        valid: true,
        details: LicenseDetails::granted(&license, services, "License is valid"),
    })
}

/// Bind a device to a usable license, creating or updating the device.
///
/// Re-activating the same device never creates a second record; it is
/// rebound to this license and reactivated.
pub async fn activate_license(
    db: &Database,
    request: &ActivateRequest,
    now: NaiveDateTime,
) -> LicenseResult<ActivateResponse> {
    let Some(license) = db.get_license_by_key(&request.license_key).await? else {
        log_license_event(
            LicenseEvent::ActivationFailed,
            &request.license_key,
            Some("not found"),
        );
        return Ok(ActivateResponse {
            success: false,
            details: LicenseDetails::unknown_key(),
        });
    };

    if let Some(details) = LicenseDetails::refusal(&license, now) {
        log_license_event(
            LicenseEvent::ActivationFailed,
            &request.license_key,
            details.status.as_deref(),
        );
        return Ok(ActivateResponse {
            success: false,
            details,
        });
    }

    let known = db.get_device(&request.device_id).await?;
    let device = bind_device(
        db,
        known,
        &request.device_id,
        request.attributes(),
        license.id,
        now,
    )
    .await?;
    log_device_event(
        LicenseEvent::Activated,
        &license.license_key,
        &device.device_id,
        device.name.as_deref(),
    );

    let services = service_infos(db, license.id).await?;
    Ok(ActivateResponse {
        success: true,
        details: LicenseDetails::granted(&license, services, "License activated successfully"),
    })
}

/// Bind `device_id` to `license_id`, creating the device unless `known`.
///
/// A device created concurrently after `known` was read shows up as a
/// `Conflict` on insert and is rebound instead.
async fn bind_device(
    db: &Database,
    known: Option<Device>,
    device_id: &str,
    attrs: DeviceAttributes,
    license_id: i64,
    now: NaiveDateTime,
) -> LicenseResult<Device> {
    if let Some(existing) = known {
        return db.rebind_device(existing, attrs, license_id, now).await;
    }
    match db.create_device(device_id, &attrs, license_id, now).await {
        Err(LicenseError::Conflict(_)) => {
            let existing = db
                .get_device(device_id)
                .await?
                .ok_or_else(|| LicenseError::NotFound(format!("device '{device_id}'")))?;
            db.rebind_device(existing, attrs, license_id, now).await
        }
        other => other,
    }
}

/// Status of a license for a device bound to it. Refreshes the device's
/// `last_seen`.
pub async fn license_status(
    db: &Database,
    license_key: &str,
    device_id: &str,
    now: NaiveDateTime,
) -> Result<StatusResponse, ApiError> {
    let license = db
        .get_license_by_key(license_key)
        .await?
        .ok_or_else(ApiError::license_not_found)?;

    if db
        .get_device_for_license(device_id, license.id)
        .await?
        .is_none()
    {
        return Err(ApiError::with_message(
            ErrorCode::DeviceNotFound,
            "Device not found or not associated with this license",
        ));
    }

    db.touch_device(device_id, now).await?;
    let services = service_infos(db, license.id).await?;
    log_device_event(LicenseEvent::StatusChecked, license_key, device_id, None);

    Ok(StatusResponse {
        license_key: license.license_key,
        status: license.status,
        expiry_date: license.expiry_date,
        is_active: license.is_active,
        services,
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// `POST /api/v1/license/validate`
pub async fn validate_handler(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let Json(request) = payload?;
    info!(device_id = %request.device_id, "License validation requested");
    let response = validate_license(&state.db, &request.license_key, utc_now()).await?;
    Ok(Json(response))
}

/// `POST /api/v1/license/activate`
pub async fn activate_handler(
    State(state): State<AppState>,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Json<ActivateResponse>, ApiError> {
    let Json(request) = payload?;
    let response = activate_license(&state.db, &request, utc_now()).await?;
    Ok(Json(response))
}

/// `POST /api/v1/license/status`
pub async fn status_handler(
    State(state): State<AppState>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = payload?;
    let response =
        license_status(&state.db, &request.license_key, &request.device_id, utc_now()).await?;
    Ok(Json(response))
}
