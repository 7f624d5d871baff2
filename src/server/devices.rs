//! Device registration and lookup.
//!
//! # Endpoints
//!
//! - `POST /api/v1/device/register` - Register a device with the first active license
//! - `GET /api/v1/device/{device_id}` - Fetch one device
//! - `GET /api/v1/device/?skip=&limit=` - Page through all devices

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{LicenseError, LicenseResult};
use crate::server::api_error::ApiError;
use crate::server::database::{Database, Device, DeviceAttributes};
use crate::server::handlers::{utc_now, AppState};
use crate::server::logging::{log_device_event, LicenseEvent};

const DEFAULT_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterDeviceResponse {
    pub success: bool,
    pub device_id: Option<String>,
    pub message: String,
}

impl RegisterDeviceResponse {
    fn registered(device_id: &str, message: &str) -> Self {
        Self {
            success: true,
            device_id: Some(device_id.to_string()),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

/// Register a device with the first active license.
///
/// Registering a known device changes nothing and still succeeds.
pub async fn register_device(
    db: &Database,
    request: &RegisterDeviceRequest,
    now: NaiveDateTime,
) -> LicenseResult<RegisterDeviceResponse> {
    if db.get_device(&request.device_id).await?.is_some() {
        return Ok(RegisterDeviceResponse::registered(
            &request.device_id,
            "Device already registered",
        ));
    }

    let Some(license) = db.first_active_license().await? else {
        return Ok(RegisterDeviceResponse {
            success: false,
            device_id: None,
            message: "No active license available for device registration".to_string(),
        });
    };

    let attrs = DeviceAttributes {
        name: request.name.clone(),
        device_type: request.device_type.clone(),
        model: request.model.clone(),
        firmware_version: request.firmware_version.clone(),
        ip_address: request.ip_address.clone(),
    }
    .supplied();

    match db
        .create_device(&request.device_id, &attrs, license.id, now)
        .await
    {
        Ok(device) => {
            log_device_event(
                LicenseEvent::DeviceRegistered,
                &license.license_key,
                &device.device_id,
                device.name.as_deref(),
            );
            Ok(RegisterDeviceResponse::registered(
                &device.device_id,
                "Device registered successfully",
            ))
        }
        // Lost a race with a concurrent registration of the same device.
        Err(LicenseError::Conflict(_)) => Ok(RegisterDeviceResponse::registered(
            &request.device_id,
            "Device already registered",
        )),
        Err(e) => Err(e),
    }
}

/// `POST /api/v1/device/register`
pub async fn register_device_handler(
    State(state): State<AppState>,
    payload: Result<Json<RegisterDeviceRequest>, JsonRejection>,
) -> Result<Json<RegisterDeviceResponse>, ApiError> {
    let Json(request) = payload?;
    let response = register_device(&state.db, &request, utc_now()).await?;
    info!(
        device_id = %request.device_id,
        success = response.success,
        "{}", response.message
    );
    Ok(Json(response))
}

/// `GET /api/v1/device/{device_id}`
pub async fn get_device_handler(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Device>, ApiError> {
    state
        .db
        .get_device(&device_id)
        .await?
        .map(Json)
        .ok_or_else(ApiError::device_not_found)
}

/// `GET /api/v1/device/`
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
