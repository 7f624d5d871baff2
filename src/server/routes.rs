use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::server::admin::{
    create_license_handler, delete_license_handler, get_license_handler,
    list_devices_handler as admin_list_devices_handler, list_licenses_handler, require_admin,
    update_license_handler,
};
use crate::server::devices::{get_device_handler, list_devices_handler, register_device_handler};
use crate::server::emulation::{
    emulation_fallback, installation_heartbeat_handler, installations_handler,
    refresh_features_handler, register_installation_handler,
};
use crate::server::fail_open::fail_open;
use crate::server::handlers::{ca_certificate_handler, health_handler, root_handler, AppState};
use crate::server::licensing::{activate_handler, status_handler, validate_handler};
use crate::server::logging::request_logging_middleware;

/// Build the device-facing router.
///
/// Every path and method not listed below is answered by the protocol
/// emulation layer, including a wrong method on a listed path.
///
/// # Routes
///
/// ## Service
/// - `GET /` - Banner
/// - `GET /health` - Health check
/// - `GET /certificates/ca` - CA certificate download
///
/// ## License
/// - `POST /api/v1/license/validate`
/// - `POST /api/v1/license/activate`
/// - `POST /api/v1/license/status`
///
/// ## Device
/// - `POST /api/v1/device/register`
/// - `GET /api/v1/device/{device_id}`
/// - `GET /api/v1/device/?skip=&limit=`
///
/// ## SFOS installations (under `/api/v1/license`)
/// - `GET installations[/]`, `GET v1/installations[/]`
/// - `POST v1/installations/register[/]`
/// - `POST v1/installations/{id}/features/refresh`, `PUT v1/installations/{id}/features`
/// - `POST v1/installations/{id}/heartbeat`
///
/// The fail-open wrapper is the outermost layer.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler).fallback(emulation_fallback))
        .route("/health", get(health_handler).fallback(emulation_fallback))
        .route(
            "/certificates/ca",
            get(ca_certificate_handler).fallback(emulation_fallback),
        )
        // License endpoints
        .route(
            "/api/v1/license/validate",
            post(validate_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/activate",
            post(activate_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/status",
            post(status_handler).fallback(emulation_fallback),
        )
        // Device endpoints
        .route(
            "/api/v1/device/register",
            post(register_device_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/device/",
            get(list_devices_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/device",
            get(list_devices_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/device/:device_id",
            get(get_device_handler).fallback(emulation_fallback),
        )
        // SFOS installation endpoints
        .route(
            "/api/v1/license/installations",
            get(installations_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/installations/",
            get(installations_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/v1/installations",
            get(installations_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/v1/installations/",
            get(installations_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/v1/installations/register",
            post(register_installation_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/v1/installations/register/",
            post(register_installation_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/v1/installations/:installation_id/features/refresh",
            post(refresh_features_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/v1/installations/:installation_id/features",
            put(refresh_features_handler).fallback(emulation_fallback),
        )
        .route(
            "/api/v1/license/v1/installations/:installation_id/heartbeat",
            post(installation_heartbeat_handler).fallback(emulation_fallback),
        )
        .fallback(emulation_fallback)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), fail_open))
        .with_state(state)
}

/// Build the admin router. Every route requires Basic credentials.
///
/// # Routes
/// - `GET /licenses`, `POST /licenses`
/// - `GET /licenses/{id}`, `PATCH /licenses/{id}`, `DELETE /licenses/{id}`
/// - `GET /devices`
pub fn build_admin_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/licenses",
            get(list_licenses_handler).post(create_license_handler),
        )
        .route(
            "/licenses/:id",
            get(get_license_handler)
                .patch(update_license_handler)
                .delete(delete_license_handler),
        )
        .route("/devices", get(admin_list_devices_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
