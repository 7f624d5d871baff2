//! Integration tests for the validate / activate / status endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sufuss::server::build_router;

use common::{empty_state, insert_license, json_request, raw_request, seeded_state, DEMO_KEY};

#[tokio::test]
async fn validate_demo_license() {
    let app = build_router(seeded_state().await);

    let (status, body) = json_request(
        app,
        "POST",
        "/api/v1/license/validate",
        Some(json!({ "license_key": DEMO_KEY, "device_id": "C01001ABCD" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["status"], "registered");
    assert_eq!(body["license_key"], DEMO_KEY);
    assert_eq!(body["message"], "License is valid");

    let services = body["services"].as_array().unwrap();
    assert_eq!(services.len(), 6);
    assert_eq!(services[0]["name"], "Firewall");
    assert_eq!(services[0]["feature_code"], "FW");
    assert_eq!(services[0]["status"], "running");
    assert_eq!(services[0]["description"], "Sophos Firewall Service");
}

#[tokio::test]
async fn validate_unknown_key_is_not_an_http_error() {
    let app = build_router(empty_state().await);

    let (status, body) = json_request(
        app,
        "POST",
        "/api/v1/license/validate",
        Some(json!({ "license_key": "NOPE", "device_id": "dev" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "License key not found");
    assert!(body.get("license_key").is_none());
}

#[tokio::test]
async fn validate_inactive_license() {
    let state = empty_state().await;
    insert_license(&state, "OFF-1", false, 30).await;

    let (_, body) = json_request(
        build_router(state),
        "POST",
        "/api/v1/license/validate",
        Some(json!({ "license_key": "OFF-1", "device_id": "dev" })),
    )
    .await;

    assert_eq!(body["valid"], false);
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["message"], "License is inactive");
    assert!(body.get("services").is_none());
}

#[tokio::test]
async fn validate_expired_license_reports_expiry() {
    let state = empty_state().await;
    insert_license(&state, "OLD-1", true, -1).await;

    let (_, body) = json_request(
        build_router(state),
        "POST",
        "/api/v1/license/validate",
        Some(json!({ "license_key": "OLD-1", "device_id": "dev" })),
    )
    .await;

    assert_eq!(body["valid"], false);
    assert_eq!(body["status"], "expired");
    assert_eq!(body["message"], "License has expired");
    assert!(body["expiry_date"].is_string());
}

#[tokio::test]
async fn validate_has_no_side_effects() {
    let state = seeded_state().await;

    json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/validate",
        Some(json!({ "license_key": DEMO_KEY, "device_id": "dev-1" })),
    )
    .await;

    assert!(state.db.get_device("dev-1").await.unwrap().is_none());
}

#[tokio::test]
async fn activate_twice_keeps_one_device() {
    let state = seeded_state().await;

    let (status, body) = json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/activate",
        Some(json!({
            "license_key": DEMO_KEY,
            "device_id": "fw-01",
            "device_name": "Lab firewall",
            "model": "XG 125"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "License activated successfully");
    assert_eq!(body["services"].as_array().unwrap().len(), 6);

    let (_, body) = json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/activate",
        Some(json!({
            "license_key": DEMO_KEY,
            "device_id": "fw-01",
            "firmware_version": "18.5.0"
        })),
    )
    .await;
    assert_eq!(body["success"], true);

    let devices = state.db.list_devices(0, 100).await.unwrap();
    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.name.as_deref(), Some("Lab firewall"));
    assert_eq!(device.model.as_deref(), Some("XG 125"));
    assert_eq!(device.firmware_version.as_deref(), Some("18.5.0"));
    assert_eq!(device.device_type, "physical");
}

#[tokio::test]
async fn activate_moves_device_to_new_license() {
    let state = seeded_state().await;
    let other = insert_license(&state, "OTHER-1", true, 30).await;

    for key in [DEMO_KEY, "OTHER-1"] {
        json_request(
            build_router(state.clone()),
            "POST",
            "/api/v1/license/activate",
            Some(json!({ "license_key": key, "device_id": "fw-01" })),
        )
        .await;
    }

    let device = state.db.get_device("fw-01").await.unwrap().unwrap();
    assert_eq!(device.license_id, other.id);
    assert!(device.is_active);
}

#[tokio::test]
async fn activate_expired_license_creates_nothing() {
    let state = empty_state().await;
    insert_license(&state, "OLD-1", true, -3).await;

    let (status, body) = json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/activate",
        Some(json!({ "license_key": "OLD-1", "device_id": "fw-01" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "expired");
    assert!(state.db.get_device("fw-01").await.unwrap().is_none());
}

#[tokio::test]
async fn status_of_bound_device() {
    let state = seeded_state().await;
    json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/activate",
        Some(json!({ "license_key": DEMO_KEY, "device_id": "fw-01" })),
    )
    .await;

    let (status, body) = json_request(
        build_router(state),
        "POST",
        "/api/v1/license/status",
        Some(json!({ "license_key": DEMO_KEY, "device_id": "fw-01" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["license_key"], DEMO_KEY);
    assert_eq!(body["status"], "registered");
    assert_eq!(body["is_active"], true);
    assert_eq!(body["services"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn status_unknown_key_is_404() {
    let app = build_router(seeded_state().await);

    let (status, body) = json_request(
        app,
        "POST",
        "/api/v1/license/status",
        Some(json!({ "license_key": "NOPE", "device_id": "fw-01" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "LICENSE_NOT_FOUND");
    assert_eq!(body["error"]["message"], "License key not found");
}

#[tokio::test]
async fn status_mismatched_pair_is_404() {
    let state = seeded_state().await;
    insert_license(&state, "OTHER-1", true, 30).await;
    json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/activate",
        Some(json!({ "license_key": "OTHER-1", "device_id": "fw-01" })),
    )
    .await;

    let (status, body) = json_request(
        build_router(state),
        "POST",
        "/api/v1/license/status",
        Some(json!({ "license_key": DEMO_KEY, "device_id": "fw-01" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "DEVICE_NOT_FOUND");
    assert_eq!(
        body["error"]["message"],
        "Device not found or not associated with this license"
    );
}

#[tokio::test]
async fn malformed_validate_body_is_a_client_error() {
    let app = build_router(seeded_state().await);

    let (status, _) = raw_request(app, "POST", "/api/v1/license/validate", "{not json", None).await;

    assert!(status.is_client_error());
}
