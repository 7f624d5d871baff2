//! Integration tests for the device endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sufuss::server::build_router;

use common::{empty_state, json_request, seeded_state};

#[tokio::test]
async fn register_then_fetch() {
    let state = seeded_state().await;

    let (status, body) = json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/device/register",
        Some(json!({ "device_id": "fw-01", "name": "Edge", "model": "XG 230" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["device_id"], "fw-01");
    assert_eq!(body["message"], "Device registered successfully");

    let (status, body) =
        json_request(build_router(state), "GET", "/api/v1/device/fw-01", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device_id"], "fw-01");
    assert_eq!(body["name"], "Edge");
    assert_eq!(body["device_type"], "physical");
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn register_twice_is_idempotent() {
    let state = seeded_state().await;

    for expected in ["Device registered successfully", "Device already registered"] {
        let (_, body) = json_request(
            build_router(state.clone()),
            "POST",
            "/api/v1/device/register",
            Some(json!({ "device_id": "fw-01" })),
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], expected);
    }

    assert_eq!(state.db.list_devices(0, 100).await.unwrap().len(), 1);
}

#[tokio::test]
async fn register_without_active_license() {
    let state = empty_state().await;

    let (status, body) = json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/device/register",
        Some(json!({ "device_id": "fw-01" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "No active license available for device registration"
    );
    assert!(state.db.get_device("fw-01").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_device_is_404() {
    let app = build_router(seeded_state().await);

    let (status, body) = json_request(app, "GET", "/api/v1/device/ghost", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "DEVICE_NOT_FOUND");
    assert_eq!(body["error"]["message"], "Device not found");
}

#[tokio::test]
async fn list_devices_paginates() {
    let state = seeded_state().await;
    for i in 0..5 {
        json_request(
            build_router(state.clone()),
            "POST",
            "/api/v1/device/register",
            Some(json!({ "device_id": format!("fw-{i}") })),
        )
        .await;
    }

    let (status, body) =
        json_request(build_router(state.clone()), "GET", "/api/v1/device/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 5);

    let (_, body) = json_request(
        build_router(state.clone()),
        "GET",
        "/api/v1/device?skip=1&limit=2",
        None,
    )
    .await;
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["device_id"], "fw-1");

    let (_, body) = json_request(
        build_router(state),
        "GET",
        "/api/v1/device/?skip=-3&limit=1",
        None,
    )
    .await;
    assert_eq!(body[0]["device_id"], "fw-0");
}
