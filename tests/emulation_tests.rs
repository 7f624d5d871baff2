//! Integration tests for the SFOS protocol emulation layer.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use sufuss::server::build_router;

use common::{empty_state, json_request, raw_request, seeded_state};

#[tokio::test]
async fn unknown_path_is_licensed() {
    let app = build_router(empty_state().await);

    let (status, body) = json_request(app, "GET", "/some/unknown/path", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "registered");
    assert_eq!(body["licensed"], true);
    assert_eq!(body["message"], "License is valid");
    assert_eq!(body["installationId"], "id-0");
    assert!(body["expiryDate"].is_string());
}

#[tokio::test]
async fn every_method_reaches_the_emulator() {
    for method in ["GET", "POST", "PUT", "DELETE", "PATCH"] {
        let app = build_router(empty_state().await);
        let (status, body) = json_request(app, method, "/central/v1/tenants", None).await;
        assert_eq!(status, StatusCode::OK, "{method}");
        assert_eq!(body["status"], "connected", "{method}");
    }
}

#[tokio::test]
async fn wrong_method_on_structured_route_is_emulated() {
    let app = build_router(seeded_state().await);

    let (status, body) = json_request(app, "GET", "/api/v1/license/validate", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "API request processed successfully");
}

#[tokio::test]
async fn buckets_have_their_shapes() {
    let cases = [
        ("/licensing/v1/installations", "installations"),
        ("/licensing/installations/x/features", "features"),
        ("/endpoint-security/v1/status", "licensed"),
        ("/services/v1/directory", "services"),
        ("/fw/firmware/latest", "url"),
        ("/oauth/token", "token"),
    ];

    for (path, field) in cases {
        let app = build_router(empty_state().await);
        let (status, body) = json_request(app, "GET", path, None).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert!(body.get(field).is_some(), "{path} should carry {field}");
    }
}

#[tokio::test]
async fn auth_token_uses_injected_ids() {
    let app = build_router(empty_state().await);

    let (_, body) = json_request(app, "POST", "/login", None).await;

    assert_eq!(body["token"], "dummy-token-id-0");
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 3600);
}

#[tokio::test]
async fn fallback_register_creates_device() {
    let state = seeded_state().await;

    let (status, body) = json_request(
        build_router(state.clone()),
        "POST",
        "/licensing/v1/installations/register",
        Some(json!({ "deviceId": "C01001ABCD", "hostname": "fw-lab", "model": "XG 86" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "registered");
    assert_eq!(body["product"], "XG Firewall");
    assert_eq!(body["features"].as_array().unwrap().len(), 6);

    let device = state.db.get_device("C01001ABCD").await.unwrap().unwrap();
    assert_eq!(device.name.as_deref(), Some("fw-lab"));
    assert_eq!(device.model.as_deref(), Some("XG 86"));
    assert_eq!(device.firmware_version.as_deref(), Some("18.5.0"));
    assert_eq!(device.device_type, "firewall");
}

#[tokio::test]
async fn explicit_register_defaults_device_fields() {
    let state = seeded_state().await;

    let (status, _) = json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/v1/installations/register",
        Some(json!({ "deviceId": 1234 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let device = state.db.get_device("1234").await.unwrap().unwrap();
    assert_eq!(device.name.as_deref(), Some("SFOS Device"));
    assert_eq!(device.model.as_deref(), Some("XG Firewall"));
}

#[tokio::test]
async fn register_is_idempotent() {
    let state = seeded_state().await;

    for _ in 0..2 {
        let (status, _) = json_request(
            build_router(state.clone()),
            "POST",
            "/api/v1/license/v1/installations/register/",
            Some(json!({ "deviceId": "C01001ABCD", "hostname": "first" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let devices = state.db.list_devices(0, 100).await.unwrap();
    assert_eq!(devices.len(), 1);
}

#[tokio::test]
async fn malformed_register_body_still_succeeds() {
    let state = seeded_state().await;

    let (status, body) = raw_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/v1/installations/register",
        "{\"deviceId\": ",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "registered");
    assert!(state.db.list_devices(0, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn register_without_license_still_succeeds() {
    let state = empty_state().await;

    let (status, body) = json_request(
        build_router(state.clone()),
        "POST",
        "/licensing/v1/installations/register",
        Some(json!({ "deviceId": "C01001ABCD" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "registered");
    assert!(state.db.get_device("C01001ABCD").await.unwrap().is_none());
}

#[tokio::test]
async fn explicit_installation_routes() {
    let state = seeded_state().await;

    let (status, body) = json_request(
        build_router(state.clone()),
        "GET",
        "/api/v1/license/installations/",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["installations"][0]["version"], "18.5.0");

    let (status, body) = json_request(
        build_router(state.clone()),
        "PUT",
        "/api/v1/license/v1/installations/abc/features",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features"][0]["name"], "Base Firewall");

    let (status, body) = json_request(
        build_router(state),
        "POST",
        "/api/v1/license/v1/installations/abc/features/refresh",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["features"][5]["name"], "Sandstorm");
}

#[tokio::test]
async fn heartbeat_refreshes_last_seen() {
    let state = seeded_state().await;
    json_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/v1/installations/register",
        Some(json!({ "deviceId": "fw-01" })),
    )
    .await;
    let before = state.db.get_device("fw-01").await.unwrap().unwrap().last_seen;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (status, body) = raw_request(
        build_router(state.clone()),
        "POST",
        "/api/v1/license/v1/installations/abc/heartbeat",
        serde_json::to_vec(&json!({ "deviceId": "fw-01" })).unwrap(),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    let after = state.db.get_device("fw-01").await.unwrap().unwrap().last_seen;
    assert!(after > before);
}

#[tokio::test]
async fn heartbeat_for_unknown_device_is_ignored() {
    let app = build_router(empty_state().await);

    let (status, body) = raw_request(
        app,
        "POST",
        "/api/v1/license/v1/installations/abc/heartbeat",
        "garbage",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}

#[tokio::test]
async fn service_endpoints() {
    let (status, body) = json_request(build_router(empty_state().await), "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");

    let (status, body) =
        json_request(build_router(empty_state().await), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn missing_ca_certificate_is_reported_in_body() {
    let app = build_router(empty_state().await);

    let (status, body) = json_request(app, "GET", "/certificates/ca", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Certificate not found");
}

#[tokio::test]
async fn responses_carry_request_id() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let app = build_router(empty_state().await);
    let response = app
        .oneshot(Request::builder().uri("/anything").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn oversized_emulated_lifetime_still_answers() {
    use std::sync::Arc;

    use sufuss::config::SufussConfig;
    use sufuss::server::{AppState, Database};

    let mut config = SufussConfig::default();
    config.emulation.expiry_days = 1_000_000_000;
    let db = Database::in_memory().await.unwrap();
    let app = build_router(AppState::new(Arc::new(db), Arc::new(config)));

    let (status, body) = json_request(app, "GET", "/licensing/v1/installations", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["installations"][0]["status"], "registered");
    assert!(body["installations"][0]["expiryDate"].is_string());
}
