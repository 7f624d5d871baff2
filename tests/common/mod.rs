//! Shared helpers for the HTTP integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sufuss::config::SufussConfig;
use sufuss::server::bootstrap::seed_demo_license;
use sufuss::server::database::{Database, License, NewLicense};
use sufuss::server::{AppState, IdGenerator};
use tower::ServiceExt;

pub const DEMO_KEY: &str = "SUFUSS-XXXX-YYYY-ZZZZ-DEMO1";

/// Predictable identifiers: `id-0`, `id-1`, ...
#[derive(Default)]
pub struct SequentialIds(AtomicUsize);

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        format!("id-{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// App state over a fresh in-memory database, without any license.
pub async fn empty_state() -> AppState {
    let db = Database::in_memory()
        .await
        .expect("failed to create database");
    AppState::new(Arc::new(db), Arc::new(SufussConfig::default()))
        .with_id_generator(Arc::new(SequentialIds::default()))
}

/// App state with the demo license seeded.
pub async fn seeded_state() -> AppState {
    let state = empty_state().await;
    seed_demo_license(&state.db, &state.config)
        .await
        .expect("failed to seed demo license")
        .expect("demo license was not created");
    state
}

/// Insert a license with the given activity and expiry offset in days.
pub async fn insert_license(state: &AppState, key: &str, is_active: bool, days: i64) -> License {
    let now = Utc::now().naive_utc();
    state
        .db
        .create_license(
            NewLicense {
                license_key: key.to_string(),
                description: None,
                status: "registered".to_string(),
                expiry_date: now + Duration::days(days),
                is_active,
            },
            "running",
            now,
        )
        .await
        .expect("failed to insert license")
}

pub fn basic_auth(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

pub fn admin_auth() -> String {
    basic_auth("admin", "admin123")
}

/// Send a request with a raw body and optional Authorization header.
pub async fn raw_request(
    app: Router,
    method: &str,
    uri: &str,
    body: impl Into<Body>,
    auth: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }

    let response = app.oneshot(builder.body(body.into()).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

/// Send a JSON request and parse the JSON answer (`{}` when there is none).
pub async fn json_request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    authed_json_request(app, method, uri, body, None).await
}

pub async fn authed_json_request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth: Option<&str>,
) -> (StatusCode, Value) {
    let bytes = body
        .map(|v| serde_json::to_vec(&v).unwrap())
        .unwrap_or_default();
    let (status, body) = raw_request(app, method, uri, bytes, auth).await;
    (status, serde_json::from_slice(&body).unwrap_or(json!({})))
}
