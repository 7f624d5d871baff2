//! SFOS licensing protocol emulation.
//!
//! Firewalls running SFOS 18.5.0 talk to a family of licensing, central
//! management, update and auth endpoints that are only partly known. Anything
//! that does not hit a structured route lands here and gets a plausible
//! "licensed" answer. Nothing is ever refused: an error makes the device retry
//! aggressively or switch features off.
//!
//! Requests are sorted into a [`Bucket`] by an ordered list of rules, first
//! match wins. Every response is built fresh by [`Templates`] from the current
//! time and an injected [`IdGenerator`]; no state is kept between calls.
//!
//! The only writes are two best-effort side effects: registering the device
//! named in a registration body, and bumping `last_seen` on heartbeat. Their
//! [`BestEffort`] result is logged and discarded by the caller.

use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EmulationConfig;
use crate::errors::LicenseError;
use crate::server::database::{Database, DeviceAttributes};
use crate::server::handlers::{utc_now, AppState};
use crate::server::logging::{log_device_event, LicenseEvent};

/// Feature names SFOS expects in every installation record.
pub const SFOS_FEATURES: [&str; 6] = [
    "Base Firewall",
    "Network Protection",
    "Web Protection",
    "Email Protection",
    "Web Server Protection",
    "Sandstorm",
];

const ENDPOINT_FEATURES: [&str; 2] = ["Endpoint Protection", "Endpoint Detection and Response"];

const SERVICE_NAMES: [&str; 3] = ["update", "central", "licensing"];

const DEFAULT_DEVICE_NAME: &str = "SFOS Device";
const EMULATED_DEVICE_TYPE: &str = "firewall";

// ============================================================================
// Identifier source
// ============================================================================

/// Produces the fresh identifiers embedded in fabricated responses.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Random v4 UUIDs, the production identifier source.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

// ============================================================================
// Response shapes
// ============================================================================

/// A `{name, status}` pair, used for features and services alike.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub name: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRecord {
    pub id: String,
    pub product: String,
    pub version: String,
    pub status: &'static str,
    pub registration_date: String,
    pub last_seen_date: String,
    pub expiry_date: String,
    pub features: Vec<StatusEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallationList {
    pub installations: Vec<InstallationRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureList {
    pub features: Vec<StatusEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointSecurityStatus {
    pub status: &'static str,
    pub licensed: bool,
    pub features: Vec<StatusEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CentralStatus {
    pub status: &'static str,
    pub account: NamedEntity,
    pub tenant: NamedEntity,
}

#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgement {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDirectory {
    pub services: Vec<StatusEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadOffer {
    pub status: &'static str,
    pub url: String,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    pub token: String,
    pub expires_in: u64,
    pub token_type: &'static str,
}

/// The universal "you are licensed" answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicensedResponse {
    pub status: &'static str,
    pub licensed: bool,
    pub expiry_date: String,
    pub installation_id: String,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<StatusEntry>>,
}

/// Any response the emulator can fabricate.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EmulatedResponse {
    Installation(InstallationRecord),
    Installations(InstallationList),
    Features(FeatureList),
    EndpointSecurity(EndpointSecurityStatus),
    Central(CentralStatus),
    Acknowledged(Acknowledgement),
    Services(ServiceDirectory),
    Download(DownloadOffer),
    Auth(AuthToken),
    Licensed(LicensedResponse),
}

impl IntoResponse for EmulatedResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Timestamp in the `isoformat()` shape SFOS was observed to accept.
pub fn iso_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn entries(names: &[&'static str], status: &'static str) -> Vec<StatusEntry> {
    names.iter().map(|&name| StatusEntry { name, status }).collect()
}

/// Builds fabricated responses.
///
/// Pure: the output depends only on `now`, the identifiers drawn from `ids`
/// and the emulation profile.
pub struct Templates<'a> {
    now: NaiveDateTime,
    ids: &'a dyn IdGenerator,
    profile: &'a EmulationConfig,
}

impl<'a> Templates<'a> {
    pub fn new(now: NaiveDateTime, ids: &'a dyn IdGenerator, profile: &'a EmulationConfig) -> Self {
        Self { now, ids, profile }
    }

    /// `now + expiry_days`, saturating at the latest representable instant.
    fn expiry(&self) -> String {
        let expiry = Duration::try_days(self.profile.expiry_days)
            .and_then(|lifetime| self.now.checked_add_signed(lifetime))
            .unwrap_or(NaiveDateTime::MAX);
        iso_timestamp(expiry)
    }

    pub fn sfos_features(&self) -> Vec<StatusEntry> {
        entries(&SFOS_FEATURES, "registered")
    }

    pub fn installation(&self) -> InstallationRecord {
        let now = iso_timestamp(self.now);
        InstallationRecord {
            id: self.ids.next_id(),
            product: self.profile.product.clone(),
            version: self.profile.version.clone(),
            status: "registered",
            registration_date: now.clone(),
            last_seen_date: now,
            expiry_date: self.expiry(),
            features: self.sfos_features(),
        }
    }

    pub fn installation_list(&self) -> InstallationList {
        InstallationList {
            installations: vec![self.installation()],
        }
    }

    pub fn feature_list(&self) -> FeatureList {
        FeatureList {
            features: self.sfos_features(),
        }
    }

    pub fn endpoint_security(&self) -> EndpointSecurityStatus {
        EndpointSecurityStatus {
            status: "active",
            licensed: true,
            features: entries(&ENDPOINT_FEATURES, "registered"),
        }
    }

    pub fn central(&self) -> CentralStatus {
        CentralStatus {
            status: "connected",
            account: NamedEntity {
                id: self.ids.next_id(),
                name: self.profile.account_name.clone(),
            },
            tenant: NamedEntity {
                id: self.ids.next_id(),
                name: self.profile.tenant_name.clone(),
            },
        }
    }

    pub fn api_ack(&self) -> Acknowledgement {
        Acknowledgement {
            status: "success",
            message: "API request processed successfully",
        }
    }

    pub fn service_directory(&self) -> ServiceDirectory {
        ServiceDirectory {
            services: entries(&SERVICE_NAMES, "active"),
        }
    }

    pub fn download(&self) -> DownloadOffer {
        DownloadOffer {
            status: "success",
            url: self.profile.download_url.clone(),
            message: "Download available",
        }
    }

    pub fn auth_token(&self) -> AuthToken {
        AuthToken {
            token: format!("dummy-token-{}", self.ids.next_id()),
            expires_in: self.profile.token_expires_in,
            token_type: "Bearer",
        }
    }

    /// Answer for requests no rule recognizes.
    pub fn licensed(&self) -> LicensedResponse {
        LicensedResponse {
            status: "registered",
            licensed: true,
            expiry_date: self.expiry(),
            installation_id: self.ids.next_id(),
            message: "License is valid",
            features: None,
        }
    }

    /// Answer substituted for a failed license-shaped request.
    pub fn recovered_license(&self) -> LicensedResponse {
        LicensedResponse {
            features: Some(self.sfos_features()),
            ..self.licensed()
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Endpoint family a request path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    LicensingInstallations,
    EndpointSecurity,
    CentralManagement,
    GenericApi,
    Services,
    Downloads,
    Auth,
    Default,
}

/// Which installation shape a licensing request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationRequest {
    Register,
    Features,
    List,
}

impl InstallationRequest {
    pub fn of(path: &str) -> Self {
        if path.contains("register") {
            InstallationRequest::Register
        } else if path.contains("features") {
            InstallationRequest::Features
        } else {
            InstallationRequest::List
        }
    }
}

/// One entry of the dispatch table.
struct Rule {
    bucket: Bucket,
    matches: fn(&str) -> bool,
    respond: fn(&Templates<'_>, &str) -> EmulatedResponse,
}

fn is_licensing_installations(path: &str) -> bool {
    path.starts_with("licensing/v1/installations") || path.starts_with("licensing/installations")
}

fn is_endpoint_security(path: &str) -> bool {
    path.starts_with("endpoint-security/v1")
}

fn is_central(path: &str) -> bool {
    path.starts_with("central/")
}

fn is_generic_api(path: &str) -> bool {
    path.starts_with("api/")
}

fn is_services(path: &str) -> bool {
    path.starts_with("services/")
}

fn is_download(path: &str) -> bool {
    ["download", "update", "firmware"]
        .iter()
        .any(|k| path.contains(k))
}

fn is_auth(path: &str) -> bool {
    ["auth", "token", "login"].iter().any(|k| path.contains(k))
}

fn respond_installations(t: &Templates<'_>, path: &str) -> EmulatedResponse {
    match InstallationRequest::of(path) {
        InstallationRequest::Register => EmulatedResponse::Installation(t.installation()),
        InstallationRequest::Features => EmulatedResponse::Features(t.feature_list()),
        InstallationRequest::List => EmulatedResponse::Installations(t.installation_list()),
    }
}

fn respond_endpoint_security(t: &Templates<'_>, _: &str) -> EmulatedResponse {
    EmulatedResponse::EndpointSecurity(t.endpoint_security())
}

fn respond_central(t: &Templates<'_>, _: &str) -> EmulatedResponse {
    EmulatedResponse::Central(t.central())
}

fn respond_api(t: &Templates<'_>, _: &str) -> EmulatedResponse {
    EmulatedResponse::Acknowledged(t.api_ack())
}

fn respond_services(t: &Templates<'_>, _: &str) -> EmulatedResponse {
    EmulatedResponse::Services(t.service_directory())
}

fn respond_download(t: &Templates<'_>, _: &str) -> EmulatedResponse {
    EmulatedResponse::Download(t.download())
}

fn respond_auth(t: &Templates<'_>, _: &str) -> EmulatedResponse {
    EmulatedResponse::Auth(t.auth_token())
}

/// Evaluated top to bottom; the order is the priority.
static RULES: [Rule; 7] = [
    Rule {
        bucket: Bucket::LicensingInstallations,
        matches: is_licensing_installations,
        respond: respond_installations,
    },
    Rule {
        bucket: Bucket::EndpointSecurity,
        matches: is_endpoint_security,
        respond: respond_endpoint_security,
    },
    Rule {
        bucket: Bucket::CentralManagement,
        matches: is_central,
        respond: respond_central,
    },
    Rule {
        bucket: Bucket::GenericApi,
        matches: is_generic_api,
        respond: respond_api,
    },
    Rule {
        bucket: Bucket::Services,
        matches: is_services,
        respond: respond_services,
    },
    Rule {
        bucket: Bucket::Downloads,
        matches: is_download,
        respond: respond_download,
    },
    Rule {
        bucket: Bucket::Auth,
        matches: is_auth,
        respond: respond_auth,
    },
];

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

fn find_rule(path: &str) -> Option<&'static Rule> {
    RULES.iter().find(|rule| (rule.matches)(path))
}

/// Bucket of a request path.
pub fn classify(path: &str) -> Bucket {
    find_rule(normalize(path)).map_or(Bucket::Default, |rule| rule.bucket)
}

/// Classify `path` and fabricate the matching response.
pub fn dispatch(path: &str, templates: &Templates<'_>) -> (Bucket, EmulatedResponse) {
    let path = normalize(path);
    match find_rule(path) {
        Some(rule) => (rule.bucket, (rule.respond)(templates, path)),
        None => (
            Bucket::Default,
            EmulatedResponse::Licensed(templates.licensed()),
        ),
    }
}

// ============================================================================
// Best-effort side effects
// ============================================================================

/// Why a side effect did not happen. Never shown to the client.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("request body carries no deviceId")]
    NoDeviceId,
    #[error("no active license to bind the device to")]
    NoActiveLicense,
    #[error("device is already registered")]
    AlreadyRegistered,
    #[error("device is not registered")]
    UnknownDevice,
    #[error(transparent)]
    Store(#[from] LicenseError),
}

/// Outcome of an opportunistic write. Callers log it and move on: the
/// response to the device is the same either way.
pub type BestEffort = Result<(), SkipReason>;

fn body_str<'b>(body: &'b Value, key: &str) -> Option<&'b str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// The `deviceId` of a request body. Numbers are accepted as well as strings.
pub fn device_id_from_body(body: Option<&Value>) -> Option<String> {
    match body?.get("deviceId")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Create the device a registration body describes, bound to the first
/// active license. Existing devices are left untouched.
pub async fn record_registration(
    db: &Database,
    body: Option<&Value>,
    peer: Option<SocketAddr>,
    profile: &EmulationConfig,
    now: NaiveDateTime,
) -> BestEffort {
    let device_id = device_id_from_body(body).ok_or(SkipReason::NoDeviceId)?;
    let license = db
        .first_active_license()
        .await?
        .ok_or(SkipReason::NoActiveLicense)?;

    if db.get_device(&device_id).await?.is_some() {
        return Err(SkipReason::AlreadyRegistered);
    }

    let field = |key: &str| body.and_then(|b| body_str(b, key)).map(str::to_string);
    let attrs = DeviceAttributes {
        name: field("hostname").or_else(|| Some(DEFAULT_DEVICE_NAME.to_string())),
        device_type: Some(EMULATED_DEVICE_TYPE.to_string()),
        model: field("model").or_else(|| Some(profile.product.clone())),
        firmware_version: field("version").or_else(|| Some(profile.version.clone())),
        ip_address: peer.map(|addr| addr.ip().to_string()),
    };

    db.create_device(&device_id, &attrs, license.id, now).await?;
    log_device_event(
        LicenseEvent::DeviceRegistered,
        &license.license_key,
        &device_id,
        attrs.name.as_deref(),
    );
    Ok(())
}

/// Bump `last_seen` of the device named in a heartbeat body.
pub async fn record_heartbeat(db: &Database, body: Option<&Value>, now: NaiveDateTime) -> BestEffort {
    let device_id = device_id_from_body(body).ok_or(SkipReason::NoDeviceId)?;
    let device = db
        .touch_device(&device_id, now)
        .await?
        .ok_or(SkipReason::UnknownDevice)?;
    let license_key = db
        .get_license(device.license_id)
        .await?
        .map(|license| license.license_key)
        .unwrap_or_default();
    log_device_event(
        LicenseEvent::Heartbeat,
        &license_key,
        &device.device_id,
        device.name.as_deref(),
    );
    Ok(())
}

fn discard(effect: &str, outcome: BestEffort) {
    // Deliberately ignored: the device gets its canned answer regardless.
    if let Err(reason) = outcome {
        debug!(effect, %reason, "Skipped emulator side effect");
    }
}

// ============================================================================
// Request plumbing
// ============================================================================

/// Read the whole body, treating any failure as an empty body.
async fn read_body(body: Body, limit: usize) -> Bytes {
    match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("[SFOS] Could not read request body: {e}");
            Bytes::new()
        }
    }
}

/// Best-effort JSON parse. Anything unparsable means "no extra information".
fn parse_json(bytes: &Bytes) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }
    serde_json::from_slice(bytes).ok()
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

struct Incoming {
    method: Method,
    path: String,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    body: Option<Value>,
}

async fn split_request(request: Request, limit: usize) -> Incoming {
    let peer = peer_addr(&request);
    let (parts, body) = request.into_parts();
    let bytes = read_body(body, limit).await;
    if !bytes.is_empty() {
        info!("[SFOS] Body: {}", String::from_utf8_lossy(&bytes));
    }

    Incoming {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers: parts.headers,
        peer,
        body: parse_json(&bytes),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Catch-all for every request no structured route claims, any method.
pub async fn emulation_fallback(State(state): State<AppState>, request: Request) -> Response {
    let incoming = split_request(request, state.config.emulation.max_body_bytes).await;
    info!(
        "[SFOS] Catch-all received: {} {}",
        incoming.method, incoming.path
    );
    debug!("[SFOS] Headers: {:?}", incoming.headers);

    let now = utc_now();
    let templates = state.templates(now);
    let (bucket, response) = dispatch(&incoming.path, &templates);
    info!(?bucket, "[SFOS] Answering {}", incoming.path);

    if bucket == Bucket::LicensingInstallations
        && InstallationRequest::of(&incoming.path) == InstallationRequest::Register
    {
        let outcome = record_registration(
            &state.db,
            incoming.body.as_ref(),
            incoming.peer,
            &state.config.emulation,
            now,
        )
        .await;
        discard("registration", outcome);
    }

    response.into_response()
}

/// `GET /api/v1/license/installations` and its `v1/` twin.
pub async fn installations_handler(State(state): State<AppState>) -> Response {
    info!("[SFOS] Installation list requested");
    EmulatedResponse::Installations(state.templates(utc_now()).installation_list()).into_response()
}

/// `POST /api/v1/license/v1/installations/register`.
pub async fn register_installation_handler(
    State(state): State<AppState>,
    request: Request,
) -> Response {
    let incoming = split_request(request, state.config.emulation.max_body_bytes).await;
    info!("[SFOS] Processing registration request");

    let now = utc_now();
    let outcome = record_registration(
        &state.db,
        incoming.body.as_ref(),
        incoming.peer,
        &state.config.emulation,
        now,
    )
    .await;
    discard("registration", outcome);

    EmulatedResponse::Installation(state.templates(now).installation()).into_response()
}

/// `POST …/{installation_id}/features/refresh` and `PUT …/{installation_id}/features`.
pub async fn refresh_features_handler(
    State(state): State<AppState>,
    Path(installation_id): Path<String>,
) -> Response {
    info!(installation_id = %installation_id, "[SFOS] Feature refresh requested");
    EmulatedResponse::Features(state.templates(utc_now()).feature_list()).into_response()
}

/// `POST …/{installation_id}/heartbeat`. Always an empty 200.
pub async fn installation_heartbeat_handler(
    State(state): State<AppState>,
    Path(installation_id): Path<String>,
    request: Request,
) -> StatusCode {
    let incoming = split_request(request, state.config.emulation.max_body_bytes).await;
    debug!(installation_id = %installation_id, "[SFOS] Heartbeat received");

    let outcome = record_heartbeat(&state.db, incoming.body.as_ref(), utc_now()).await;
    discard("heartbeat", outcome);

    StatusCode::OK
}
