//! HTTP surface for the Keygate activation service.
//!
//! Two thin adapters over the single bind entry point: `GET /keys` reads the
//! device id from the query string, `POST /ids` reads it from the request
//! body. Neither carries any binding logic of its own. Administration
//! endpoints live under `/admin` and require a bearer token.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use keygate_engine::{AdminFacade, BindingEngine, EngineError, ErrorKind};
use keygate_store::{KeyRecord, Snapshot};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BindingEngine>,
    pub admin: Arc<AdminFacade>,
    pub admin_token: Arc<str>,
}

/// Query parameters for the verification and registration adapters.
#[derive(Debug, Deserialize)]
pub struct BindParams {
    /// Scope (application package); absent means the unscoped pool.
    pub package: Option<String>,
    pub key: Option<String>,
    /// Device id, query-sourced (verify adapter only).
    pub device_id: Option<String>,
    pub credential: Option<String>,
}

/// Uniform response body: `ok` plus a reason kind on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorKind>,
}

/// One bound key as reported by `GET /ids`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UsedKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub key_id: String,
    pub device_id: String,
    pub last_verified: Option<DateTime<Utc>>,
}

impl From<KeyRecord> for UsedKey {
    fn from(record: KeyRecord) -> Self {
        Self {
            scope: record.scope,
            key_id: record.key_id,
            device_id: record.device_id.unwrap_or_default(),
            last_verified: record.last_verified,
        }
    }
}

/// Request body for bulk key administration.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub key_ids: Vec<String>,
}

/// Build the HTTP API router with the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/keys", get(verify_key))
        .route("/ids", get(list_used).post(register_device))
        .route("/admin/keys", post(add_keys).delete(delete_keys))
        .route("/admin/snapshot", get(export_snapshot).put(import_snapshot))
        .with_state(state)
}

// ── Verification adapters ────────────────────────────────────────

async fn verify_key(State(state): State<AppState>, Query(params): Query<BindParams>) -> Response {
    let result = state.engine.bind(
        params.package.as_deref(),
        params.key.as_deref().unwrap_or(""),
        params.device_id.as_deref().unwrap_or(""),
        params.credential.as_deref(),
    );
    match result {
        Ok(_) => ok_response(StatusCode::OK),
        Err(err) => error_response(&err),
    }
}

async fn register_device(
    State(state): State<AppState>,
    Query(params): Query<BindParams>,
    body: String,
) -> Response {
    let result = state.engine.bind(
        params.package.as_deref(),
        params.key.as_deref().unwrap_or(""),
        body.trim(),
        params.credential.as_deref(),
    );
    match result {
        Ok(_) => ok_response(StatusCode::CREATED),
        Err(err) => error_response(&err),
    }
}

async fn list_used(State(state): State<AppState>) -> Response {
    match state.engine.list_used() {
        Ok(records) => {
            let used: Vec<UsedKey> = records.into_iter().map(UsedKey::from).collect();
            (StatusCode::OK, Json(used)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

// ── Administration ───────────────────────────────────────────────

async fn add_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<KeyBatch>,
) -> Response {
    if !admin_authorized(&headers, &state.admin_token) {
        return admin_unauthorized();
    }
    match state.admin.add_keys(batch.scope.as_deref(), &batch.key_ids) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn delete_keys(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(batch): Json<KeyBatch>,
) -> Response {
    if !admin_authorized(&headers, &state.admin_token) {
        return admin_unauthorized();
    }
    match state.admin.delete_keys(batch.scope.as_deref(), &batch.key_ids) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn export_snapshot(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !admin_authorized(&headers, &state.admin_token) {
        return admin_unauthorized();
    }
    match state.admin.export() {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn import_snapshot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(snapshot): Json<Snapshot>,
) -> Response {
    if !admin_authorized(&headers, &state.admin_token) {
        return admin_unauthorized();
    }
    match state.admin.import(&snapshot) {
        Ok(()) => ok_response(StatusCode::OK),
        Err(err) => error_response(&err),
    }
}

fn admin_authorized(headers: &HeaderMap, token: &str) -> bool {
    let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let Some(presented) = value.strip_prefix("Bearer ") else {
        return false;
    };
    presented.as_bytes().ct_eq(token.as_bytes()).into()
}

fn admin_unauthorized() -> Response {
    // The admin token is out-of-band; its failures carry no core error kind.
    tracing::warn!("admin request without a valid token");
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse {
            ok: false,
            reason: None,
        }),
    )
        .into_response()
}

// ── Response mapping ─────────────────────────────────────────────

fn ok_response(status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse {
            ok: true,
            reason: None,
        }),
    )
        .into_response()
}

/// Callers get the error kind and nothing else; storage detail stays in the
/// server log.
fn error_response(err: &EngineError) -> Response {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::MissingParameter | ErrorKind::InvalidSnapshot => StatusCode::BAD_REQUEST,
        ErrorKind::SignatureInvalid | ErrorKind::ScopeOrKeyNotFound => StatusCode::UNAUTHORIZED,
        ErrorKind::DeviceConflict => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if kind == ErrorKind::StorageFailure {
        tracing::error!(error = %err, "storage failure");
    }
    (
        status,
        Json(ApiResponse {
            ok: false,
            reason: Some(kind),
        }),
    )
        .into_response()
}
