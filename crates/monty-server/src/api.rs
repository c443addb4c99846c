use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use monty_common::types::{
    CreateEndpointRequest, EndpointWithUptime, UpdateEndpointRequest,
};
use monty_storage::{ResultStore, StorageError};
use serde::Deserialize;

use crate::state::AppState;

#[derive(serde::Serialize)]
struct ApiError {
    error: String,
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            error: msg.to_string(),
        }),
    )
        .into_response()
}

fn storage_error_response(err: &StorageError) -> Response {
    match err {
        StorageError::Validation(msg) => error_response(StatusCode::BAD_REQUEST, msg),
        StorageError::NotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, "endpoint not found")
        }
        _ => {
            tracing::error!(error = %err, "Storage operation failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
        }
    }
}

// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_secs = (chrono::Utc::now() - state.start_time).num_seconds();
    Json(serde_json::json!({ "status": "ok", "uptime_secs": uptime_secs }))
}

// GET /api/endpoints
async fn list_endpoints(State(state): State<AppState>) -> Response {
    let endpoints = match state.endpoints.list() {
        Ok(endpoints) => endpoints,
        Err(e) => return storage_error_response(&e),
    };
    let mut out = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let uptime = match state.results.uptime(&endpoint.id, None) {
            Ok(uptime) => uptime,
            Err(e) => return storage_error_response(&e),
        };
        out.push(EndpointWithUptime { endpoint, uptime });
    }
    Json(out).into_response()
}

fn create_and_register(state: &AppState, req: CreateEndpointRequest) -> Response {
    match state.endpoints.create(req) {
        Ok(endpoint) => {
            state.scheduler.register(endpoint.clone());
            (StatusCode::CREATED, Json(endpoint)).into_response()
        }
        Err(e) => storage_error_response(&e),
    }
}

// POST /api/endpoints
async fn create_endpoint(
    State(state): State<AppState>,
    Json(req): Json<CreateEndpointRequest>,
) -> Response {
    create_and_register(&state, req)
}

// PUT /api/endpoints/:id
async fn update_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateEndpointRequest>,
) -> Response {
    match state.endpoints.update(&id, req) {
        Ok(endpoint) => {
            state.scheduler.update(endpoint.clone());
            Json(endpoint).into_response()
        }
        Err(e) => storage_error_response(&e),
    }
}

/// Remove the endpoint, then deregister it from the scheduler and wait
/// for the ack before purging results, so an in-flight probe cannot
/// write a row that would outlive the purge.
async fn remove_endpoint(state: &AppState, id: &str) -> Result<(), Response> {
    state
        .endpoints
        .delete(id)
        .map_err(|e| storage_error_response(&e))?;
    state.scheduler.remove(id).await;
    if let Err(e) = state.results.purge_endpoint(id) {
        tracing::error!(endpoint_id = %id, error = %e, "Failed to purge endpoint results");
    }
    Ok(())
}

// DELETE /api/endpoints/:id
async fn delete_endpoint(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match remove_endpoint(&state, &id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(resp) => resp,
    }
}

// GET /api/endpoints/:id/statuses
async fn endpoint_statuses(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.endpoints.get(&id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "endpoint not found"),
        Err(e) => return storage_error_response(&e),
    }
    match state.results.outcomes(&id, 100) {
        Ok(outcomes) => Json(outcomes).into_response(),
        Err(e) => storage_error_response(&e),
    }
}

// GET /api/ssl-statuses
async fn ssl_statuses(State(state): State<AppState>) -> Response {
    match state.results.ssl_statuses() {
        Ok(statuses) => Json(statuses).into_response(),
        Err(e) => storage_error_response(&e),
    }
}

// GET /api/domain-statuses
async fn domain_statuses(State(state): State<AppState>) -> Response {
    match state.results.domain_statuses() {
        Ok(statuses) => Json(statuses).into_response(),
        Err(e) => storage_error_response(&e),
    }
}

// ---- Legacy form endpoints ----
//
// The old dashboard posts form-derived JSON: list fields may arrive as
// comma-separated strings and booleans as checkbox values ("on").

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    String(String),
}

impl NumberOrString {
    fn as_i64(&self) -> Option<i64> {
        match self {
            NumberOrString::Number(n) => Some(*n),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CsvOrSeq {
    Csv(String),
    Seq(Vec<serde_json::Value>),
}

impl CsvOrSeq {
    fn into_strings(self) -> Vec<String> {
        match self {
            CsvOrSeq::Csv(s) => s
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect(),
            CsvOrSeq::Seq(values) => values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CheckboxBool {
    Bool(bool),
    String(String),
}

impl CheckboxBool {
    fn as_bool(&self) -> bool {
        match self {
            CheckboxBool::Bool(b) => *b,
            CheckboxBool::String(s) => matches!(s.as_str(), "on" | "true" | "1"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyEndpointRequest {
    url: String,
    check_type: Option<String>,
    interval: Option<NumberOrString>,
    timeout: Option<NumberOrString>,
    expected_status_codes: Option<CsvOrSeq>,
    max_response_time: Option<NumberOrString>,
    tcp_port: Option<NumberOrString>,
    expected_dns_answers: Option<CsvOrSeq>,
    min_days_valid: Option<NumberOrString>,
    check_chain: Option<CheckboxBool>,
    check_domain_match: Option<CheckboxBool>,
    acceptable_tls_versions: Option<CsvOrSeq>,
}

impl LegacyEndpointRequest {
    fn into_create_request(self) -> Result<CreateEndpointRequest, String> {
        let check_type = match self.check_type {
            Some(s) => Some(s.parse::<monty_common::types::CheckType>()?),
            None => None,
        };
        let expected_status_codes = match self.expected_status_codes {
            Some(list) => {
                let mut codes = Vec::new();
                for value in list.into_strings() {
                    codes.push(
                        value
                            .parse::<u16>()
                            .map_err(|_| format!("invalid expected status code: {value}"))?,
                    );
                }
                Some(codes)
            }
            None => None,
        };
        Ok(CreateEndpointRequest {
            url: self.url,
            check_type,
            interval_secs: self.interval.and_then(|v| v.as_i64()).map(|v| v as u64),
            timeout_secs: self.timeout.and_then(|v| v.as_i64()).map(|v| v as u64),
            expected_status_codes,
            max_response_time_ms: self
                .max_response_time
                .and_then(|v| v.as_i64())
                .map(|v| v as u64),
            tcp_port: self.tcp_port.and_then(|v| v.as_i64()).map(|v| v as u16),
            expected_dns_answers: self.expected_dns_answers.map(CsvOrSeq::into_strings),
            min_days_valid: self.min_days_valid.and_then(|v| v.as_i64()),
            check_chain: self.check_chain.map(|v| v.as_bool()),
            check_domain_match: self.check_domain_match.map(|v| v.as_bool()),
            acceptable_tls_versions: self.acceptable_tls_versions.map(CsvOrSeq::into_strings),
        })
    }
}

// POST /endpoints
async fn legacy_create_endpoint(
    State(state): State<AppState>,
    Json(req): Json<LegacyEndpointRequest>,
) -> Response {
    match req.into_create_request() {
        Ok(req) => create_and_register(&state, req),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

// DELETE /endpoints/:id
async fn legacy_delete_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match remove_endpoint(&state, &id).await {
        Ok(()) => Json(serde_json::json!({ "message": "endpoint deleted" })).into_response(),
        Err(resp) => resp,
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/endpoints", get(list_endpoints).post(create_endpoint))
        .route(
            "/api/endpoints/:id",
            put(update_endpoint).delete(delete_endpoint),
        )
        .route("/api/endpoints/:id/statuses", get(endpoint_statuses))
        .route("/api/ssl-statuses", get(ssl_statuses))
        .route("/api/domain-statuses", get(domain_statuses))
        .route("/endpoints", post(legacy_create_endpoint))
        .route("/endpoints/:id", delete(legacy_delete_endpoint))
}
