#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use chrono::Utc;
use monty_common::types::Endpoint;
use monty_server::app;
use monty_server::probe::{ProbeReport, Prober};
use monty_server::scheduler::ProbeScheduler;
use monty_server::state::AppState;
use monty_storage::{EndpointStore, SqliteResultStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: axum::Router,
}

/// Prober that never completes, so API tests observe stores exactly as
/// they seeded them.
struct PendingProber;

#[async_trait]
impl Prober for PendingProber {
    async fn probe(&self, _endpoint: &Endpoint) -> ProbeReport {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

pub fn build_test_context() -> Result<TestContext> {
    monty_common::id::init(1, 1);

    let temp_dir = tempfile::tempdir()?;
    let endpoints = Arc::new(EndpointStore::new(temp_dir.path())?);
    let results: Arc<dyn monty_storage::ResultStore> =
        Arc::new(SqliteResultStore::new(temp_dir.path())?);

    let scheduler = ProbeScheduler::spawn(Arc::new(PendingProber), results.clone(), 4);

    let state = AppState {
        endpoints,
        results,
        scheduler,
        start_time: Utc::now(),
    };
    let app = app::build_http_app(state.clone());

    Ok(TestContext {
        temp_dir,
        state,
        app,
    })
}

pub async fn request_json(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    builder = builder.header("Content-Type", "application/json");

    let req_body = match body {
        Some(body) => Body::from(body.to_string()),
        None => Body::empty(),
    };
    let req = builder.body(req_body).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should not fail");
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}
