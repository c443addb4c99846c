mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{build_test_context, request_json};
use monty_common::types::{CheckOutcome, SslStatus};
use monty_storage::ResultStore;
use serde_json::json;

#[tokio::test]
async fn test_health() {
    let ctx = build_test_context().unwrap();
    let (status, body) = request_json(&ctx.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["uptime_secs"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn test_create_endpoint_applies_defaults() {
    let ctx = build_test_context().unwrap();
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/api/endpoints",
        Some(json!({ "url": "https://example.com", "interval": 30 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["url"], "https://example.com");
    assert_eq!(body["check_type"], "http");
    assert_eq!(body["interval"], 30);
    assert_eq!(body["timeout"], 30);
    assert_eq!(body["max_response_time"], 5000);
    assert_eq!(body["min_days_valid"], 7);
    assert_eq!(body["check_chain"], true);
    assert_eq!(body["acceptable_tls_versions"], json!(["TLS 1.2", "TLS 1.3"]));
    assert!(body["id"].as_str().unwrap().parse::<i64>().is_ok());
}

#[tokio::test]
async fn test_create_endpoint_validation_error() {
    let ctx = build_test_context().unwrap();
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/api/endpoints",
        Some(json!({ "url": "db.internal", "check_type": "tcp" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("tcp_port"));
}

#[tokio::test]
async fn test_list_endpoints_uptime_null_before_first_outcome() {
    let ctx = build_test_context().unwrap();
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/api/endpoints",
        Some(json!({ "url": "https://example.com" })),
    )
    .await;

    let (status, body) = request_json(&ctx.app, "GET", "/api/endpoints", None).await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"], created["id"]);
    assert!(list[0]["uptime"].is_null());
}

#[tokio::test]
async fn test_list_endpoints_uptime_after_outcomes() {
    let ctx = build_test_context().unwrap();
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/api/endpoints",
        Some(json!({ "url": "https://example.com" })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    for succeeded in [true, true, false, true] {
        ctx.state
            .results
            .append_outcome(&CheckOutcome {
                id: monty_common::id::next_id(),
                endpoint_id: id.clone(),
                succeeded,
                response_time_ms: 12,
                error_message: (!succeeded).then(|| "boom".to_string()),
                checked_at: Utc::now(),
            })
            .unwrap();
    }

    let (_, body) = request_json(&ctx.app, "GET", "/api/endpoints", None).await;
    let uptime = body[0]["uptime"].as_f64().unwrap();
    assert!((uptime - 75.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_update_endpoint() {
    let ctx = build_test_context().unwrap();
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/api/endpoints",
        Some(json!({ "url": "https://example.com" })),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = request_json(
        &ctx.app,
        "PUT",
        &format!("/api/endpoints/{id}"),
        Some(json!({ "interval": 120, "expected_status_codes": [200, 204] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["interval"], 120);
    assert_eq!(body["expected_status_codes"], json!([200, 204]));
    assert_eq!(body["url"], "https://example.com");
}

#[tokio::test]
async fn test_update_unknown_endpoint_is_404() {
    let ctx = build_test_context().unwrap();
    let (status, body) = request_json(
        &ctx.app,
        "PUT",
        "/api/endpoints/999",
        Some(json!({ "interval": 120 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "endpoint not found");
}

#[tokio::test]
async fn test_delete_endpoint_purges_results() {
    let ctx = build_test_context().unwrap();
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/api/endpoints",
        Some(json!({ "url": "https://example.com" })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    ctx.state
        .results
        .append_outcome(&CheckOutcome {
            id: monty_common::id::next_id(),
            endpoint_id: id.clone(),
            succeeded: true,
            response_time_ms: 10,
            error_message: None,
            checked_at: Utc::now(),
        })
        .unwrap();

    let (status, _) =
        request_json(&ctx.app, "DELETE", &format!("/api/endpoints/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = request_json(&ctx.app, "GET", "/api/endpoints", None).await;
    assert!(body.as_array().unwrap().is_empty());
    assert!(ctx.state.results.outcomes(&id, 10).unwrap().is_empty());

    let (status, _) =
        request_json(&ctx.app, "DELETE", &format!("/api/endpoints/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_endpoint_statuses_route() {
    let ctx = build_test_context().unwrap();
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/api/endpoints",
        Some(json!({ "url": "https://example.com" })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    ctx.state
        .results
        .append_outcome(&CheckOutcome {
            id: monty_common::id::next_id(),
            endpoint_id: id.clone(),
            succeeded: false,
            response_time_ms: 77,
            error_message: Some("unexpected status code 503".to_string()),
            checked_at: Utc::now(),
        })
        .unwrap();

    let (status, body) = request_json(
        &ctx.app,
        "GET",
        &format!("/api/endpoints/{id}/statuses"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["succeeded"], false);
    assert_eq!(rows[0]["response_time"], 77);
    assert_eq!(rows[0]["error_message"], "unexpected status code 503");

    let (status, _) = request_json(&ctx.app, "GET", "/api/endpoints/999/statuses", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ssl_statuses_route() {
    let ctx = build_test_context().unwrap();
    let (status, body) = request_json(&ctx.app, "GET", "/api/ssl-statuses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let now = Utc::now();
    ctx.state
        .results
        .upsert_ssl_status(&SslStatus {
            id: monty_common::id::next_id(),
            endpoint_id: "ep1".to_string(),
            certificate_expires_at: Some(now + chrono::Duration::days(60)),
            days_until_expiry: Some(60),
            is_valid: true,
            domain_matches: true,
            chain_valid: true,
            issuer: Some("CN=Test CA".to_string()),
            subject: Some("CN=example.com".to_string()),
            serial_number: Some("0a:0b".to_string()),
            tls_version: Some("TLS 1.3".to_string()),
            error_message: None,
            checked_at: now,
        })
        .unwrap();

    let (_, body) = request_json(&ctx.app, "GET", "/api/ssl-statuses", None).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["is_valid"], true);
    assert_eq!(rows[0]["days_until_expiry"], 60);
    assert_eq!(rows[0]["tls_version"], "TLS 1.3");
}

#[tokio::test]
async fn test_legacy_create_parses_form_values() {
    let ctx = build_test_context().unwrap();
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/endpoints",
        Some(json!({
            "url": "https://example.com",
            "check_type": "ssl",
            "interval": "45",
            "min_days_valid": "14",
            "expected_status_codes": "200, 301",
            "acceptable_tls_versions": "TLS 1.2,TLS 1.3",
            "check_chain": "on",
            "check_domain_match": "on"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["check_type"], "ssl");
    assert_eq!(body["interval"], 45);
    assert_eq!(body["min_days_valid"], 14);
    assert_eq!(body["expected_status_codes"], json!([200, 301]));
    assert_eq!(body["acceptable_tls_versions"], json!(["TLS 1.2", "TLS 1.3"]));
    assert_eq!(body["check_chain"], true);
}

#[tokio::test]
async fn test_legacy_create_rejects_bad_status_code() {
    let ctx = build_test_context().unwrap();
    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/endpoints",
        Some(json!({
            "url": "https://example.com",
            "expected_status_codes": "200, banana"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("banana"));
}

#[tokio::test]
async fn test_legacy_delete_returns_message() {
    let ctx = build_test_context().unwrap();
    let (_, created) = request_json(
        &ctx.app,
        "POST",
        "/endpoints",
        Some(json!({ "url": "https://example.com" })),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = request_json(&ctx.app, "DELETE", &format!("/endpoints/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "endpoint deleted");
}

#[tokio::test]
async fn test_responses_carry_trace_id_header() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    let ctx = build_test_context().unwrap();
    let resp = ctx
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let trace_id = resp.headers().get("x-trace-id").unwrap().to_str().unwrap();
    assert_eq!(trace_id.len(), 16);
}
