use monty_common::types::Endpoint;
use std::time::{Duration, Instant};

use super::ProbeReport;

/// Status codes counted as healthy when an endpoint does not list any
/// expected ones.
const DEFAULT_ACCEPTED: [u16; 18] = [
    200, 201, 202, 203, 204, 205, 206, 207, 208, 226, 300, 301, 302, 303, 304, 305, 307, 308,
];

pub(crate) fn status_accepted(code: u16, expected: &[u16]) -> bool {
    if expected.is_empty() {
        DEFAULT_ACCEPTED.contains(&code)
    } else {
        expected.contains(&code)
    }
}

/// GET the endpoint URL. Redirects are not followed; a redirect status
/// is judged as-is against the expected codes.
pub async fn check(endpoint: &Endpoint) -> ProbeReport {
    let started = Instant::now();
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(endpoint.timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .build()
    {
        Ok(client) => client,
        Err(e) => return ProbeReport::failure(0, format!("failed to build HTTP client: {e}")),
    };

    match client.get(&endpoint.url).send().await {
        Ok(response) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let code = response.status().as_u16();
            let status_ok = status_accepted(code, &endpoint.expected_status_codes);
            let fast_enough = elapsed_ms <= endpoint.max_response_time_ms;
            if !status_ok {
                ProbeReport::failure(elapsed_ms, format!("unexpected status code {code}"))
            } else if !fast_enough {
                ProbeReport::failure(
                    elapsed_ms,
                    format!(
                        "response took {elapsed_ms}ms, limit is {}ms",
                        endpoint.max_response_time_ms
                    ),
                )
            } else {
                ProbeReport::success(elapsed_ms)
            }
        }
        Err(e) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if e.is_timeout() {
                ProbeReport::failure(
                    elapsed_ms,
                    format!("request timed out after {}s", endpoint.timeout_secs),
                )
            } else {
                ProbeReport::failure(elapsed_ms, format!("request failed: {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use monty_common::types::{CheckType, CreateEndpointRequest};

    fn endpoint(url: &str) -> Endpoint {
        CreateEndpointRequest {
            url: url.to_string(),
            check_type: Some(CheckType::Http),
            timeout_secs: Some(2),
            ..Default::default()
        }
        .into_endpoint("test".to_string(), chrono::Utc::now())
    }

    async fn serve(router: Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    #[test]
    fn test_status_accepted_defaults_to_2xx_3xx() {
        assert!(status_accepted(200, &[]));
        assert!(status_accepted(204, &[]));
        assert!(status_accepted(301, &[]));
        assert!(status_accepted(308, &[]));
        assert!(!status_accepted(404, &[]));
        assert!(!status_accepted(500, &[]));
        assert!(!status_accepted(306, &[]));
    }

    #[test]
    fn test_status_accepted_explicit_list() {
        assert!(status_accepted(404, &[404]));
        assert!(!status_accepted(200, &[404]));
    }

    #[tokio::test]
    async fn test_check_success_and_failure_statuses() {
        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/missing",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "gone") }),
            );
        let port = serve(router).await;

        let report = check(&endpoint(&format!("http://127.0.0.1:{port}/ok"))).await;
        assert!(report.succeeded, "{:?}", report.error_message);
        assert!(report.error_message.is_none());

        let report = check(&endpoint(&format!("http://127.0.0.1:{port}/missing"))).await;
        assert!(!report.succeeded);
        assert!(report.error_message.unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_check_honors_expected_codes() {
        let router = Router::new().route(
            "/teapot",
            get(|| async { (axum::http::StatusCode::IM_A_TEAPOT, "short and stout") }),
        );
        let port = serve(router).await;

        let mut ep = endpoint(&format!("http://127.0.0.1:{port}/teapot"));
        ep.expected_status_codes = vec![418];
        let report = check(&ep).await;
        assert!(report.succeeded);
    }

    #[tokio::test]
    async fn test_check_enforces_max_response_time() {
        let router = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_millis(150)).await;
                "finally"
            }),
        );
        let port = serve(router).await;

        let mut ep = endpoint(&format!("http://127.0.0.1:{port}/slow"));
        ep.max_response_time_ms = 50;
        let report = check(&ep).await;
        assert!(!report.succeeded);
        assert!(report.error_message.unwrap().contains("limit is 50ms"));
    }

    #[tokio::test]
    async fn test_check_does_not_follow_redirects() {
        let router = Router::new().route(
            "/moved",
            get(|| async {
                (
                    axum::http::StatusCode::MOVED_PERMANENTLY,
                    [("location", "/elsewhere")],
                    "",
                )
            }),
        );
        let port = serve(router).await;

        // 301 is accepted by the default table without following it.
        let report = check(&endpoint(&format!("http://127.0.0.1:{port}/moved"))).await;
        assert!(report.succeeded);

        // With an explicit 200 expectation the redirect must fail.
        let mut ep = endpoint(&format!("http://127.0.0.1:{port}/moved"));
        ep.expected_status_codes = vec![200];
        let report = check(&ep).await;
        assert!(!report.succeeded);
        assert!(report.error_message.unwrap().contains("301"));
    }

    #[tokio::test]
    async fn test_check_reports_connection_failure() {
        // Nothing listens on this port.
        let report = check(&endpoint("http://127.0.0.1:9/unreachable")).await;
        assert!(!report.succeeded);
        assert!(report.error_message.is_some());
    }
}
