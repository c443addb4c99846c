use hickory_resolver::TokioResolver;
use monty_common::types::Endpoint;
use std::time::{Duration, Instant};

use super::ProbeReport;

/// Did the resolved answer set satisfy the endpoint's expectations?
/// An empty expectation list accepts any successful resolution.
pub(crate) fn answers_match(resolved: &[String], expected: &[String]) -> bool {
    if expected.is_empty() {
        return true;
    }
    resolved.iter().any(|a| expected.contains(a))
}

/// Resolve the endpoint's hostname and compare the answers against
/// `expected_dns_answers`.
pub async fn check(endpoint: &Endpoint) -> ProbeReport {
    let started = Instant::now();
    let host = super::hostname(&endpoint.url);

    let resolver = match TokioResolver::builder_tokio() {
        Ok(builder) => builder.build(),
        Err(e) => {
            return ProbeReport::failure(0, format!("failed to build DNS resolver: {e}"));
        }
    };

    match tokio::time::timeout(
        Duration::from_secs(endpoint.timeout_secs),
        resolver.lookup_ip(host.clone()),
    )
    .await
    {
        Ok(Ok(lookup)) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let resolved: Vec<String> = lookup.iter().map(|ip| ip.to_string()).collect();
            if resolved.is_empty() {
                ProbeReport::failure(elapsed_ms, format!("no records returned for {host}"))
            } else if answers_match(&resolved, &endpoint.expected_dns_answers) {
                ProbeReport::success(elapsed_ms)
            } else {
                ProbeReport::failure(
                    elapsed_ms,
                    format!(
                        "resolved [{}], none matched the expected answers",
                        resolved.join(", ")
                    ),
                )
            }
        }
        Ok(Err(e)) => ProbeReport::failure(
            started.elapsed().as_millis() as u64,
            format!("lookup for {host} failed: {e}"),
        ),
        Err(_) => ProbeReport::failure(
            started.elapsed().as_millis() as u64,
            format!("lookup for {host} timed out after {}s", endpoint.timeout_secs),
        ),
    }
}
