use monty_common::types::Endpoint;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::ProbeReport;

/// Open a TCP connection to `host:tcp_port`. Success means the
/// connection was established within the timeout; the stream is
/// dropped right away.
pub async fn check(endpoint: &Endpoint) -> ProbeReport {
    let started = Instant::now();
    let host = super::hostname(&endpoint.url);
    let addr = format!("{host}:{}", endpoint.tcp_port);

    match tokio::time::timeout(
        Duration::from_secs(endpoint.timeout_secs),
        TcpStream::connect(&addr),
    )
    .await
    {
        Ok(Ok(_stream)) => ProbeReport::success(started.elapsed().as_millis() as u64),
        Ok(Err(e)) => ProbeReport::failure(
            started.elapsed().as_millis() as u64,
            format!("connection to {addr} failed: {e}"),
        ),
        Err(_) => ProbeReport::failure(
            started.elapsed().as_millis() as u64,
            format!(
                "connection to {addr} timed out after {}s",
                endpoint.timeout_secs
            ),
        ),
    }
}
