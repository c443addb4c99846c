pub mod dns;
pub mod domain;
pub mod evaluator;
pub mod http;
pub mod ssl;
pub mod tcp;

use async_trait::async_trait;
use monty_common::types::{CheckType, DomainStatus, Endpoint, SslStatus};

/// What one completed probe produced. SSL and domain probes carry an
/// extra status payload alongside the plain outcome.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub succeeded: bool,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub ssl_status: Option<SslStatus>,
    pub domain_status: Option<DomainStatus>,
}

impl ProbeReport {
    pub fn success(response_time_ms: u64) -> Self {
        Self {
            succeeded: true,
            response_time_ms,
            error_message: None,
            ssl_status: None,
            domain_status: None,
        }
    }

    pub fn failure(response_time_ms: u64, message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            response_time_ms,
            error_message: Some(message.into()),
            ssl_status: None,
            domain_status: None,
        }
    }
}

/// Seam between the scheduler and the network: the scheduler only ever
/// sees this trait, so its timing behavior is testable with fakes.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeReport;
}

/// Production prober: dispatches on the endpoint's check type.
pub struct NetworkProber;

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeReport {
        match endpoint.check_type {
            CheckType::Http => http::check(endpoint).await,
            CheckType::Tcp => tcp::check(endpoint).await,
            CheckType::Dns => dns::check(endpoint).await,
            CheckType::Domain => domain::check(endpoint).await,
            CheckType::Ssl => ssl::check(endpoint).await,
        }
    }
}

/// Derive the host and port to connect to from an endpoint URL.
///
/// An explicit `host:port` wins; otherwise `https://` implies 443,
/// `http://` implies 80, and a bare host defaults to 443.
pub(crate) fn parse_host_port(url: &str) -> (String, u16) {
    let (rest, default_port) = if let Some(rest) = url.strip_prefix("https://") {
        (rest, 443)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (rest, 80)
    } else {
        (url, 443)
    };
    let host_port = rest.split('/').next().unwrap_or(rest);
    match host_port.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (host_port.to_string(), default_port),
        },
        None => (host_port.to_string(), default_port),
    }
}

/// Just the hostname, scheme, port and path stripped.
pub(crate) fn hostname(url: &str) -> String {
    parse_host_port(url).0
}
