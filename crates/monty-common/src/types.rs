use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of probe performed against an endpoint.
///
/// # Examples
///
/// ```
/// use monty_common::types::CheckType;
///
/// let ct: CheckType = "ssl".parse().unwrap();
/// assert_eq!(ct, CheckType::Ssl);
/// assert_eq!(ct.to_string(), "ssl");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Http,
    Tcp,
    Dns,
    Domain,
    Ssl,
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckType::Http => write!(f, "http"),
            CheckType::Tcp => write!(f, "tcp"),
            CheckType::Dns => write!(f, "dns"),
            CheckType::Domain => write!(f, "domain"),
            CheckType::Ssl => write!(f, "ssl"),
        }
    }
}

impl std::str::FromStr for CheckType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(CheckType::Http),
            "tcp" => Ok(CheckType::Tcp),
            "dns" => Ok(CheckType::Dns),
            "domain" => Ok(CheckType::Domain),
            "ssl" => Ok(CheckType::Ssl),
            _ => Err(format!("unknown check type: {s}")),
        }
    }
}

/// A monitored endpoint and its full probe configuration.
///
/// Wire names keep the shorter forms the dashboard already speaks:
/// `interval` and `timeout` are seconds, `max_response_time` is
/// milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub url: String,
    pub check_type: CheckType,
    #[serde(rename = "interval")]
    pub interval_secs: u64,
    #[serde(rename = "timeout")]
    pub timeout_secs: u64,
    /// HTTP only. Empty means any 2xx/3xx status is a success.
    pub expected_status_codes: Vec<u16>,
    #[serde(rename = "max_response_time")]
    pub max_response_time_ms: u64,
    /// TCP only.
    pub tcp_port: u16,
    /// DNS only. Empty means any successful resolution passes.
    pub expected_dns_answers: Vec<String>,
    /// SSL only: minimum days of remaining certificate validity.
    pub min_days_valid: i64,
    pub check_chain: bool,
    pub check_domain_match: bool,
    pub acceptable_tls_versions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub fn default_acceptable_tls_versions() -> Vec<String> {
    vec!["TLS 1.2".to_string(), "TLS 1.3".to_string()]
}

/// Body of `POST /api/endpoints`. Everything except `url` is optional
/// and falls back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEndpointRequest {
    pub url: String,
    pub check_type: Option<CheckType>,
    #[serde(rename = "interval")]
    pub interval_secs: Option<u64>,
    #[serde(rename = "timeout")]
    pub timeout_secs: Option<u64>,
    pub expected_status_codes: Option<Vec<u16>>,
    #[serde(rename = "max_response_time")]
    pub max_response_time_ms: Option<u64>,
    pub tcp_port: Option<u16>,
    pub expected_dns_answers: Option<Vec<String>>,
    pub min_days_valid: Option<i64>,
    pub check_chain: Option<bool>,
    pub check_domain_match: Option<bool>,
    pub acceptable_tls_versions: Option<Vec<String>>,
}

impl CreateEndpointRequest {
    /// Materialize a full endpoint, filling unset fields with defaults.
    pub fn into_endpoint(self, id: String, created_at: DateTime<Utc>) -> Endpoint {
        Endpoint {
            id,
            url: self.url,
            check_type: self.check_type.unwrap_or(CheckType::Http),
            interval_secs: self.interval_secs.unwrap_or(60),
            timeout_secs: self.timeout_secs.unwrap_or(30),
            expected_status_codes: self.expected_status_codes.unwrap_or_default(),
            max_response_time_ms: self.max_response_time_ms.unwrap_or(5000),
            tcp_port: self.tcp_port.unwrap_or(0),
            expected_dns_answers: self.expected_dns_answers.unwrap_or_default(),
            min_days_valid: self.min_days_valid.unwrap_or(7),
            check_chain: self.check_chain.unwrap_or(true),
            check_domain_match: self.check_domain_match.unwrap_or(true),
            acceptable_tls_versions: self
                .acceptable_tls_versions
                .unwrap_or_else(default_acceptable_tls_versions),
            created_at,
        }
    }
}

/// Body of `PUT /api/endpoints/:id`. Unset fields keep their stored
/// values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEndpointRequest {
    pub url: Option<String>,
    pub check_type: Option<CheckType>,
    #[serde(rename = "interval")]
    pub interval_secs: Option<u64>,
    #[serde(rename = "timeout")]
    pub timeout_secs: Option<u64>,
    pub expected_status_codes: Option<Vec<u16>>,
    #[serde(rename = "max_response_time")]
    pub max_response_time_ms: Option<u64>,
    pub tcp_port: Option<u16>,
    pub expected_dns_answers: Option<Vec<String>>,
    pub min_days_valid: Option<i64>,
    pub check_chain: Option<bool>,
    pub check_domain_match: Option<bool>,
    pub acceptable_tls_versions: Option<Vec<String>>,
}

/// One completed probe. Append-only; rows are never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub id: String,
    pub endpoint_id: String,
    pub succeeded: bool,
    #[serde(rename = "response_time")]
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Latest certificate evaluation for an ssl endpoint. One row per
/// endpoint, last write wins.
///
/// When the handshake itself fails, only `is_valid`, `error_message`
/// and `checked_at` carry information; the certificate-derived fields
/// stay unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslStatus {
    pub id: String,
    pub endpoint_id: String,
    pub certificate_expires_at: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub is_valid: bool,
    pub domain_matches: bool,
    pub chain_valid: bool,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub serial_number: Option<String>,
    pub tls_version: Option<String>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Latest WHOIS evaluation for a domain endpoint. One row per
/// endpoint, last write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStatus {
    pub id: String,
    pub endpoint_id: String,
    pub domain_expires_at: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
    pub is_registered: bool,
    pub registrar: Option<String>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// `GET /api/endpoints` list element: the endpoint plus its uptime
/// percentage, `null` while no outcome exists yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointWithUptime {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    pub uptime: Option<f64>,
}
