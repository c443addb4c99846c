use chrono::{DateTime, NaiveDate, Utc};
use monty_common::types::{DomainStatus, Endpoint};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::ProbeReport;

const WHOIS_ROOT: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const MAX_RESPONSE_BYTES: u64 = 64 * 1024;

/// WHOIS registration check: query the IANA root, follow a single
/// `refer:` redirect to the registry, then read expiry and registrar
/// out of the key/value response.
pub async fn check(endpoint: &Endpoint) -> ProbeReport {
    let started = Instant::now();
    let domain = registrable_domain(&endpoint.url);

    let lookup = tokio::time::timeout(
        Duration::from_secs(endpoint.timeout_secs),
        lookup_whois(&domain),
    )
    .await;

    let now = Utc::now();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let text = match lookup {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            let message = format!("whois lookup for {domain} failed: {e}");
            let mut report = ProbeReport::failure(elapsed_ms, message.clone());
            report.domain_status = Some(error_status(endpoint, message, now));
            return report;
        }
        Err(_) => {
            let message = format!(
                "whois lookup for {domain} timed out after {}s",
                endpoint.timeout_secs
            );
            let mut report = ProbeReport::failure(elapsed_ms, message.clone());
            report.domain_status = Some(error_status(endpoint, message, now));
            return report;
        }
    };

    let is_registered = !looks_unregistered(&text);
    let registrar = whois_field(&text, "registrar");
    let expires_at = expiry_from_response(&text);
    let days_until_expiry = expires_at.map(|t| (t - now).num_days());

    let status = DomainStatus {
        id: monty_common::id::next_id(),
        endpoint_id: endpoint.id.clone(),
        domain_expires_at: expires_at,
        days_until_expiry,
        is_registered,
        registrar,
        error_message: None,
        checked_at: now,
    };

    let expired = days_until_expiry.map(|d| d < 0).unwrap_or(false);
    let mut report = if !is_registered {
        ProbeReport::failure(elapsed_ms, format!("{domain} is not registered"))
    } else if expired {
        ProbeReport::failure(elapsed_ms, format!("{domain} registration has expired"))
    } else {
        ProbeReport::success(elapsed_ms)
    };
    report.domain_status = Some(status);
    report
}

fn error_status(endpoint: &Endpoint, message: String, now: DateTime<Utc>) -> DomainStatus {
    DomainStatus {
        id: monty_common::id::next_id(),
        endpoint_id: endpoint.id.clone(),
        domain_expires_at: None,
        days_until_expiry: None,
        is_registered: false,
        registrar: None,
        error_message: Some(message),
        checked_at: now,
    }
}

/// Hostname with any `www.` prefix removed; WHOIS servers only know
/// about registered names.
pub(crate) fn registrable_domain(url: &str) -> String {
    let host = super::hostname(url);
    host.strip_prefix("www.").unwrap_or(&host).to_string()
}

async fn lookup_whois(domain: &str) -> anyhow::Result<String> {
    let root = whois_query(WHOIS_ROOT, WHOIS_PORT, domain).await?;
    match whois_field(&root, "refer") {
        Some(server) => whois_query(&server, WHOIS_PORT, domain).await,
        None => Ok(root),
    }
}

async fn whois_query(server: &str, port: u16, query: &str) -> anyhow::Result<String> {
    let mut stream = TcpStream::connect((server, port)).await?;
    stream.write_all(format!("{query}\r\n").as_bytes()).await?;
    let mut buf = Vec::new();
    // Registries send a few KiB; anything past the cap is discarded.
    stream.take(MAX_RESPONSE_BYTES).read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// First value for a `key:` line, matched case-insensitively.
pub(crate) fn whois_field(text: &str, key: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.trim();
        if let Some((k, v)) = line.split_once(':') {
            if k.trim().eq_ignore_ascii_case(key) {
                let v = v.trim();
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

const EXPIRY_KEYS: [&str; 5] = [
    "registry expiry date",
    "expiration date",
    "expiry date",
    "expires",
    "paid-till",
];

pub(crate) fn expiry_from_response(text: &str) -> Option<DateTime<Utc>> {
    EXPIRY_KEYS
        .iter()
        .find_map(|key| whois_field(text, key))
        .and_then(|v| parse_expiry(&v))
}

/// Registries disagree on date formats; try the common ones.
pub(crate) fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let date_part = value.split_whitespace().next()?;
    for fmt in ["%Y-%m-%d", "%Y.%m.%d", "%d-%b-%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

pub(crate) fn looks_unregistered(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["no match for", "not found", "no entries found", "no data found"]
        .iter()
        .any(|marker| lower.contains(marker))
}
