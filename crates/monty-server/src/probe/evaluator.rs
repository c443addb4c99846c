use chrono::{DateTime, Utc};
use monty_common::types::{Endpoint, SslStatus};
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use super::ssl::HandshakeFacts;

/// Certificate fields evaluation works on, decoupled from DER parsing
/// so policy checks are testable without real certificates.
#[derive(Debug, Clone)]
pub struct CertFacts {
    pub not_after: DateTime<Utc>,
    pub subject: String,
    pub subject_cn: Option<String>,
    pub issuer: String,
    pub serial_number: String,
    pub san_dns_names: Vec<String>,
}

pub fn parse_cert_facts(der: &[u8]) -> Result<CertFacts, String> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| format!("failed to parse X.509 certificate: {e}"))?;

    let not_after_time = cert.validity().not_after.to_datetime();
    let not_after =
        DateTime::from_timestamp(not_after_time.unix_timestamp(), 0).unwrap_or_default();

    let subject_cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(|s| s.to_string());

    let san_dns_names: Vec<String> = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(CertFacts {
        not_after,
        subject: cert.subject().to_string(),
        subject_cn,
        issuer: cert.issuer().to_string(),
        serial_number: cert.raw_serial_as_string(),
        san_dns_names,
    })
}

/// Evaluate handshake facts against the endpoint's certificate policy.
pub fn evaluate(endpoint: &Endpoint, handshake: &HandshakeFacts, now: DateTime<Utc>) -> SslStatus {
    match parse_cert_facts(&handshake.leaf_der) {
        Ok(facts) => evaluate_facts(
            endpoint,
            &facts,
            handshake.tls_version.as_deref(),
            handshake.chain_valid,
            now,
        ),
        Err(message) => handshake_failure(endpoint, message, now),
    }
}

/// Pure policy evaluation. Disabled checks pass vacuously; `is_valid`
/// is the conjunction of every enabled one.
pub fn evaluate_facts(
    endpoint: &Endpoint,
    facts: &CertFacts,
    tls_version: Option<&str>,
    chain_valid: Option<bool>,
    now: DateTime<Utc>,
) -> SslStatus {
    let host = super::hostname(&endpoint.url);
    // Floored, not truncated: 36 hours past expiry is -2 days.
    let days_until_expiry = (facts.not_after - now).num_seconds().div_euclid(86_400);

    let expiry_ok = days_until_expiry >= endpoint.min_days_valid;
    let chain_ok = if endpoint.check_chain {
        chain_valid.unwrap_or(false)
    } else {
        true
    };
    let domain_ok = if endpoint.check_domain_match {
        cert_matches_host(facts, &host)
    } else {
        true
    };
    let version_ok = endpoint.acceptable_tls_versions.is_empty()
        || tls_version
            .map(|v| endpoint.acceptable_tls_versions.iter().any(|a| a == v))
            .unwrap_or(false);

    let error_message = if !expiry_ok {
        if days_until_expiry < 0 {
            Some(format!(
                "certificate expired {} days ago",
                -days_until_expiry
            ))
        } else {
            Some(format!(
                "certificate expires in {days_until_expiry} days, minimum is {}",
                endpoint.min_days_valid
            ))
        }
    } else if !chain_ok {
        Some("certificate chain is not trusted".to_string())
    } else if !domain_ok {
        Some(format!("certificate does not match host {host}"))
    } else if !version_ok {
        Some(format!(
            "negotiated {}, acceptable versions are [{}]",
            tls_version.unwrap_or("unknown TLS version"),
            endpoint.acceptable_tls_versions.join(", ")
        ))
    } else {
        None
    };

    SslStatus {
        id: monty_common::id::next_id(),
        endpoint_id: endpoint.id.clone(),
        certificate_expires_at: Some(facts.not_after),
        days_until_expiry: Some(days_until_expiry),
        is_valid: expiry_ok && chain_ok && domain_ok && version_ok,
        domain_matches: domain_ok,
        chain_valid: chain_ok,
        issuer: Some(facts.issuer.clone()),
        subject: Some(facts.subject.clone()),
        serial_number: Some(facts.serial_number.clone()),
        tls_version: tls_version.map(|v| v.to_string()),
        error_message,
        checked_at: now,
    }
}

/// Status shape when the handshake never produced a certificate: only
/// the error carries information.
pub fn handshake_failure(endpoint: &Endpoint, message: String, now: DateTime<Utc>) -> SslStatus {
    SslStatus {
        id: monty_common::id::next_id(),
        endpoint_id: endpoint.id.clone(),
        certificate_expires_at: None,
        days_until_expiry: None,
        is_valid: false,
        domain_matches: false,
        chain_valid: false,
        issuer: None,
        subject: None,
        serial_number: None,
        tls_version: None,
        error_message: Some(message),
        checked_at: now,
    }
}

fn cert_matches_host(facts: &CertFacts, host: &str) -> bool {
    if !facts.san_dns_names.is_empty() {
        facts
            .san_dns_names
            .iter()
            .any(|pattern| hostname_matches(pattern, host))
    } else if let Some(cn) = &facts.subject_cn {
        hostname_matches(cn, host)
    } else {
        false
    }
}

/// RFC 6125 style matching: a `*.` wildcard covers exactly one label.
pub(crate) fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        match host.split_once('.') {
            Some((first_label, rest)) => !first_label.is_empty() && rest == suffix,
            None => false,
        }
    } else {
        pattern == host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use monty_common::types::{CheckType, CreateEndpointRequest};

    fn ssl_endpoint(url: &str) -> Endpoint {
        CreateEndpointRequest {
            url: url.to_string(),
            check_type: Some(CheckType::Ssl),
            ..Default::default()
        }
        .into_endpoint("ep1".to_string(), Utc::now())
    }

    fn facts(not_after: DateTime<Utc>, san: &[&str]) -> CertFacts {
        CertFacts {
            not_after,
            subject: "CN=example.com".to_string(),
            subject_cn: Some("example.com".to_string()),
            issuer: "CN=Test CA".to_string(),
            serial_number: "01:02:03".to_string(),
            san_dns_names: san.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_valid_certificate() {
        let ep = ssl_endpoint("https://example.com");
        let now = Utc::now();
        let status = evaluate_facts(
            &ep,
            &facts(now + Duration::days(90), &["example.com"]),
            Some("TLS 1.3"),
            Some(true),
            now,
        );
        assert!(status.is_valid);
        assert!(status.chain_valid);
        assert!(status.domain_matches);
        assert_eq!(status.days_until_expiry, Some(90));
        assert!(status.error_message.is_none());
    }

    #[test]
    fn test_min_days_valid_boundary() {
        let ep = ssl_endpoint("https://example.com");
        let now = Utc::now();
        // Exactly at the minimum is still valid.
        let status = evaluate_facts(
            &ep,
            &facts(now + Duration::days(7), &["example.com"]),
            Some("TLS 1.3"),
            Some(true),
            now,
        );
        assert!(status.is_valid);

        // One second short of 7 full days floors to 6 and fails.
        let status = evaluate_facts(
            &ep,
            &facts(now + Duration::days(7) - Duration::seconds(1), &["example.com"]),
            Some("TLS 1.3"),
            Some(true),
            now,
        );
        assert!(!status.is_valid);
        assert!(status.error_message.unwrap().contains("minimum is 7"));
    }

    #[test]
    fn test_expired_certificate() {
        let ep = ssl_endpoint("https://example.com");
        let now = Utc::now();
        let status = evaluate_facts(
            &ep,
            &facts(now - Duration::days(3), &["example.com"]),
            Some("TLS 1.3"),
            Some(true),
            now,
        );
        assert!(!status.is_valid);
        assert!(status.error_message.unwrap().contains("expired"));
    }

    #[test]
    fn test_partial_days_floor_toward_expiry() {
        let ep = ssl_endpoint("https://example.com");
        let now = Utc::now();
        let status = evaluate_facts(
            &ep,
            &facts(now - Duration::hours(36), &["example.com"]),
            Some("TLS 1.3"),
            Some(true),
            now,
        );
        assert_eq!(status.days_until_expiry, Some(-2));
        assert!(status.error_message.unwrap().contains("expired 2 days ago"));
    }

    #[test]
    fn test_disabled_checks_pass_vacuously() {
        let mut ep = ssl_endpoint("https://other-host.net");
        ep.check_chain = false;
        ep.check_domain_match = false;
        let now = Utc::now();
        // Mismatched host and unverified chain, but both checks are off.
        let status = evaluate_facts(
            &ep,
            &facts(now + Duration::days(30), &["example.com"]),
            Some("TLS 1.2"),
            None,
            now,
        );
        assert!(status.is_valid);
        assert!(status.chain_valid);
        assert!(status.domain_matches);
    }

    #[test]
    fn test_untrusted_chain_fails() {
        let ep = ssl_endpoint("https://example.com");
        let now = Utc::now();
        let status = evaluate_facts(
            &ep,
            &facts(now + Duration::days(30), &["example.com"]),
            Some("TLS 1.3"),
            Some(false),
            now,
        );
        assert!(!status.is_valid);
        assert!(!status.chain_valid);
        assert!(status.error_message.unwrap().contains("chain"));
    }

    #[test]
    fn test_domain_mismatch_fails() {
        let ep = ssl_endpoint("https://another.example.net");
        let now = Utc::now();
        let status = evaluate_facts(
            &ep,
            &facts(now + Duration::days(30), &["example.com", "www.example.com"]),
            Some("TLS 1.3"),
            Some(true),
            now,
        );
        assert!(!status.is_valid);
        assert!(!status.domain_matches);
    }

    #[test]
    fn test_cn_fallback_when_no_san() {
        let ep = ssl_endpoint("https://example.com");
        let now = Utc::now();
        let status = evaluate_facts(
            &ep,
            &facts(now + Duration::days(30), &[]),
            Some("TLS 1.3"),
            Some(true),
            now,
        );
        assert!(status.domain_matches);
    }

    #[test]
    fn test_tls_version_policy() {
        let mut ep = ssl_endpoint("https://example.com");
        ep.acceptable_tls_versions = vec!["TLS 1.3".to_string()];
        let now = Utc::now();
        let good = facts(now + Duration::days(30), &["example.com"]);

        let status = evaluate_facts(&ep, &good, Some("TLS 1.2"), Some(true), now);
        assert!(!status.is_valid);
        assert!(status.error_message.unwrap().contains("TLS 1.2"));

        // Empty list accepts anything that was negotiated.
        ep.acceptable_tls_versions = vec![];
        let status = evaluate_facts(&ep, &good, Some("TLS 1.0"), Some(true), now);
        assert!(status.is_valid);
    }

    #[test]
    fn test_handshake_failure_shape() {
        let ep = ssl_endpoint("https://example.com");
        let status = handshake_failure(&ep, "TLS handshake failed".to_string(), Utc::now());
        assert!(!status.is_valid);
        assert!(!status.domain_matches);
        assert!(!status.chain_valid);
        assert!(status.certificate_expires_at.is_none());
        assert!(status.days_until_expiry.is_none());
        assert!(status.issuer.is_none());
        assert!(status.serial_number.is_none());
        assert_eq!(status.error_message.as_deref(), Some("TLS handshake failed"));
    }

    #[test]
    fn test_hostname_matches_wildcard_rules() {
        assert!(hostname_matches("example.com", "EXAMPLE.com"));
        assert!(hostname_matches("*.example.com", "api.example.com"));
        assert!(!hostname_matches("*.example.com", "example.com"));
        assert!(!hostname_matches("*.example.com", "a.b.example.com"));
        assert!(!hostname_matches("*.example.com", "apiexample.com"));
    }
}
