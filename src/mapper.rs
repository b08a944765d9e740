//! Mapping from container identity to DNS store records.
//!
//! The FQDN labels are reversed and placed under a base path, so
//! `app.example.com` under `/skydns/` maps to `skydns/com/example/app`.
//! Keys are relative; the store adapter roots them (`/skydns/...` in etcd).
//! Everything here is pure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static FQDN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z0-9]+(-[a-z0-9]+)*\.)+[a-z]{2,}$").expect("valid FQDN pattern")
});

/// Value stored under a DNS key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsRecordValue<'a> {
    pub host: &'a str,
}

/// Builds the container's FQDN from its hostname and domain name.
///
/// Returns `None` unless the lowercased, dot-trimmed join is at least two
/// DNS labels ending in an alphabetic TLD.
pub fn fqdn(hostname: &str, domain_name: &str) -> Option<String> {
    let joined = format!("{}.{}", hostname, domain_name).to_lowercase();
    let candidate = joined.trim_matches('.');
    if FQDN_PATTERN.is_match(candidate) {
        Some(candidate.to_string())
    } else {
        None
    }
}

/// Store key for `fqdn` rooted at `base_key`.
///
/// Slashes around the base are stripped so the key has no empty
/// segments; an empty base leaves the reversed labels unrooted.
pub fn dns_key(fqdn: &str, base_key: &str) -> String {
    let mut segments: Vec<&str> = fqdn.split('.').collect();
    let base = base_key.trim_matches('/');
    if !base.is_empty() {
        segments.push(base);
    }
    segments.reverse();
    segments.join("/")
}

/// JSON payload `{"host":"<ip>"}` for `ip`.
pub fn dns_value(ip: &str) -> crate::error::Result<String> {
    Ok(serde_json::to_string(&DnsRecordValue { host: ip })?)
}
