//! Management endpoint discovery.
//!
//! Candidates are the operator override (if any) followed by
//! `http://127.0.0.1:<port>` for each default port. They are probed strictly
//! in order with `POST /api/v0/version`; the first success wins.

use std::time::Duration;

use dotmesh_topology::address::dedupe;

use crate::error::RunError;

const LOOPBACK: &str = "127.0.0.1";

// ============================================================================
// Candidate list
// ============================================================================

/// Turn an operator override into a base URL.
///
/// `http(s)://` URLs lose trailing slashes. A multiaddr starting with a host
/// component followed by `/tcp/<port>` becomes `http://host:port`; anything
/// after the port is dropped. Other strings are used as given.
pub fn normalize_override(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(raw.trim_end_matches('/').to_owned());
    }
    if let Some(url) = multiaddr_to_http(raw) {
        return Some(url);
    }
    Some(raw.trim_end_matches('/').to_owned())
}

/// `/<host proto>/<host>/tcp/<port>[/anything]` → `http://host:port`.
/// Only the leading four segments are read; the suffix is never parsed.
fn multiaddr_to_http(raw: &str) -> Option<String> {
    let mut parts = raw.strip_prefix('/')?.split('/');
    let proto = parts.next()?.to_ascii_lowercase();
    let host = parts.next().filter(|h| !h.is_empty())?;
    if !parts.next()?.eq_ignore_ascii_case("tcp") {
        return None;
    }
    let port: u16 = parts.next()?.parse().ok()?;
    let host = match proto.as_str() {
        "ip6" => format!("[{host}]"),
        "ip4" | "dns" | "dns4" | "dns6" | "dnsaddr" => host.to_owned(),
        _ => return None,
    };
    Some(format!("http://{host}:{port}"))
}

/// Ordered, duplicate-free probe list.
pub fn candidate_endpoints(api_override: Option<&str>, default_ports: &[u16]) -> Vec<String> {
    let first = api_override.and_then(normalize_override);
    let rest = default_ports
        .iter()
        .map(|port| format!("http://{LOOPBACK}:{port}"));
    dedupe(first.into_iter().chain(rest))
}

// ============================================================================
// Probing
// ============================================================================

/// True when `base` answers the version call with a success status within
/// `timeout`. Connection errors and timeouts count as "not alive".
pub async fn probe(http: &reqwest::Client, base: &str, timeout: Duration) -> bool {
    let url = format!("{base}/api/v0/version");
    match http.post(&url).timeout(timeout).send().await {
        Ok(resp) if resp.status().is_success() => true,
        Ok(resp) => {
            tracing::debug!(endpoint = %base, status = %resp.status(), "probe rejected");
            false
        }
        Err(e) => {
            tracing::debug!(endpoint = %base, "probe failed: {e}");
            false
        }
    }
}

/// First live candidate, or `Discovery` listing everything tried.
pub async fn locate(
    http: &reqwest::Client,
    candidates: &[String],
    timeout: Duration,
) -> Result<String, RunError> {
    for base in candidates {
        if probe(http, base, timeout).await {
            tracing::info!(endpoint = %base, "management endpoint located");
            return Ok(base.clone());
        }
    }
    Err(RunError::Discovery {
        tried: candidates.to_vec(),
    })
}

/// First live candidate without turning absence into an error.
pub async fn first_alive(
    http: &reqwest::Client,
    candidates: &[String],
    timeout: Duration,
) -> Option<String> {
    for base in candidates {
        if probe(http, base, timeout).await {
            return Some(base.clone());
        }
    }
    None
}
