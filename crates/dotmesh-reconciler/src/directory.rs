//! Roster built from a published node directory export.
//!
//! Directory entries look like `{ "name": "<display>-<peerId>", "APIs": [url] }`.
//! Each becomes a `dhtserver` record whose dial bases are derived from the
//! API URL hosts. Domain hosts are resolved once per run to pick between
//! `/dns4/` and `/dns6/`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use dotmesh_topology::address::dedupe;
use dotmesh_topology::{NodeRecord, NodeRole, Roster, TopologyError};
use reqwest::Url;
use serde::Deserialize;

const DNS_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryEntry {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "APIs", default)]
    pub apis: Vec<String>,
}

/// Which address families a domain resolved to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DnsSupport {
    pub v4: bool,
    pub v6: bool,
}

/// Per-run lookup results keyed by host name.
pub type DnsCache = HashMap<String, DnsSupport>;

// ============================================================================
// Conversion
// ============================================================================

/// Split `"<display>-<peerId>"` at the last dash. No dash past the first
/// character means no peer id.
pub fn split_name(full: &str) -> (String, String) {
    match full.rfind('-') {
        Some(i) if i > 0 => (full[..i].to_owned(), full[i + 1..].to_owned()),
        _ => (full.to_owned(), String::new()),
    }
}

enum ApiHost {
    Ip(IpAddr),
    Domain(String),
}

fn api_host(api: &str) -> Option<ApiHost> {
    let url = Url::parse(api.trim()).ok()?;
    let host = url
        .host_str()?
        .trim_start_matches('[')
        .trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some(match host.parse::<IpAddr>() {
        Ok(ip) => ApiHost::Ip(ip),
        Err(_) => ApiHost::Domain(host.to_owned()),
    })
}

/// Dial bases for one entry's API URLs. Unparsable URLs are skipped.
pub fn dial_bases(apis: &[String], dns: &DnsCache) -> Vec<String> {
    let mut bases = Vec::new();
    for api in apis {
        match api_host(api) {
            Some(ApiHost::Ip(IpAddr::V4(ip))) => bases.push(format!("/ip4/{ip}")),
            Some(ApiHost::Ip(IpAddr::V6(ip))) => bases.push(format!("/ip6/{ip}")),
            Some(ApiHost::Domain(host)) => {
                let support = dns.get(&host).copied().unwrap_or_default();
                if support.v4 {
                    bases.push(format!("/dns4/{host}"));
                }
                if support.v6 || !support.v4 {
                    bases.push(format!("/dns6/{host}"));
                }
            }
            None => tracing::debug!(api = %api, "skipping unparsable directory API URL"),
        }
    }
    dedupe(bases)
}

/// Domain hosts that need a lookup before conversion.
pub fn domains(entries: &[DirectoryEntry]) -> Vec<String> {
    dedupe(
        entries
            .iter()
            .flat_map(|e| e.apis.iter())
            .filter_map(|api| match api_host(api) {
                Some(ApiHost::Domain(host)) => Some(host),
                _ => None,
            }),
    )
}

/// Convert directory entries into a roster of dhtserver records. Entries
/// without a peer id, and repeats of an already-seen peer id, are dropped.
pub fn to_roster(entries: &[DirectoryEntry], dns: &DnsCache) -> Result<Roster, TopologyError> {
    let mut nodes: Vec<NodeRecord> = Vec::with_capacity(entries.len());
    for entry in entries {
        let (name, peer_id) = split_name(entry.name.trim());
        if peer_id.is_empty() {
            tracing::warn!(entry = %entry.name, "directory entry has no peer id; skipped");
            continue;
        }
        if nodes.iter().any(|n| n.peer_id == peer_id) {
            tracing::warn!(peer_id = %peer_id, "duplicate directory entry; keeping the first");
            continue;
        }
        nodes.push(NodeRecord {
            name,
            role: NodeRole::Server,
            dial_bases: dial_bases(&entry.apis, dns),
            peer_id,
            port: None,
        });
    }
    Roster::new(nodes)
}

// ============================================================================
// Loading
// ============================================================================

pub fn read_entries(path: &Path) -> Result<Vec<DirectoryEntry>, TopologyError> {
    let origin = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| TopologyError::Json {
            origin: origin.clone(),
            source,
        })?;
    if !value.is_array() {
        return Err(TopologyError::Shape {
            origin,
            expected: "array of directory entries",
        });
    }
    serde_json::from_value(value).map_err(|source| TopologyError::Json { origin, source })
}

async fn lookup(host: &str) -> DnsSupport {
    let mut support = DnsSupport::default();
    match tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((host, 0))).await {
        Ok(Ok(addrs)) => {
            for addr in addrs {
                support.v4 |= addr.is_ipv4();
                support.v6 |= addr.is_ipv6();
            }
        }
        Ok(Err(e)) => tracing::debug!(host, "lookup failed: {e}"),
        Err(_) => tracing::debug!(host, "lookup timed out"),
    }
    support
}

/// Resolve every host once, filling `cache`.
pub async fn resolve_all(hosts: &[String], cache: &mut DnsCache) {
    for host in hosts {
        if !cache.contains_key(host) {
            let support = lookup(host).await;
            cache.insert(host.clone(), support);
        }
    }
}

/// Read a directory export and turn it into a roster.
pub async fn load_roster(path: &Path) -> Result<Roster, TopologyError> {
    let entries = read_entries(path)?;
    let mut cache = DnsCache::new();
    resolve_all(&domains(&entries), &mut cache).await;
    let roster = to_roster(&entries, &cache)?;
    tracing::info!(
        entries = entries.len(),
        nodes = roster.len(),
        "roster built from node directory"
    );
    Ok(roster)
}
