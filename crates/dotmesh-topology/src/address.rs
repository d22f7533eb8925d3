//! Dial address construction.
//!
//! A dial base is the host part of a multiaddr (`/ip4/1.2.3.4`,
//! `/dns4/node.example`, ...). Bases are never validated: whatever the roster
//! says is suffixed and passed on, so a malformed base produces malformed
//! addresses rather than an error.

use std::collections::HashSet;
use std::hash::Hash;

use crate::constants::{DNSADDR_PREFIX, QUIC_V1};

/// `/dnsaddr/<host>` resolves to complete addresses (transport, port and
/// `/p2p/` suffix included) and must not be suffixed again.
pub fn is_self_resolving(base: &str) -> bool {
    base.starts_with(DNSADDR_PREFIX)
}

pub fn tcp_addr(base: &str, port: u16) -> String {
    format!("{base}/tcp/{port}")
}

pub fn quic_addr(base: &str, port: u16) -> String {
    format!("{base}/udp/{port}/{QUIC_V1}")
}

/// TCP and QUIC-v1 dial addresses for `base`, without a peer suffix.
///
/// Self-resolving bases come back unchanged as a singleton; `port` is ignored.
pub fn to_dial_addresses(base: &str, port: u16) -> Vec<String> {
    if is_self_resolving(base) {
        return vec![base.to_owned()];
    }
    vec![tcp_addr(base, port), quic_addr(base, port)]
}

/// Same as [`to_dial_addresses`] with `/p2p/<peer_id>` appended to each
/// variant. Self-resolving bases are assumed to carry the peer already.
pub fn to_dial_addresses_with_peer(base: &str, peer_id: &str, port: u16) -> Vec<String> {
    if is_self_resolving(base) {
        return vec![base.to_owned()];
    }
    vec![
        format!("{}/p2p/{peer_id}", tcp_addr(base, port)),
        format!("{}/p2p/{peer_id}", quic_addr(base, port)),
    ]
}

/// Drop repeated items, keeping the first occurrence of each.
pub fn dedupe<T, I>(items: I) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
