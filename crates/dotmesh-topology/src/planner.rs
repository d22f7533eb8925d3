//! Overlay planning: which nodes to bootstrap from, which to keep peered
//! with, and which addresses to announce.
//!
//! Selection is deliberately re-randomized on every run so the federation
//! does not converge on one fixed bootstrap set. Callers pass the RNG; a
//! seeded `StdRng` makes a run reproducible.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::address::{dedupe, to_dial_addresses, to_dial_addresses_with_peer};
use crate::constants::{
    DEFAULT_BOOTSTRAP_K, DEFAULT_DIAL_PORT, DEFAULT_PEERING_RANDOM, DEFAULT_PEERING_RING,
};
use crate::live_config::PeeringEntry;
use crate::roster::{NodeRecord, Roster};

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerParams {
    /// Port used for records that do not specify one.
    pub dial_port: u16,
    /// Bootstrap fan-out: at most this many dhtserver nodes.
    pub bootstrap_k: usize,
    /// Ring neighbours on each side of the local node.
    pub ring_radius: usize,
    /// Random peers added on top of the ring.
    pub random_count: usize,
}

impl Default for PlannerParams {
    fn default() -> Self {
        Self {
            dial_port: DEFAULT_DIAL_PORT,
            bootstrap_k: DEFAULT_BOOTSTRAP_K,
            ring_radius: DEFAULT_PEERING_RING,
            random_count: DEFAULT_PEERING_RANDOM,
        }
    }
}

// ============================================================================
// Sampling
// ============================================================================

/// Unbiased sample of at most `k` items (Fisher-Yates, then truncate).
fn pick_k<T, R: Rng + ?Sized>(mut items: Vec<T>, k: usize, rng: &mut R) -> Vec<T> {
    if k == 0 {
        return Vec::new();
    }
    items.shuffle(rng);
    items.truncate(k);
    items
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Peer-suffixed dial addresses for up to `k` randomly chosen dhtserver nodes.
///
/// Client-role nodes never appear. With fewer than `k` dialable servers all
/// of them are used. Output is deduplicated, first occurrence wins.
pub fn build_bootstrap<R: Rng + ?Sized>(
    roster: &Roster,
    k: usize,
    default_port: u16,
    rng: &mut R,
) -> Vec<String> {
    let servers: Vec<&NodeRecord> = roster
        .nodes()
        .iter()
        .filter(|n| n.is_server() && n.is_dialable())
        .collect();

    let mut out = Vec::new();
    for node in pick_k(servers, k, rng) {
        let port = node.port_or(default_port);
        for base in node.dial_bases() {
            out.extend(to_dial_addresses_with_peer(base, &node.peer_id, port));
        }
    }
    dedupe(out)
}

// ============================================================================
// Peering
// ============================================================================

/// Ring neighbours of `local_peer_id` plus up to `random_count` random extras.
///
/// The roster order is treated as a cycle; `ring_radius` nodes are taken on
/// each side, wrapping at the ends. A local node missing from the roster
/// skips the ring. Random extras prefer dialable dhtserver nodes and top up
/// from dialable dhtclient nodes when the servers run out. Nodes that end up
/// with no address are dropped. The local node is never included.
pub fn build_peering<R: Rng + ?Sized>(
    roster: &Roster,
    local_peer_id: &str,
    ring_radius: usize,
    random_count: usize,
    default_port: u16,
    rng: &mut R,
) -> Vec<PeeringEntry> {
    let nodes = roster.nodes();
    let n = nodes.len();

    let mut chosen: Vec<&NodeRecord> = Vec::new();
    let mut chosen_ids: HashSet<&str> = HashSet::new();
    if let Some(idx) = roster.position(local_peer_id) {
        // Distances past n / 2 only revisit nodes already taken.
        for d in 1..=ring_radius.min(n / 2) {
            for neighbour in [&nodes[(idx + n - d) % n], &nodes[(idx + d) % n]] {
                if neighbour.peer_id != local_peer_id && chosen_ids.insert(neighbour.peer_id.as_str()) {
                    chosen.push(neighbour);
                }
            }
        }
    }

    let remaining = |server: bool, chosen_ids: &HashSet<&str>| {
        nodes
            .iter()
            .filter(|node| {
                node.peer_id != local_peer_id
                    && !chosen_ids.contains(node.peer_id.as_str())
                    && node.is_dialable()
                    && node.is_server() == server
            })
            .collect::<Vec<&NodeRecord>>()
    };

    let mut extras = pick_k(remaining(true, &chosen_ids), random_count, rng);
    if extras.len() < random_count {
        let shortfall = random_count - extras.len();
        extras.extend(pick_k(remaining(false, &chosen_ids), shortfall, rng));
    }
    for node in extras {
        if chosen_ids.insert(node.peer_id.as_str()) {
            chosen.push(node);
        }
    }

    chosen
        .into_iter()
        .filter_map(|node| {
            let port = node.port_or(default_port);
            let addrs = dedupe(node.dial_bases().flat_map(|base| to_dial_addresses(base, port)));
            (!addrs.is_empty()).then(|| PeeringEntry {
                peer_id: node.peer_id.clone(),
                addrs,
            })
        })
        .collect()
}

// ============================================================================
// Announce
// ============================================================================

/// The local node's own dial addresses (no peer suffix), deduplicated.
pub fn build_announce<'a, I>(dial_bases: I, port: u16) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    dedupe(
        dial_bases
            .into_iter()
            .flat_map(|base| to_dial_addresses(base, port)),
    )
}

// ============================================================================
// Plan
// ============================================================================

/// Everything one reconciliation run writes into the live config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyPlan {
    pub announce: Vec<String>,
    pub bootstrap: Vec<String>,
    pub peering: Vec<PeeringEntry>,
}

impl TopologyPlan {
    pub fn compute<R: Rng + ?Sized>(
        roster: &Roster,
        local_peer_id: &str,
        params: &PlannerParams,
        rng: &mut R,
    ) -> Self {
        let bootstrap = build_bootstrap(roster, params.bootstrap_k, params.dial_port, rng);

        let announce = match roster.find(local_peer_id) {
            Some(local) => build_announce(local.dial_bases(), local.port_or(params.dial_port)),
            None => {
                tracing::warn!(
                    peer_id = %local_peer_id,
                    "local node is not in the roster; announcing no addresses"
                );
                Vec::new()
            }
        };

        let peering = build_peering(
            roster,
            local_peer_id,
            params.ring_radius,
            params.random_count,
            params.dial_port,
            rng,
        );

        tracing::debug!(
            bootstrap = bootstrap.len(),
            peering = peering.len(),
            announce = announce.len(),
            "topology planned"
        );

        Self { announce, bootstrap, peering }
    }

    /// SHA-256 over the three sets, hex encoded. Equal plans share a digest.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
