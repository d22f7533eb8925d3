// ============================================================================
// Overlay defaults (sized for a federation of ~100 nodes)
// ============================================================================

/// Swarm port used when a roster record carries none (TCP and QUIC share it).
pub const DEFAULT_DIAL_PORT: u16 = 4001;

/// Maximum number of dhtserver nodes drawn into the bootstrap set.
pub const DEFAULT_BOOTSTRAP_K: usize = 8;

/// Ring neighbours taken on each side of the local node.
pub const DEFAULT_PEERING_RING: usize = 3;

/// Extra randomly drawn peers on top of the ring neighbours.
pub const DEFAULT_PEERING_RANDOM: usize = 3;

// --- Multiaddr grammar ------------------------------------------------------

/// Prefix of a self-resolving dial base: transport and peer id come from DNS.
pub const DNSADDR_PREFIX: &str = "/dnsaddr/";

pub const QUIC_V1: &str = "quic-v1";

// --- Role names as they appear in the roster --------------------------------

pub const ROLE_DHT_SERVER: &str = "dhtserver";
pub const ROLE_DHT_CLIENT: &str = "dhtclient";
