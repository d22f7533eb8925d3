//! Federation roster: the static list of nodes every reconciler run plans
//! against. Loaded once per run and never mutated.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Full DHT participant; eligible for bootstrap.
    #[serde(rename = "dhtserver")]
    Server,
    #[serde(rename = "dhtclient")]
    Client,
}

/// One roster entry, in the on-disk `custom.json` shape:
/// `{ "name", "type", "id", "ip": [dial base], "port"? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub role: NodeRole,
    #[serde(rename = "id")]
    pub peer_id: String,
    #[serde(rename = "ip", default)]
    pub dial_bases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl NodeRecord {
    /// Dial bases with blank entries skipped.
    pub fn dial_bases(&self) -> impl Iterator<Item = &str> {
        self.dial_bases
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
    }

    pub fn is_dialable(&self) -> bool {
        self.dial_bases().next().is_some()
    }

    pub fn is_server(&self) -> bool {
        self.role == NodeRole::Server
    }

    /// Swarm port for this node; a missing or zero port falls back to `default`.
    pub fn port_or(&self, default: u16) -> u16 {
        match self.port {
            Some(p) if p > 0 => p,
            _ => default,
        }
    }
}

// ============================================================================
// Roster
// ============================================================================

/// Ordered, validated roster. Order matters: the peering ring follows it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    nodes: Vec<NodeRecord>,
}

impl Roster {
    /// Validate peer ids (non-empty, unique) and wrap the records.
    pub fn new(nodes: Vec<NodeRecord>) -> Result<Self, TopologyError> {
        let mut seen = HashSet::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            if node.peer_id.trim().is_empty() {
                return Err(TopologyError::EmptyPeerId {
                    index,
                    name: node.name.clone(),
                });
            }
            if !seen.insert(node.peer_id.as_str()) {
                return Err(TopologyError::DuplicatePeerId {
                    peer_id: node.peer_id.clone(),
                });
            }
        }
        Ok(Self { nodes })
    }

    pub fn from_json_str(origin: &str, text: &str) -> Result<Self, TopologyError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|source| TopologyError::Json {
                origin: origin.to_owned(),
                source,
            })?;
        if !value.is_array() {
            return Err(TopologyError::Shape {
                origin: origin.to_owned(),
                expected: "array of node definitions",
            });
        }
        let nodes: Vec<NodeRecord> =
            serde_json::from_value(value).map_err(|source| TopologyError::Json {
                origin: origin.to_owned(),
                source,
            })?;
        Self::new(nodes)
    }

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&path.display().to_string(), &text)
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position(&self, peer_id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.peer_id == peer_id)
    }

    pub fn find(&self, peer_id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.peer_id == peer_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
