//! Typed view over a node's runtime configuration document.
//!
//! Only the fields the reconciler owns or merges are typed. Every other
//! top-level key (including `Identity` and its private key) lands in
//! `passthrough` and is written back byte-for-byte in value terms.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::TopologyError;

fn nullable_vec<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(de)?.unwrap_or_default())
}

// ============================================================================
// Sections
// ============================================================================

/// `Peering.Peers[]` entry. Addresses carry no `/p2p/` suffix: the peer id
/// is the entry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeeringEntry {
    #[serde(rename = "ID")]
    pub peer_id: String,
    #[serde(rename = "Addrs", default, deserialize_with = "nullable_vec")]
    pub addrs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressesSection {
    #[serde(rename = "Announce", default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<Vec<String>>,
    /// `Swarm`, `API`, `Gateway`, ... are never touched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeeringSection {
    #[serde(rename = "Peers", default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<PeeringEntry>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingSection {
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub routing_type: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(rename = "Addresses", default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<AddressesSection>,

    #[serde(rename = "Bootstrap", default, skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<Vec<String>>,

    #[serde(rename = "Peering", default, skip_serializing_if = "Option::is_none")]
    pub peering: Option<PeeringSection>,

    #[serde(rename = "Routing", default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingSection>,

    // Tunable regions, merged field by field against the role template.
    #[serde(rename = "Swarm", default, skip_serializing_if = "Option::is_none")]
    pub swarm: Option<Map<String, Value>>,
    #[serde(rename = "Pubsub", default, skip_serializing_if = "Option::is_none")]
    pub pubsub: Option<Map<String, Value>>,
    #[serde(rename = "Provide", default, skip_serializing_if = "Option::is_none")]
    pub provide: Option<Map<String, Value>>,

    /// Legacy reprovide settings, superseded by `Provide`.
    #[serde(rename = "Reprovider", default, skip_serializing_if = "Option::is_none")]
    pub reprovider: Option<Value>,

    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

impl LiveConfig {
    pub fn from_value(origin: &str, value: Value) -> Result<Self, TopologyError> {
        if !value.is_object() {
            return Err(TopologyError::Shape {
                origin: origin.to_owned(),
                expected: "object",
            });
        }
        serde_json::from_value(value).map_err(|source| TopologyError::Json {
            origin: origin.to_owned(),
            source,
        })
    }

    pub fn from_json_str(origin: &str, text: &str) -> Result<Self, TopologyError> {
        let value = serde_json::from_str(text).map_err(|source| TopologyError::Json {
            origin: origin.to_owned(),
            source,
        })?;
        Self::from_value(origin, value)
    }

    pub fn to_value(&self) -> Value {
        // Every field is a JSON value already; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Pretty JSON with a trailing newline, the form the node stores on disk.
    pub fn to_document(&self) -> String {
        let mut text = serde_json::to_string_pretty(self).unwrap_or_default();
        text.push('\n');
        text
    }

    pub fn announce(&self) -> &[String] {
        self.addresses
            .as_ref()
            .and_then(|a| a.announce.as_deref())
            .unwrap_or_default()
    }

    pub fn bootstrap(&self) -> &[String] {
        self.bootstrap.as_deref().unwrap_or_default()
    }

    pub fn peering_peers(&self) -> &[PeeringEntry] {
        self.peering
            .as_ref()
            .and_then(|p| p.peers.as_deref())
            .unwrap_or_default()
    }

    pub fn routing_type(&self) -> Option<&str> {
        self.routing.as_ref()?.routing_type.as_deref()
    }
}
