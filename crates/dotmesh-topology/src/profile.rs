//! Role tuning templates (`dhtserver.json` / `dhtclient.json`).
//!
//! Only the parts the merge reads are typed; everything else in a template
//! is ignored.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::TopologyError;
use crate::roster::{NodeRecord, NodeRole};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RoutingTemplate {
    #[serde(rename = "Type", default)]
    pub routing_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RoleProfile {
    #[serde(rename = "Routing", default)]
    pub routing: Option<RoutingTemplate>,
    #[serde(rename = "Swarm", default)]
    pub swarm: Option<Map<String, Value>>,
    #[serde(rename = "Pubsub", default)]
    pub pubsub: Option<Map<String, Value>>,
    #[serde(rename = "Provide", default)]
    pub provide: Option<Map<String, Value>>,
}

impl RoleProfile {
    pub fn routing_type(&self) -> Option<&str> {
        self.routing
            .as_ref()?
            .routing_type
            .as_deref()
            .filter(|t| !t.is_empty())
    }

    pub fn from_json_str(origin: &str, text: &str) -> Result<Self, TopologyError> {
        let value: Value = serde_json::from_str(text).map_err(|source| TopologyError::Json {
            origin: origin.to_owned(),
            source,
        })?;
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

    pub fn load(path: &Path) -> Result<Self, TopologyError> {
        let text = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&path.display().to_string(), &text)
    }
}

/// Both templates, read once per run.
#[derive(Debug, Clone, Default)]
pub struct RoleProfiles {
    pub server: RoleProfile,
    pub client: RoleProfile,
}

impl RoleProfiles {
    pub fn load(server: &Path, client: &Path) -> Result<Self, TopologyError> {
        Ok(Self {
            server: RoleProfile::load(server)?,
            client: RoleProfile::load(client)?,
        })
    }

    /// Server template for a dhtserver record; client template otherwise,
    /// including when the local node is not in the roster at all.
    pub fn for_local(&self, local: Option<&NodeRecord>) -> &RoleProfile {
        match local.map(|n| n.role) {
            Some(NodeRole::Server) => &self.server,
            _ => &self.client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_routing_and_regions() {
        let profile = RoleProfile::from_json_str(
            "dhtserver.json",
            r#"{
                "Routing": { "Type": "dhtserver" },
                "Swarm": { "ConnMgr": { "LowWater": 200, "HighWater": 400 } },
                "Pubsub": { "Router": "gossipsub" },
                "Experimental": { "ignored": true }
            }"#,
        )
        .unwrap();
        assert_eq!(profile.routing_type(), Some("dhtserver"));
        assert_eq!(profile.swarm.unwrap()["ConnMgr"]["LowWater"], 200);
        assert!(profile.provide.is_none());
    }

    #[test]
    fn empty_routing_type_counts_as_unset() {
        let profile =
            RoleProfile::from_json_str("dhtclient.json", r#"{ "Routing": { "Type": "" } }"#)
                .unwrap();
        assert_eq!(profile.routing_type(), None);
    }

    #[test]
    fn rejects_non_object_template() {
        let err = RoleProfile::from_json_str("dhtclient.json", "[1, 2]").unwrap_err();
        assert!(matches!(err, TopologyError::Shape { .. }));
    }

    #[test]
    fn picks_template_by_local_role() {
        let profiles = RoleProfiles {
            server: RoleProfile {
                routing: Some(RoutingTemplate { routing_type: Some("dhtserver".into()) }),
                ..Default::default()
            },
            client: RoleProfile {
                routing: Some(RoutingTemplate { routing_type: Some("dhtclient".into()) }),
                ..Default::default()
            },
        };
        let server = NodeRecord {
            name: "s".into(),
            role: NodeRole::Server,
            peer_id: "p".into(),
            dial_bases: vec![],
            port: None,
        };
        assert_eq!(profiles.for_local(Some(&server)).routing_type(), Some("dhtserver"));
        assert_eq!(profiles.for_local(None).routing_type(), Some("dhtclient"));
    }
}
