//! Client for a node's management HTTP API (`/api/v0/*`).
//!
//! Every call is a bodiless POST except `config/replace`, which uploads the
//! whole config as a multipart file. Calls are issued one at a time.

use std::time::Duration;

use anyhow::Context;
use dotmesh_topology::LiveConfig;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::error::RunError;

/// Keys a node may use for its own peer id, in lookup order.
const PEER_ID_KEYS: &[&str] = &["ID", "Id", "PeerID", "PeerId"];

/// Current state of the running node, read before planning.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub peer_id: String,
    pub config: LiveConfig,
}

/// One connected peer from `swarm/peers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmPeer {
    pub peer: String,
    pub addr: String,
    pub direction: Option<String>,
}

// ============================================================================
// ManagementClient
// ============================================================================

pub struct ManagementClient {
    base: String,
    http: reqwest::Client,
    request_timeout: Duration,
    replace_timeout: Duration,
}

impl ManagementClient {
    pub fn new(
        base: &str,
        http: reqwest::Client,
        request_timeout: Duration,
        replace_timeout: Duration,
    ) -> Self {
        Self {
            base: base.trim_end_matches('/').to_owned(),
            http,
            request_timeout,
            replace_timeout,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn url(&self, call: &str) -> String {
        format!("{}/api/v0/{call}", self.base)
    }

    async fn post_json(&self, call: &str) -> anyhow::Result<Value> {
        let resp = self
            .http
            .post(self.url(call))
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("{call} request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{call} returned HTTP {status}: {}", body.trim());
        }
        resp.json()
            .await
            .with_context(|| format!("{call} returned a non-JSON body"))
    }

    /// Read the full running config.
    pub async fn config_show(&self) -> Result<LiveConfig, RunError> {
        let value = self.post_json("config/show").await.map_err(|e| self.fetch_error(e))?;
        LiveConfig::from_value("config/show", value).map_err(|e| self.fetch_error(e.into()))
    }

    /// The node's own peer id.
    pub async fn self_id(&self) -> Result<String, RunError> {
        let value = self.post_json("id").await.map_err(|e| self.fetch_error(e))?;
        peer_id_field(&value).ok_or_else(|| RunError::Identity {
            endpoint: self.base.clone(),
        })
    }

    /// Config then peer id, strictly in that order.
    pub async fn snapshot(&self) -> Result<NodeSnapshot, RunError> {
        let config = self.config_show().await?;
        let peer_id = self.self_id().await?;
        Ok(NodeSnapshot { peer_id, config })
    }

    /// Replace the running config wholesale. The node keeps its previous
    /// config unless this returns `Ok`.
    pub async fn replace_config(&self, config: &LiveConfig) -> Result<(), RunError> {
        let apply_error = |reason: String| RunError::Apply {
            endpoint: self.base.clone(),
            reason,
        };

        let part = Part::text(config.to_document())
            .file_name("config")
            .mime_str("application/json")
            .map_err(|e| apply_error(e.to_string()))?;
        let form = Form::new().part("file", part);

        let resp = self
            .http
            .post(self.url("config/replace"))
            .multipart(form)
            .timeout(self.replace_timeout)
            .send()
            .await
            .map_err(|e| apply_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(apply_error(format!("HTTP {status}: {}", body.trim())));
        }
        Ok(())
    }

    /// Connected peers. A `null` peer list means none.
    pub async fn swarm_peers(&self) -> Result<Vec<SwarmPeer>, RunError> {
        let value = self.post_json("swarm/peers").await.map_err(|e| self.fetch_error(e))?;
        Ok(parse_swarm_peers(&value))
    }

    /// Addresses the node is listening on.
    pub async fn local_addrs(&self) -> Result<Vec<String>, RunError> {
        let value = self
            .post_json("swarm/addrs/local")
            .await
            .map_err(|e| self.fetch_error(e))?;
        Ok(string_list(value.get("Strings")))
    }

    fn fetch_error(&self, e: anyhow::Error) -> RunError {
        RunError::Fetch {
            endpoint: self.base.clone(),
            reason: format!("{e:#}"),
        }
    }
}

// ============================================================================
// Response helpers
// ============================================================================

/// First non-empty peer id under any of the accepted keys.
pub fn peer_id_field(value: &Value) -> Option<String> {
    PEER_ID_KEYS
        .iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|id| !id.is_empty())
        .map(str::to_owned)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_swarm_peers(value: &Value) -> Vec<SwarmPeer> {
    let Some(peers) = value.get("Peers").and_then(Value::as_array) else {
        return Vec::new();
    };
    peers
        .iter()
        .map(|p| {
            let field = |key: &str| p.get(key).and_then(Value::as_str).map(str::to_owned);
            let direction = match p.get("Direction") {
                Some(Value::String(d)) => Some(d.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            SwarmPeer {
                peer: field("Peer").unwrap_or_default(),
                addr: field("Addr").unwrap_or_default(),
                direction,
            }
        })
        .collect()
}
