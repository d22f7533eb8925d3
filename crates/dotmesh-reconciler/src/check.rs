//! Connectivity report for a running node.

use std::fmt::Write as _;

use crate::config::EndpointArgs;
use crate::error::RunError;
use crate::management::SwarmPeer;
use crate::run::connect;

const SAMPLE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub endpoint: String,
    pub peer_id: String,
    pub peers: Vec<SwarmPeer>,
    pub bootstrap: usize,
    pub peering: usize,
    pub announce: usize,
    pub local_addrs: Vec<String>,
}

impl CheckReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "connectivity check");
        let _ = writeln!(out, "- endpoint:         {}", self.endpoint);
        let _ = writeln!(out, "- peer id:          {}", self.peer_id);
        let _ = writeln!(out, "- swarm peers:      {}", self.peers.len());
        let _ = writeln!(out, "- bootstrap:        {}", self.bootstrap);
        let _ = writeln!(out, "- peering peers:    {}", self.peering);
        let _ = writeln!(out, "- announce:         {}", self.announce);

        if !self.peers.is_empty() {
            let _ = writeln!(out, "- connections (first {SAMPLE}):");
            for p in self.peers.iter().take(SAMPLE) {
                match &p.direction {
                    Some(dir) => {
                        let _ = writeln!(out, "  * {} {} (direction {dir})", p.peer, p.addr);
                    }
                    None => {
                        let _ = writeln!(out, "  * {} {}", p.peer, p.addr);
                    }
                }
            }
        }

        let _ = writeln!(
            out,
            "- local addresses ({} total, first {SAMPLE}):",
            self.local_addrs.len()
        );
        for addr in self.local_addrs.iter().take(SAMPLE) {
            let _ = writeln!(out, "  * {addr}");
        }
        out
    }

    /// Log the same hints the reconciler exists to fix.
    pub fn warn_if_sparse(&self) {
        if self.bootstrap == 0 {
            tracing::warn!("Bootstrap is empty; raise --bootstrap-k or add dhtserver nodes to the roster");
        }
        if self.peering == 0 {
            tracing::warn!("Peering.Peers is empty; ring and random peers keep small overlays connected");
        }
    }
}

pub async fn run(args: &EndpointArgs, http: &reqwest::Client) -> Result<CheckReport, RunError> {
    let client = connect(args, http).await?;
    let peer_id = client.self_id().await?;
    let config = client.config_show().await?;
    let peers = client.swarm_peers().await?;
    let local_addrs = client.local_addrs().await?;

    let report = CheckReport {
        endpoint: client.base().to_owned(),
        peer_id,
        peers,
        bootstrap: config.bootstrap().len(),
        peering: config.peering_peers().len(),
        announce: config.announce().len(),
        local_addrs,
    };
    report.warn_if_sparse();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, Command};
    use clap::Parser;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn respond(server: &MockServer, call: &str, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path(format!("/api/v0/{call}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn reports_counts_and_samples() {
        let server = MockServer::start().await;
        respond(&server, "version", json!({"Version": "0.30.0"})).await;
        respond(&server, "id", json!({"ID": "PA"})).await;
        respond(
            &server,
            "config/show",
            json!({
                "Bootstrap": ["/ip4/10.0.0.2/tcp/4001/p2p/PB"],
                "Peering": {"Peers": null},
                "Addresses": {"Announce": ["/ip4/10.0.0.1/tcp/4001"]}
            }),
        )
        .await;
        let peers: Vec<_> = (0..12)
            .map(|i| json!({"Peer": format!("P{i}"), "Addr": "/ip4/10.0.0.9/tcp/4001"}))
            .collect();
        respond(&server, "swarm/peers", json!({ "Peers": peers })).await;
        respond(&server, "swarm/addrs/local", json!({"Strings": ["/ip4/127.0.0.1/tcp/4001"]})).await;

        let uri = server.uri();
        let cli = Cli::try_parse_from(["dotmesh-reconciler", "check", "--api", uri.as_str(), "--api-ports", ""])
            .unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        let report = run(&args, &reqwest::Client::new()).await.unwrap();

        assert_eq!(report.peer_id, "PA");
        assert_eq!(report.peers.len(), 12);
        assert_eq!(report.bootstrap, 1);
        assert_eq!(report.peering, 0);
        assert_eq!(report.announce, 1);

        let text = report.render();
        assert!(text.contains("- swarm peers:      12"));
        assert!(text.contains("  * P9 "));
        assert!(!text.contains("  * P10 "));
        assert!(text.contains("  * /ip4/127.0.0.1/tcp/4001"));
    }
}
