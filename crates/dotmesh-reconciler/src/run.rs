//! The reconcile pipeline shared by `apply`, `plan` and `offline`:
//! load inputs, discover the node, read its state, plan, merge, push.

use dotmesh_topology::merge::merge;
use dotmesh_topology::{
    LiveConfig, PlannerParams, RoleProfiles, Roster, TopologyPlan, ROLE_DHT_CLIENT,
    ROLE_DHT_SERVER,
};
use libp2p::{Multiaddr, PeerId};
use rand::Rng;

use crate::config::{ApplyArgs, EndpointArgs, NetworkArgs, PlanArgs};
use crate::directory;
use crate::error::RunError;
use crate::locator::{candidate_endpoints, locate};
use crate::management::ManagementClient;

// ============================================================================
// Inputs
// ============================================================================

/// Roster and role templates, read before any network call.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub roster: Roster,
    pub profiles: RoleProfiles,
}

impl Inputs {
    pub async fn load(net: &NetworkArgs) -> Result<Self, RunError> {
        let roster = match &net.directory {
            Some(file) => directory::load_roster(&net.resolve(file)).await?,
            None => Roster::load(&net.resolve(&net.roster))?,
        };
        let profiles = RoleProfiles::load(
            &net.resolve(&net.server_profile),
            &net.resolve(&net.client_profile),
        )?;
        lint_roster(&roster);
        tracing::debug!(nodes = roster.len(), "inputs loaded");
        Ok(Self { roster, profiles })
    }
}

/// Warn about entries the node will probably reject. Values are still used
/// as given.
fn lint_roster(roster: &Roster) {
    for node in roster.nodes() {
        if node.peer_id.parse::<PeerId>().is_err() {
            tracing::warn!(node = %node.name, peer_id = %node.peer_id, "roster peer id does not parse");
        }
        for base in node.dial_bases() {
            if base.parse::<Multiaddr>().is_err() {
                tracing::warn!(node = %node.name, base, "roster dial base is not a multiaddr");
            }
        }
        if !node.is_dialable() {
            tracing::debug!(node = %node.name, "roster entry has no dial bases");
        }
    }
}

// ============================================================================
// Planning + merge
// ============================================================================

pub struct Reconciled {
    pub plan: TopologyPlan,
    pub merged: LiveConfig,
    /// Merged document equals the one it was built from.
    pub unchanged: bool,
}

pub fn reconcile<R: Rng + ?Sized>(
    inputs: &Inputs,
    peer_id: &str,
    current: LiveConfig,
    params: &PlannerParams,
    rng: &mut R,
) -> Reconciled {
    let local = inputs.roster.find(peer_id);
    let profile = inputs.profiles.for_local(local);
    let plan = TopologyPlan::compute(&inputs.roster, peer_id, params, rng);
    let merged = merge(current.clone(), &plan, profile);
    let unchanged = merged == current;

    tracing::info!(
        peer_id,
        node = local.map(|n| n.name.as_str()).unwrap_or("-"),
        role = local
            .map(|n| if n.is_server() { ROLE_DHT_SERVER } else { ROLE_DHT_CLIENT })
            .unwrap_or("unlisted"),
        bootstrap = plan.bootstrap.len(),
        peering = plan.peering.len(),
        announce = plan.announce.len(),
        digest = %plan.digest(),
        unchanged,
        "overlay planned"
    );

    Reconciled { plan, merged, unchanged }
}

// ============================================================================
// Live modes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Replaced { digest: String },
    Unchanged,
}

pub async fn connect(
    endpoint: &EndpointArgs,
    http: &reqwest::Client,
) -> Result<ManagementClient, RunError> {
    let api_override = endpoint.api_override();
    let candidates = candidate_endpoints(api_override.as_deref(), &endpoint.default_ports());
    let base = locate(http, &candidates, endpoint.probe_timeout()).await?;
    Ok(ManagementClient::new(
        &base,
        http.clone(),
        endpoint.request_timeout(),
        endpoint.replace_timeout(),
    ))
}

pub async fn apply(args: &ApplyArgs, http: &reqwest::Client) -> Result<ApplyOutcome, RunError> {
    let inputs = Inputs::load(&args.network).await?;
    let client = connect(&args.endpoint, http).await?;
    let snapshot = client.snapshot().await?;

    let mut rng = args.network.rng();
    let params = args.network.planner_params();
    let result = reconcile(&inputs, &snapshot.peer_id, snapshot.config, &params, &mut rng);

    if args.skip_unchanged && result.unchanged {
        tracing::info!(endpoint = %client.base(), "config already up to date; nothing pushed");
        return Ok(ApplyOutcome::Unchanged);
    }

    client.replace_config(&result.merged).await?;
    let digest = result.plan.digest();
    tracing::info!(endpoint = %client.base(), %digest, "config replaced; restart the node to apply");
    Ok(ApplyOutcome::Replaced { digest })
}

/// Everything `apply` does except the push. Returns the merged document.
pub async fn plan(args: &PlanArgs, http: &reqwest::Client) -> Result<LiveConfig, RunError> {
    let inputs = Inputs::load(&args.network).await?;
    let client = connect(&args.endpoint, http).await?;
    let snapshot = client.snapshot().await?;

    let mut rng = args.network.rng();
    let params = args.network.planner_params();
    Ok(reconcile(&inputs, &snapshot.peer_id, snapshot.config, &params, &mut rng).merged)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{Cli, Command};
    use clap::Parser;
    use serde_json::{json, Value};
    use std::path::Path;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn write_network(dir: &Path) {
        let roster = json!([
            {"name": "a", "type": "dhtserver", "id": "PA", "ip": ["/ip4/10.0.0.1"]},
            {"name": "b", "type": "dhtserver", "id": "PB", "ip": ["/ip4/10.0.0.2"], "port": 4101},
            {"name": "c", "type": "dhtclient", "id": "PC", "ip": ["/ip4/10.0.0.3"]}
        ]);
        let server = json!({
            "Routing": {"Type": "dhtserver"},
            "Swarm": {"ConnMgr": {"HighWater": 900, "LowWater": 600}}
        });
        let client = json!({"Routing": {"Type": "dhtclient"}});
        std::fs::write(dir.join("custom.json"), roster.to_string()).unwrap();
        std::fs::write(dir.join("dhtserver.json"), server.to_string()).unwrap();
        std::fs::write(dir.join("dhtclient.json"), client.to_string()).unwrap();
    }

    pub(crate) fn live_config() -> Value {
        json!({
            "Identity": {"PeerID": "PA", "PrivKey": "CAESQ-secret"},
            "Addresses": {"Swarm": ["/ip4/0.0.0.0/tcp/4001"], "Announce": []},
            "Bootstrap": ["/dnsaddr/bootstrap.libp2p.io/p2p/QmOld"],
            "Swarm": {"ConnMgr": {"HighWater": 50}},
            "Reprovider": {"Interval": "12h"}
        })
    }

    async fn mount_node(server: &MockServer, config: Value, id: Value) {
        Mock::given(method("POST"))
            .and(path("/api/v0/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Version": "0.30.0"})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/config/show"))
            .respond_with(ResponseTemplate::new(200).set_body_json(config))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v0/id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(id))
            .mount(server)
            .await;
    }

    async fn mount_replace(server: &MockServer, status: u16, times: u64) {
        Mock::given(method("POST"))
            .and(path("/api/v0/config/replace"))
            .respond_with(ResponseTemplate::new(status))
            .expect(times)
            .mount(server)
            .await;
    }

    fn apply_args(dir: &Path, api: &str, extra: &[&str]) -> ApplyArgs {
        let mut argv = vec![
            "dotmesh-reconciler",
            "apply",
            "--network-dir",
            dir.to_str().unwrap(),
            "--api",
            api,
            "--api-ports",
            "",
            "--seed",
            "7",
            "--probe-timeout-ms",
            "500",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Apply(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    /// JSON document carried in the multipart body of the replace call.
    async fn uploaded_config(server: &MockServer) -> Value {
        let requests = server.received_requests().await.unwrap();
        let replace = requests
            .iter()
            .find(|r| r.url.path() == "/api/v0/config/replace")
            .expect("replace was called");
        let body = String::from_utf8_lossy(&replace.body).into_owned();
        let start = body.find("\r\n\r\n").unwrap() + 4;
        let end = body.rfind("\r\n--").unwrap();
        serde_json::from_str(body[start..end].trim()).unwrap()
    }

    #[tokio::test]
    async fn apply_pushes_merged_config() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        let server = MockServer::start().await;
        mount_node(&server, live_config(), json!({"ID": "PA"})).await;
        mount_replace(&server, 200, 1).await;

        let outcome = apply(&apply_args(dir.path(), &server.uri(), &[]), &reqwest::Client::new())
            .await
            .unwrap();
        assert!(matches!(outcome, ApplyOutcome::Replaced { .. }));

        let pushed = uploaded_config(&server).await;
        assert_eq!(
            pushed["Addresses"]["Announce"],
            json!(["/ip4/10.0.0.1/tcp/4001", "/ip4/10.0.0.1/udp/4001/quic-v1"])
        );
        assert_eq!(pushed["Addresses"]["Swarm"], json!(["/ip4/0.0.0.0/tcp/4001"]));

        let bootstrap = pushed["Bootstrap"].as_array().unwrap();
        assert_eq!(bootstrap.len(), 4);
        assert!(bootstrap.contains(&json!("/ip4/10.0.0.2/tcp/4101/p2p/PB")));
        assert!(!bootstrap.iter().any(|a| a.as_str().unwrap().contains("QmOld")));

        let peer_ids: Vec<&str> = pushed["Peering"]["Peers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["ID"].as_str().unwrap())
            .collect();
        assert_eq!(peer_ids.len(), 2);
        assert!(peer_ids.contains(&"PB") && peer_ids.contains(&"PC"));

        assert_eq!(pushed["Routing"]["Type"], "dhtserver");
        assert_eq!(pushed["Swarm"]["ConnMgr"]["HighWater"], 50);
        assert_eq!(pushed["Swarm"]["ConnMgr"]["LowWater"], 600);
        assert_eq!(pushed["Identity"]["PrivKey"], "CAESQ-secret");
        assert!(pushed.get("Reprovider").is_none());
    }

    #[tokio::test]
    async fn no_live_endpoint_means_no_push() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v0/version"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mount_replace(&server, 200, 0).await;

        let err = apply(&apply_args(dir.path(), &server.uri(), &[]), &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Discovery { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_peer_id_means_no_push() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        let server = MockServer::start().await;
        mount_node(&server, live_config(), json!({"AgentVersion": "kubo/0.30.0"})).await;
        mount_replace(&server, 200, 0).await;

        let err = apply(&apply_args(dir.path(), &server.uri(), &[]), &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Identity { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn rejected_push_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        let server = MockServer::start().await;
        mount_node(&server, live_config(), json!({"ID": "PA"})).await;
        mount_replace(&server, 400, 1).await;

        let err = apply(&apply_args(dir.path(), &server.uri(), &[]), &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Apply { .. }), "{err:?}");
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn bad_roster_fails_before_network() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        std::fs::write(dir.path().join("custom.json"), r#"{"not": "an array"}"#).unwrap();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = apply(&apply_args(dir.path(), &server.uri(), &[]), &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Configuration(_)), "{err:?}");
    }

    #[tokio::test]
    async fn unchanged_config_is_not_pushed_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        std::fs::write(
            dir.path().join("custom.json"),
            json!([{"name": "c", "type": "dhtclient", "id": "PC", "ip": ["/ip4/10.0.0.3"]}]).to_string(),
        )
        .unwrap();
        let settled = json!({
            "Addresses": {"Announce": ["/ip4/10.0.0.3/tcp/4001", "/ip4/10.0.0.3/udp/4001/quic-v1"]},
            "Bootstrap": [],
            "Peering": {"Peers": []},
            "Routing": {"Type": "dhtclient"}
        });
        let server = MockServer::start().await;
        mount_node(&server, settled, json!({"ID": "PC"})).await;
        mount_replace(&server, 200, 0).await;

        let args = apply_args(dir.path(), &server.uri(), &["--skip-unchanged"]);
        let outcome = apply(&args, &reqwest::Client::new()).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
    }

    #[tokio::test]
    async fn plan_returns_merged_document_without_pushing() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        let server = MockServer::start().await;
        mount_node(&server, live_config(), json!({"PeerId": "PC"})).await;
        mount_replace(&server, 200, 0).await;

        let uri = server.uri();
        let cli = Cli::try_parse_from([
            "dotmesh-reconciler",
            "plan",
            "--network-dir",
            dir.path().to_str().unwrap(),
            "--api",
            uri.as_str(),
            "--api-ports",
            "",
        ])
        .unwrap();
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        let merged = plan(&args, &reqwest::Client::new()).await.unwrap();
        assert_eq!(merged.routing_type(), Some("dhtclient"));
        assert_eq!(merged.bootstrap().len(), 4);
        assert!(merged.reprovider.is_none());
    }

    #[test]
    fn same_seed_same_merge() {
        let dir = tempfile::tempdir().unwrap();
        write_network(dir.path());
        let inputs = Inputs {
            roster: Roster::load(&dir.path().join("custom.json")).unwrap(),
            profiles: RoleProfiles::load(
                &dir.path().join("dhtserver.json"),
                &dir.path().join("dhtclient.json"),
            )
            .unwrap(),
        };
        let current = LiveConfig::from_value("test", live_config()).unwrap();
        let params = PlannerParams::default();
        let run = |seed| {
            let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(seed);
            reconcile(&inputs, "PA", current.clone(), &params, &mut rng)
        };
        let (first, second) = (run(3), run(3));
        assert_eq!(first.merged, second.merged);
        assert_eq!(first.plan.digest(), second.plan.digest());
        assert!(!first.unchanged);
    }
}
