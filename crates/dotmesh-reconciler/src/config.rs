use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use dotmesh_topology::PlannerParams;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Default management API ports: Kubo (5001) and IPFS Desktop (45005).
pub const DEFAULT_API_PORTS: &str = "5001,45005";

/// Checked in order when `--api` / `IPFS_API` is unset.
const API_ENV_ALIASES: &[&str] = &["KUBO_API", "IPFS_HTTP_API"];

#[derive(Parser, Debug)]
#[command(
    name = "dotmesh-reconciler",
    about = "Plans a storage node's peer overlay and reconciles it into the node's live config"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan the overlay and replace the running node's config.
    Apply(ApplyArgs),
    /// Plan and merge like `apply`, print the merged config, push nothing.
    Plan(PlanArgs),
    /// Report the running node's connectivity and overlay settings.
    Check(EndpointArgs),
    /// Merge into an on-disk repo config while the node daemon is stopped.
    Offline(OfflineArgs),
}

// ============================================================================
// Roster / planner inputs
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct NetworkArgs {
    /// Directory holding the roster and role templates.
    #[arg(long, env = "DOTMESH_NETWORK_DIR", default_value = ".")]
    pub network_dir: PathBuf,

    /// Federation roster (array of node definitions), relative to --network-dir.
    #[arg(long, default_value = "custom.json")]
    pub roster: PathBuf,

    /// Role template applied to dhtserver nodes.
    #[arg(long, default_value = "dhtserver.json")]
    pub server_profile: PathBuf,

    /// Role template applied to dhtclient nodes and to nodes missing from the roster.
    #[arg(long, default_value = "dhtclient.json")]
    pub client_profile: PathBuf,

    /// Build the roster from a node directory export
    /// (`[{ "name": "<display>-<peerId>", "APIs": [url] }]`) instead of --roster.
    #[arg(long)]
    pub directory: Option<PathBuf>,

    /// Swarm port for roster entries without one.
    #[arg(long, env = "DEFAULT_PORT", default_value_t = dotmesh_topology::DEFAULT_DIAL_PORT)]
    pub port: u16,

    /// Number of dhtserver nodes drawn into Bootstrap.
    #[arg(long, env = "BOOTSTRAP_K", default_value_t = dotmesh_topology::DEFAULT_BOOTSTRAP_K)]
    pub bootstrap_k: usize,

    /// Ring neighbours kept on each side of this node.
    #[arg(long, env = "PEERING_RING", default_value_t = dotmesh_topology::DEFAULT_PEERING_RING)]
    pub peering_ring: usize,

    /// Extra random peers, dhtserver nodes first.
    #[arg(long, env = "PEERING_RANDOM", default_value_t = dotmesh_topology::DEFAULT_PEERING_RANDOM)]
    pub peering_random: usize,

    /// RNG seed for reproducible selection. Unset = fresh draw every run.
    #[arg(long, env = "DOTMESH_SEED")]
    pub seed: Option<u64>,
}

impl NetworkArgs {
    /// Resolve a document path against --network-dir (absolute paths win).
    pub fn resolve(&self, file: &Path) -> PathBuf {
        self.network_dir.join(file)
    }

    pub fn planner_params(&self) -> PlannerParams {
        PlannerParams {
            dial_port: self.port,
            bootstrap_k: self.bootstrap_k,
            ring_radius: self.peering_ring,
            random_count: self.peering_random,
        }
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

// ============================================================================
// Management endpoint
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct EndpointArgs {
    /// Management API override: a base URL (http://host:5001) or a multiaddr
    /// (/ip4/127.0.0.1/tcp/5001). Tried before the default ports.
    #[arg(long, env = "IPFS_API")]
    pub api: Option<String>,

    /// Comma-separated local ports probed after the override.
    #[arg(long, env = "IPFS_API_PORTS", default_value = DEFAULT_API_PORTS)]
    pub api_ports: String,

    /// Liveness probe timeout per candidate.
    #[arg(long, default_value_t = 1_500)]
    pub probe_timeout_ms: u64,

    /// Timeout for reading the current config and peer id.
    #[arg(long, default_value_t = 8_000)]
    pub request_timeout_ms: u64,

    /// Timeout for the config replace call.
    #[arg(long, default_value_t = 12_000)]
    pub replace_timeout_ms: u64,
}

impl EndpointArgs {
    /// `--api`/`IPFS_API`, falling back to `KUBO_API` then `IPFS_HTTP_API`.
    pub fn api_override(&self) -> Option<String> {
        self.api
            .clone()
            .or_else(|| {
                API_ENV_ALIASES
                    .iter()
                    .find_map(|name| std::env::var(name).ok())
            })
            .map(|raw| raw.trim().to_owned())
            .filter(|raw| !raw.is_empty())
    }

    pub fn default_ports(&self) -> Vec<u16> {
        parse_ports(&self.api_ports)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn replace_timeout(&self) -> Duration {
        Duration::from_millis(self.replace_timeout_ms)
    }
}

/// Parse a comma-separated port list, silently dropping blanks, zero and junk.
pub fn parse_ports(list: &str) -> Vec<u16> {
    list.split(',')
        .filter_map(|s| s.trim().parse::<u16>().ok())
        .filter(|p| *p > 0)
        .collect()
}

// ============================================================================
// Subcommand arguments
// ============================================================================

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Skip the replace call when the merged config equals the live one.
    #[arg(long)]
    pub skip_unchanged: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    #[command(flatten)]
    pub endpoint: EndpointArgs,
}

#[derive(Args, Debug, Clone)]
pub struct OfflineArgs {
    #[command(flatten)]
    pub network: NetworkArgs,

    /// Endpoints probed first; offline mode refuses to run if any answers.
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Node repository holding `config`. Defaults to $IPFS_PATH, $IPFS_REPO, ~/.ipfs.
    #[arg(long, env = "IPFS_PATH")]
    pub repo: Option<PathBuf>,
}

impl OfflineArgs {
    pub fn repo_path(&self) -> PathBuf {
        if let Some(repo) = &self.repo {
            return repo.clone();
        }
        if let Some(repo) = std::env::var_os("IPFS_REPO").filter(|v| !v.is_empty()) {
            return PathBuf::from(repo);
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(".ipfs")
    }
}
