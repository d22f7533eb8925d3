//! Offline reconcile: merge straight into `<repo>/config` while the node
//! daemon is stopped. Refuses to touch the file if any management endpoint
//! candidate is alive, since a running daemon would overwrite it.

use std::path::{Path, PathBuf};

use dotmesh_topology::LiveConfig;
use serde_json::Value;

use crate::config::OfflineArgs;
use crate::error::RunError;
use crate::locator::{candidate_endpoints, first_alive};
use crate::management::peer_id_field;
use crate::run::{reconcile, Inputs};

const CONFIG_FILE: &str = "config";
const TMP_SUFFIX: &str = ".dotmesh-tmp";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineOutcome {
    Written { path: PathBuf, digest: String },
    Unchanged,
}

/// Parsed repo config plus the node's own peer id.
#[derive(Debug)]
pub struct RepoConfig {
    pub peer_id: String,
    pub config: LiveConfig,
}

pub fn read_repo_config(path: &Path) -> Result<RepoConfig, RunError> {
    let origin = path.display().to_string();
    let fetch_error = |reason: String| RunError::Fetch {
        endpoint: origin.clone(),
        reason,
    };

    let text = std::fs::read_to_string(path).map_err(|e| fetch_error(e.to_string()))?;
    let value: Value = serde_json::from_str(&text).map_err(|e| fetch_error(e.to_string()))?;

    let identity = value.get("Identity").cloned().unwrap_or(Value::Null);
    let peer_id = peer_id_field(&identity).ok_or_else(|| RunError::Identity {
        endpoint: origin.clone(),
    })?;
    let has_key = identity
        .get("PrivKey")
        .and_then(Value::as_str)
        .is_some_and(|k| !k.is_empty());
    if !has_key {
        tracing::warn!(path = %origin, "Identity.PrivKey is missing; the node will not start with this config");
    }

    let config = LiveConfig::from_value(&origin, value).map_err(|e| fetch_error(e.to_string()))?;
    Ok(RepoConfig { peer_id, config })
}

/// Write via a sibling temp file and rename, keeping the original's permissions.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(TMP_SUFFIX);
    let tmp = path.with_file_name(tmp_name);

    let written = std::fs::write(&tmp, contents).and_then(|()| {
        if let Ok(meta) = std::fs::metadata(path) {
            std::fs::set_permissions(&tmp, meta.permissions())?;
        }
        std::fs::rename(&tmp, path)
    });
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

pub async fn run(args: &OfflineArgs, http: &reqwest::Client) -> Result<OfflineOutcome, RunError> {
    let inputs = Inputs::load(&args.network).await?;

    let api_override = args.endpoint.api_override();
    let candidates = candidate_endpoints(api_override.as_deref(), &args.endpoint.default_ports());
    if let Some(endpoint) = first_alive(http, &candidates, args.endpoint.probe_timeout()).await {
        return Err(RunError::DaemonRunning { endpoint });
    }

    let path = args.repo_path().join(CONFIG_FILE);
    let repo = read_repo_config(&path)?;

    let mut rng = args.network.rng();
    let params = args.network.planner_params();
    let result = reconcile(&inputs, &repo.peer_id, repo.config, &params, &mut rng);
    if result.unchanged {
        tracing::info!(path = %path.display(), "repo config already up to date");
        return Ok(OfflineOutcome::Unchanged);
    }

    write_atomic(&path, &result.merged.to_document()).map_err(|e| RunError::Apply {
        endpoint: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let digest = result.plan.digest();
    tracing::info!(path = %path.display(), %digest, "repo config written");
    Ok(OfflineOutcome::Written { path, digest })
}
