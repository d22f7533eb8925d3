use dotmesh_topology::TopologyError;
use thiserror::Error;

/// Fatal outcomes of a reconciler run. None are retried in-process; the
/// next scheduled invocation is the retry.
#[derive(Debug, Error)]
pub enum RunError {
    /// Roster, role template or directory document is unusable. Raised
    /// before any network call.
    #[error("configuration error: {0}")]
    Configuration(#[from] TopologyError),

    #[error("no management endpoint answered the liveness probe (tried: {})", tried.join(", "))]
    Discovery { tried: Vec<String> },

    #[error("{endpoint} did not report the node's own peer id")]
    Identity { endpoint: String },

    #[error("reading the current config from {endpoint} failed: {reason}")]
    Fetch { endpoint: String, reason: String },

    /// The previous config stays active: replace is all-or-nothing.
    #[error("config replace on {endpoint} failed: {reason}")]
    Apply { endpoint: String, reason: String },

    #[error("a node daemon is answering on {endpoint}; stop it or use `apply` instead of `offline`")]
    DaemonRunning { endpoint: String },
}

impl RunError {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Configuration(_) => 2,
            RunError::Discovery { .. } => 3,
            RunError::Identity { .. } => 4,
            RunError::Apply { .. } => 5,
            RunError::Fetch { .. } => 6,
            RunError::DaemonRunning { .. } => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let errors = [
            RunError::Configuration(TopologyError::DuplicatePeerId { peer_id: "p".into() }),
            RunError::Discovery { tried: vec![] },
            RunError::Identity { endpoint: "e".into() },
            RunError::Apply { endpoint: "e".into(), reason: "r".into() },
            RunError::Fetch { endpoint: "e".into(), reason: "r".into() },
            RunError::DaemonRunning { endpoint: "e".into() },
        ];
        let mut codes: Vec<u8> = errors.iter().map(RunError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn discovery_lists_every_candidate() {
        let err = RunError::Discovery {
            tried: vec!["http://127.0.0.1:5001".into(), "http://127.0.0.1:45005".into()],
        };
        assert_eq!(
            err.to_string(),
            "no management endpoint answered the liveness probe \
             (tried: http://127.0.0.1:5001, http://127.0.0.1:45005)"
        );
    }
}
