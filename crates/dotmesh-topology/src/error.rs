use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{origin} must be a JSON {expected}")]
    Shape {
        origin: String,
        expected: &'static str,
    },

    #[error("roster entry {index} ({name:?}) has an empty peer id")]
    EmptyPeerId { index: usize, name: String },

    #[error("peer id {peer_id} appears more than once in the roster")]
    DuplicatePeerId { peer_id: String },
}
