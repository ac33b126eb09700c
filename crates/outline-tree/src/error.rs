//! Error types for tree operations

use crate::node::NodeId;

/// Tree operation errors
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// No node with this id
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// Tree has no root to export
    #[error("tree is empty, nothing to snapshot")]
    EmptySnapshot,

    /// Snapshot could not be encoded or decoded
    #[error("invalid snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}
