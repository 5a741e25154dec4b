//! Cluster Error Types

use thiserror::Error;

/// Invalid ring or node configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("virtual_nodes must be at least 1")]
    ZeroVirtualNodes,

    #[error("node id must not be empty")]
    EmptyNodeId,
}

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;
