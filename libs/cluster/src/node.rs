//! Cluster Node Identity

use crate::error::{ClusterError, Result};
use runtime_config::NodeSettings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a physical node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ClusterError::EmptyNodeId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node that can host entity actors
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterNode {
    id: NodeId,
    address: String,
}

impl ClusterNode {
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Address other nodes forward messages to
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl TryFrom<&NodeSettings> for ClusterNode {
    type Error = ClusterError;

    fn try_from(settings: &NodeSettings) -> Result<Self> {
        Ok(Self::new(NodeId::new(settings.id.clone())?, settings.address.clone()))
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}
