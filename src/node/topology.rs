// src/node/topology.rs

//! Node name → endpoint tables.

use crate::core::{MeshError, MeshResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Where a node's broker listens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One topology table, e.g. the virtual-node table or the classical-server table.
///
/// ```toml
/// [nodes.Alice]
/// host = "localhost"
/// port = 8801
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    nodes: BTreeMap<String, Endpoint>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces `name`.
    pub fn with_node(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.nodes.insert(name.into(), endpoint);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<&Endpoint> {
        self.nodes.get(name)
    }

    /// Like [`Topology::lookup`], but absence is an error naming `table`.
    pub fn require(&self, name: &str, table: &str) -> MeshResult<&Endpoint> {
        self.lookup(name).ok_or_else(|| MeshError::TopologyLookupFailed {
            node: name.to_string(),
            table: table.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Endpoint)> {
        self.nodes.iter().map(|(name, endpoint)| (name.as_str(), endpoint))
    }

    pub fn from_toml_str(content: &str) -> MeshResult<Self> {
        toml::from_str(content).map_err(|e| MeshError::Config { message: format!("Failed to parse topology: {}", e) })
    }

    pub fn load(path: &Path) -> MeshResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MeshError::Config { message: format!("Failed to read {}: {}", path.display(), e) })?;
        Self::from_toml_str(&content)
    }
}
