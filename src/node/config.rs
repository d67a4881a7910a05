// src/node/config.rs

//! Per-node settings, loaded from TOML.

use crate::core::constants::mesh_constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_RPC_TIMEOUT_MS};
use crate::core::{AMPLITUDE_TOLERANCE, Backend, DENSITY_TOLERANCE, MeshError, MeshResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings shared by a node's register, broker, clients and verifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Simulation backend; also accepts the legacy names `qutip` and `projectq`.
    #[serde(default = "default_backend")]
    pub backend: Backend,

    /// Deadline for one remote call
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Deadline for reaching a peer that is not listening yet
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Merge register groups automatically when a two-qubit gate spans them
    #[serde(default = "default_true")]
    pub merge_implicitly: bool,

    #[serde(default = "default_amplitude_tolerance")]
    pub amplitude_tolerance: f64,

    /// `0.0` requests an exact comparison.
    #[serde(default = "default_density_tolerance")]
    pub density_tolerance: f64,

    /// Fixed seed for measurement sampling
    #[serde(default)]
    pub seed: Option<u64>,

    /// Largest register group the node simulates; the backend's default when unset.
    #[serde(default)]
    pub max_group_qubits: Option<usize>,
}

fn default_backend() -> Backend {
    Backend::DensityMatrix
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

fn default_amplitude_tolerance() -> f64 {
    AMPLITUDE_TOLERANCE
}

fn default_density_tolerance() -> f64 {
    DENSITY_TOLERANCE
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            merge_implicitly: true,
            amplitude_tolerance: default_amplitude_tolerance(),
            density_tolerance: default_density_tolerance(),
            seed: None,
            max_group_qubits: None,
        }
    }
}

impl NodeConfig {
    /// Default settings on the given backend.
    pub fn for_backend(backend: Backend) -> Self {
        Self { backend, ..Self::default() }
    }

    /// Parses and validates a node config. An unknown backend name fails with
    /// `UnsupportedBackend`; every other problem is a `Config` error.
    pub fn from_toml_str(content: &str) -> MeshResult<Self> {
        let parse_error = |e: toml::de::Error| MeshError::Config { message: format!("Failed to parse node config: {}", e) };
        let table: toml::Table = toml::from_str(content).map_err(parse_error)?;
        if let Some(toml::Value::String(name)) = table.get("backend") {
            name.parse::<Backend>()?;
        }
        let config: Self = toml::Value::Table(table).try_into().map_err(parse_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> MeshResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MeshError::Config { message: format!("Failed to read {}: {}", path.display(), e) })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> MeshResult<()> {
        if self.rpc_timeout_ms == 0 {
            return Err(MeshError::Config { message: "rpc_timeout_ms must be positive".to_string() });
        }
        for (name, value) in [("amplitude_tolerance", self.amplitude_tolerance), ("density_tolerance", self.density_tolerance)] {
            if !value.is_finite() || value < 0.0 {
                return Err(MeshError::Config { message: format!("{} must be a non-negative number, got {}", name, value) });
            }
        }
        if self.max_group_qubits == Some(0) {
            return Err(MeshError::Config { message: "max_group_qubits must be positive".to_string() });
        }
        Ok(())
    }

    /// Qubit cap for one register group on this node.
    pub fn qubit_limit(&self) -> usize {
        self.max_group_qubits.unwrap_or_else(|| self.backend.default_qubit_limit())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
