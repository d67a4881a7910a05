//! Error handling logic

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::qubit::{QubitRef, RegisterHandle};

/// Convenience alias used throughout the crate.
pub type MeshResult<T> = Result<T, MeshError>;

/// Failures raised by registers, brokers, the merge protocol and the verifier.
///
/// Every variant is serializable so a broker can hand it back to a remote
/// caller as a structured failure (kind + message) instead of a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MeshError {
    /// A remote call reached a broker before `bind` associated it with a register.
    #[error("Broker Not Ready: {message}")]
    NotReady {
        /// Which call was refused
        message: String,
    },

    /// `get_reference` asked for a slot beyond the register's size.
    #[error("Invalid Index: {index} (register has {size} slots)")]
    InvalidIndex {
        /// Requested slot
        index: usize,
        /// Number of slots ever allocated in the register
        size: usize,
    },

    /// The reference no longer addresses a live qubit (consumed, torn down, or foreign).
    #[error("Stale Reference ({qubit}): {message}")]
    StaleReference {
        /// The reference that failed to resolve
        qubit: QubitRef,
        /// StaleReference failure message
        message: String,
    },

    /// A two-qubit gate spans two register groups and implicit merging is off.
    #[error("Cross-Register Gate Unsupported: {control} in {control_register}, {target} in {target_register}")]
    CrossRegisterUnsupported {
        control: QubitRef,
        control_register: RegisterHandle,
        target: QubitRef,
        target_register: RegisterHandle,
    },

    /// The representation is not the one this component was configured for,
    /// or a configured backend name is not recognised.
    #[error("Unsupported Backend: {message}")]
    UnsupportedBackend {
        /// UnsupportedBackend failure message
        message: String,
    },

    /// The gate cannot be expressed by the active backend.
    #[error("Unsupported Gate: {message}")]
    UnsupportedGate {
        /// UnsupportedGate failure message
        message: String,
    },

    /// An operation is inconsistent with the current register contents.
    #[error("Invalid Operation: {message}")]
    InvalidOperation {
        /// InvalidOperation failure message
        message: String,
    },

    /// A joint-state payload is internally inconsistent.
    #[error("Malformed State: {message}")]
    MalformedState {
        /// MalformedState failure message
        message: String,
    },

    /// No reply arrived within the configured deadline.
    #[error("Timeout: {operation} on {node} after {millis} ms")]
    Timeout {
        /// Node the call was addressed to
        node: String,
        /// Name of the remote operation
        operation: String,
        /// Deadline that elapsed
        millis: u64,
    },

    /// The peer's channel closed before a reply was delivered.
    #[error("Disconnected: {node}: {message}")]
    Disconnected {
        node: String,
        message: String,
    },

    /// A node name is absent from a topology table.
    #[error("Topology Lookup Failed: node '{node}' not found in {table} topology")]
    TopologyLookupFailed {
        /// Node that was looked up
        node: String,
        /// Which table was consulted ("virtual" or "classical")
        table: String,
    },

    /// A wire frame could not be encoded or decoded, or carried the wrong reply.
    #[error("Codec Error: {message}")]
    Codec {
        /// Codec failure message
        message: String,
    },

    /// Configuration could not be read or is invalid.
    #[error("Configuration Error: {message}")]
    Config {
        /// Config failure message
        message: String,
    },

    /// Numerical failure inside a simulation engine.
    #[error("Simulation Process Error: {message}")]
    Simulation {
        /// Simulation failure message
        message: String,
    },
}

/// The kind of a [`MeshError`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotReady,
    InvalidIndex,
    StaleReference,
    CrossRegisterUnsupported,
    UnsupportedBackend,
    UnsupportedGate,
    InvalidOperation,
    MalformedState,
    Timeout,
    Disconnected,
    TopologyLookupFailed,
    Codec,
    Config,
    Simulation,
}

impl MeshError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeshError::NotReady { .. } => ErrorKind::NotReady,
            MeshError::InvalidIndex { .. } => ErrorKind::InvalidIndex,
            MeshError::StaleReference { .. } => ErrorKind::StaleReference,
            MeshError::CrossRegisterUnsupported { .. } => ErrorKind::CrossRegisterUnsupported,
            MeshError::UnsupportedBackend { .. } => ErrorKind::UnsupportedBackend,
            MeshError::UnsupportedGate { .. } => ErrorKind::UnsupportedGate,
            MeshError::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            MeshError::MalformedState { .. } => ErrorKind::MalformedState,
            MeshError::Timeout { .. } => ErrorKind::Timeout,
            MeshError::Disconnected { .. } => ErrorKind::Disconnected,
            MeshError::TopologyLookupFailed { .. } => ErrorKind::TopologyLookupFailed,
            MeshError::Codec { .. } => ErrorKind::Codec,
            MeshError::Config { .. } => ErrorKind::Config,
            MeshError::Simulation { .. } => ErrorKind::Simulation,
        }
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        MeshError::InvalidOperation { message: message.into() }
    }

    pub(crate) fn simulation(message: impl Into<String>) -> Self {
        MeshError::Simulation { message: message.into() }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        MeshError::MalformedState { message: message.into() }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
