// src/core/mod.rs

//! Core data structures and types

pub mod error;
pub mod qubit;
pub mod state;

pub use error::{ErrorKind, MeshError, MeshResult};
pub use qubit::{QubitRef, RegisterHandle, RegisterId, RemoteQubitRef};
pub use state::{Backend, BellState, JointState};

pub mod constants;
pub use constants::mesh_constants::{AMPLITUDE_TOLERANCE, DENSITY_TOLERANCE, NEGLIGIBLE, SEPARABLE_TOLERANCE, TEST_ACK};
