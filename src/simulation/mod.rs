// src/simulation/mod.rs

//! Reference simulation engines and the per-node Virtual Register built on them.
//!
//! Each register group is backed by exactly one engine, chosen by the node's
//! [`Backend`]. Dispatch over the three representations is a closed enum, so
//! adding a representation is a compile error everywhere it must be handled.

mod amplitude;
mod density;
mod register;
pub mod stabilizer;

pub use register::VirtualRegister;
pub use stabilizer::{PauliRow, canonical_generators};

use crate::core::{Backend, JointState, MeshError, MeshResult};
use crate::operations::{Gate, TwoQubitGate};
use amplitude::AmplitudeEngine;
use density::DensityEngine;
use rand::Rng;
use stabilizer::StabilizerEngine;

/// The engine state of one register group.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GroupEngine {
    Density(DensityEngine),
    Amplitude(AmplitudeEngine),
    Stabilizer(StabilizerEngine),
}

impl GroupEngine {
    /// An empty group in the representation of `backend`.
    pub(crate) fn new(backend: Backend) -> Self {
        match backend {
            Backend::DensityMatrix => GroupEngine::Density(DensityEngine::new()),
            Backend::AmplitudeVector => GroupEngine::Amplitude(AmplitudeEngine::new()),
            Backend::StabilizerTableau => GroupEngine::Stabilizer(StabilizerEngine::new()),
        }
    }

    pub(crate) fn backend(&self) -> Backend {
        match self {
            GroupEngine::Density(_) => Backend::DensityMatrix,
            GroupEngine::Amplitude(_) => Backend::AmplitudeVector,
            GroupEngine::Stabilizer(_) => Backend::StabilizerTableau,
        }
    }

    pub(crate) fn num_qubits(&self) -> usize {
        match self {
            GroupEngine::Density(e) => e.num_qubits(),
            GroupEngine::Amplitude(e) => e.num_qubits(),
            GroupEngine::Stabilizer(e) => e.num_qubits(),
        }
    }

    pub(crate) fn add_qubit(&mut self) -> MeshResult<usize> {
        match self {
            GroupEngine::Density(e) => e.add_qubit(),
            GroupEngine::Amplitude(e) => e.add_qubit(),
            GroupEngine::Stabilizer(e) => e.add_qubit(),
        }
    }

    /// Tensor product `self ⊗ other`.
    pub(crate) fn absorb(&mut self, other: GroupEngine) -> MeshResult<()> {
        match (self, other) {
            (GroupEngine::Density(a), GroupEngine::Density(b)) => a.absorb(b),
            (GroupEngine::Amplitude(a), GroupEngine::Amplitude(b)) => a.absorb(b),
            (GroupEngine::Stabilizer(a), GroupEngine::Stabilizer(b)) => a.absorb(b),
            (a, b) => Err(MeshError::UnsupportedBackend {
                message: format!("Cannot merge a {} group with a {} group", a.backend(), b.backend()),
            }),
        }
    }

    pub(crate) fn apply_gate(&mut self, position: usize, gate: Gate) -> MeshResult<()> {
        match self {
            GroupEngine::Density(e) => e.apply_gate(position, gate),
            GroupEngine::Amplitude(e) => e.apply_gate(position, gate),
            GroupEngine::Stabilizer(e) => e.apply_gate(position, gate),
        }
    }

    pub(crate) fn apply_controlled(&mut self, control: usize, target: usize, gate: TwoQubitGate) -> MeshResult<()> {
        match self {
            GroupEngine::Density(e) => e.apply_controlled(control, target, gate),
            GroupEngine::Amplitude(e) => e.apply_controlled(control, target, gate),
            GroupEngine::Stabilizer(e) => e.apply_controlled(control, target, gate),
        }
    }

    pub(crate) fn measure<R: Rng>(&mut self, position: usize, rng: &mut R) -> MeshResult<u8> {
        match self {
            GroupEngine::Density(e) => e.measure(position, rng),
            GroupEngine::Amplitude(e) => e.measure(position, rng),
            GroupEngine::Stabilizer(e) => e.measure(position, rng),
        }
    }

    /// Reads out the qubits at `order` in the group's native representation.
    pub(crate) fn read(&self, order: &[usize]) -> MeshResult<JointState> {
        match self {
            GroupEngine::Density(e) => Ok(JointState::from_density(&e.read(order)?)),
            GroupEngine::Amplitude(e) => Ok(JointState::from_amplitudes(&e.read(order)?)),
            GroupEngine::Stabilizer(e) => {
                let (rows, phases): (Vec<Vec<u8>>, Vec<u8>) =
                    e.read(order)?.iter().map(PauliRow::to_symplectic).unzip();
                Ok(JointState::StabilizerTableau { rows, phases })
            }
        }
    }
}
