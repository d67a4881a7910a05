// src/protocol/merge.rs

use crate::broker::BrokerClient;
use crate::core::{JointState, MeshError, MeshResult, RegisterHandle, RemoteQubitRef};
use crate::operations::{Gate, TwoQubitGate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// One remote call of the merge sequence, plus the final verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MergeStep {
    GetReference,
    Allocate,
    Hadamard,
    Cnot,
    ReadJointState,
    Verify,
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStep::GetReference => "get_reference",
            MergeStep::Allocate => "allocate",
            MergeStep::Hadamard => "hadamard",
            MergeStep::Cnot => "cnot",
            MergeStep::ReadJointState => "read_joint_state",
            MergeStep::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// A merge that stopped at `step`. Nothing done before it is undone.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Register merge aborted at {step}: {error}")]
pub struct MergeFailure {
    pub step: MergeStep,
    #[source]
    pub error: MeshError,
}

impl From<MergeFailure> for MeshError {
    fn from(failure: MergeFailure) -> Self {
        failure.error
    }
}

/// Result of a completed merge sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The qubit that was already on the node
    pub peer_half: RemoteQubitRef,
    /// The qubit this run allocated
    pub fresh: RemoteQubitRef,
    /// Readout over `[peer_half, fresh]`
    pub joint: JointState,
}

trait AtStep<T> {
    fn at(self, step: MergeStep) -> Result<T, MergeFailure>;
}

impl<T> AtStep<T> for MeshResult<T> {
    fn at(self, step: MergeStep) -> Result<T, MergeFailure> {
        self.map_err(|error| MergeFailure { step, error })
    }
}

/// Caller side of the register merge.
///
/// Entangles the qubit at a given slot of the peer's node with a freshly
/// allocated one and reads the pair out. Each step waits for the previous
/// reply, and the whole sequence holds the client's session lock so two
/// merges over one connection never interleave.
pub struct MergeProtocol<'a> {
    client: &'a BrokerClient,
    register: Option<RegisterHandle>,
}

impl<'a> MergeProtocol<'a> {
    pub fn new(client: &'a BrokerClient) -> Self {
        Self { client, register: None }
    }

    /// Allocates the fresh qubit in `register` instead of the node's root register.
    pub fn in_register(mut self, register: RegisterHandle) -> Self {
        self.register = Some(register);
        self
    }

    pub async fn run(&self, peer_index: usize) -> Result<MergeOutcome, MergeFailure> {
        let _session = self.client.lock_session().await;
        let node = self.client.node();
        let outcome = self.steps(peer_index).await;
        match &outcome {
            Ok(merged) => debug!(node, joint = %merged.joint, "Register merge completed"),
            Err(failure) => warn!(node, step = %failure.step, error = %failure.error, "Register merge aborted"),
        }
        outcome
    }

    async fn steps(&self, peer_index: usize) -> Result<MergeOutcome, MergeFailure> {
        let node = self.client.node();

        let peer_half = self.client.get_reference(peer_index).await.at(MergeStep::GetReference)?;
        debug!(node, step = %MergeStep::GetReference, qubit = %peer_half, "Merge step done");

        let fresh = self.client.allocate(self.register).await.at(MergeStep::Allocate)?;
        debug!(node, step = %MergeStep::Allocate, qubit = %fresh, "Merge step done");

        self.client.apply_gate(&peer_half, Gate::H).await.at(MergeStep::Hadamard)?;
        debug!(node, step = %MergeStep::Hadamard, "Merge step done");

        self.client
            .apply_two_qubit_gate(&peer_half, &fresh, TwoQubitGate::Cnot)
            .await
            .at(MergeStep::Cnot)?;
        debug!(node, step = %MergeStep::Cnot, "Merge step done");

        let joint = self
            .client
            .read_joint_state(&[peer_half.clone(), fresh.clone()])
            .await
            .at(MergeStep::ReadJointState)?;
        debug!(node, step = %MergeStep::ReadJointState, "Merge step done");

        Ok(MergeOutcome { peer_half, fresh, joint })
    }
}
