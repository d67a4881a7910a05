// src/broker/message.rs

//! Wire messages exchanged between a broker and its clients.
//!
//! Requests and replies travel as JSON frames so the same messages can cross
//! a process boundary; the in-process transport carries the frames over
//! channels.

use crate::core::{JointState, MeshError, MeshResult, QubitRef, RegisterHandle};
use crate::operations::{Gate, TwoQubitGate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// A remote call on a node's Virtual Register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Test,
    GetReference { index: usize },
    NewRegister,
    /// `None` allocates into the root register bound at startup.
    Allocate { register: Option<RegisterHandle> },
    ApplyGate { qubit: QubitRef, gate: Gate },
    ApplyTwoQubitGate { control: QubitRef, target: QubitRef, gate: TwoQubitGate },
    MergeRegisters { first: QubitRef, second: QubitRef },
    ReadJointState { qubits: Vec<QubitRef> },
    Measure { qubit: QubitRef },
    RegisterSize,
    Notify { from: String, index: usize },
}

impl Request {
    /// Operation name used in logs and timeout errors.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Test => "test",
            Request::GetReference { .. } => "get_reference",
            Request::NewRegister => "new_register",
            Request::Allocate { .. } => "allocate",
            Request::ApplyGate { .. } => "apply_gate",
            Request::ApplyTwoQubitGate { .. } => "apply_two_qubit_gate",
            Request::MergeRegisters { .. } => "merge_registers",
            Request::ReadJointState { .. } => "read_joint_state",
            Request::Measure { .. } => "measure",
            Request::RegisterSize => "register_size",
            Request::Notify { .. } => "notify",
        }
    }

    /// Whether serving the call reads or changes the Virtual Register.
    pub fn touches_register(&self) -> bool {
        !matches!(self, Request::Test | Request::Notify { .. })
    }
}

/// A successful result of a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Ack(String),
    Qubit(QubitRef),
    Register(RegisterHandle),
    State(JointState),
    Outcome(u8),
    Size(usize),
    Done,
}

/// One request frame plus the channel its reply frame goes back on.
#[derive(Debug)]
pub struct Envelope {
    pub frame: String,
    pub reply: oneshot::Sender<String>,
}

/// Classical notification forwarded from a broker to its node's driver:
/// node `from` left a qubit at slot `index` of the receiver's virtual node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub from: String,
    pub index: usize,
}

pub fn encode<T: Serialize>(value: &T) -> MeshResult<String> {
    serde_json::to_string(value).map_err(|e| MeshError::Codec { message: format!("Failed to encode frame: {}", e) })
}

pub fn decode<T: DeserializeOwned>(frame: &str) -> MeshResult<T> {
    serde_json::from_str(frame).map_err(|e| MeshError::Codec { message: format!("Failed to decode frame: {}", e) })
}
