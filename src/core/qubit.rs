// src/core/qubit.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REGISTER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one node's Virtual Register.
/// Unique within the process, so a reference issued by one register is never
/// mistaken for a slot of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegisterId(pub u64);

impl RegisterId {
    /// Draws a fresh process-unique identity.
    pub fn fresh() -> Self {
        RegisterId(NEXT_REGISTER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reg({})", self.0)
    }
}

/// Handle to one simulated register group inside a Virtual Register.
///
/// Qubits in different groups are in a product state with each other. Merging
/// two groups replaces them with their tensor product under the first handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegisterHandle(pub u64);

impl fmt::Display for RegisterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Group({})", self.0)
    }
}

/// Opaque reference to one qubit slot in a specific Virtual Register.
///
/// Slot indices are never reused: once the qubit at `index` is consumed the
/// reference stays stale forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QubitRef {
    /// The register that issued this reference.
    pub register: RegisterId,
    /// Slot index inside that register.
    pub index: usize,
}

impl QubitRef {
    pub fn new(register: RegisterId, index: usize) -> Self {
        Self { register, index }
    }
}

impl fmt::Display for QubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q({}:{})", self.register.0, self.index)
    }
}

/// A [`QubitRef`] together with the name of the node that owns it.
///
/// Only meaningful for the exchange that produced it. The owning node keeps
/// authority over the slot; holders act on it through that node's broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteQubitRef {
    pub node: String,
    pub qubit: QubitRef,
}

impl RemoteQubitRef {
    pub fn new(node: impl Into<String>, qubit: QubitRef) -> Self {
        Self { node: node.into(), qubit }
    }
}

impl fmt::Display for RemoteQubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.qubit, self.node)
    }
}
