// src/broker/client.rs

use super::message::{Envelope, Reply, Request, decode, encode};
use crate::core::{JointState, MeshError, MeshResult, QubitRef, RegisterHandle, RemoteQubitRef};
use crate::operations::{Gate, TwoQubitGate};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc, oneshot};
use tracing::trace;

/// Caller side of one node's broker.
///
/// Every call is a request frame plus a oneshot for the reply, bounded by the
/// client's timeout. Clones share the session lock.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    node: String,
    calls: mpsc::Sender<Envelope>,
    timeout: Duration,
    session: Arc<Mutex<()>>,
}

impl BrokerClient {
    pub fn new(node: impl Into<String>, calls: mpsc::Sender<Envelope>, timeout: Duration) -> Self {
        Self { node: node.into(), calls, timeout, session: Arc::new(Mutex::new(())) }
    }

    /// Name of the node this client talks to.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Exclusive use of this connection for a multi-call sequence; other
    /// sessions queue until the guard drops.
    pub async fn lock_session(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.session).lock_owned().await
    }

    pub(crate) async fn call(&self, request: Request) -> MeshResult<Reply> {
        let operation = request.name();
        let frame = encode(&request)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        trace!(node = %self.node, operation, "Sending remote call");

        let exchange = async {
            self.calls
                .send(Envelope { frame, reply: reply_tx })
                .await
                .map_err(|_| self.disconnected("request channel closed"))?;
            reply_rx.await.map_err(|_| self.disconnected("broker dropped the call"))
        };
        let reply = tokio::time::timeout(self.timeout, exchange).await.map_err(|_| MeshError::Timeout {
            node: self.node.clone(),
            operation: operation.to_string(),
            millis: self.timeout.as_millis() as u64,
        })??;
        decode::<MeshResult<Reply>>(&reply)?
    }

    fn disconnected(&self, message: &str) -> MeshError {
        MeshError::Disconnected { node: self.node.clone(), message: message.to_string() }
    }

    fn unexpected(&self, operation: &str, reply: Reply) -> MeshError {
        MeshError::Codec { message: format!("{} on {} answered with {:?}", operation, self.node, reply) }
    }

    /// The local reference inside `remote`, provided it lives on this node.
    fn local(&self, remote: &RemoteQubitRef) -> MeshResult<QubitRef> {
        if remote.node != self.node {
            return Err(MeshError::StaleReference {
                qubit: remote.qubit,
                message: format!("Reference belongs to {}, not {}", remote.node, self.node),
            });
        }
        Ok(remote.qubit)
    }

    fn remote(&self, qubit: QubitRef) -> RemoteQubitRef {
        RemoteQubitRef::new(self.node.clone(), qubit)
    }

    pub async fn test(&self) -> MeshResult<String> {
        match self.call(Request::Test).await? {
            Reply::Ack(ack) => Ok(ack),
            other => Err(self.unexpected("test", other)),
        }
    }

    pub async fn get_reference(&self, index: usize) -> MeshResult<RemoteQubitRef> {
        match self.call(Request::GetReference { index }).await? {
            Reply::Qubit(qubit) => Ok(self.remote(qubit)),
            other => Err(self.unexpected("get_reference", other)),
        }
    }

    pub async fn new_register(&self) -> MeshResult<RegisterHandle> {
        match self.call(Request::NewRegister).await? {
            Reply::Register(handle) => Ok(handle),
            other => Err(self.unexpected("new_register", other)),
        }
    }

    /// Fresh |0⟩ qubit in `register`, or in the root register when `None`.
    pub async fn allocate(&self, register: Option<RegisterHandle>) -> MeshResult<RemoteQubitRef> {
        match self.call(Request::Allocate { register }).await? {
            Reply::Qubit(qubit) => Ok(self.remote(qubit)),
            other => Err(self.unexpected("allocate", other)),
        }
    }

    pub async fn apply_gate(&self, qubit: &RemoteQubitRef, gate: Gate) -> MeshResult<()> {
        let qubit = self.local(qubit)?;
        match self.call(Request::ApplyGate { qubit, gate }).await? {
            Reply::Done => Ok(()),
            other => Err(self.unexpected("apply_gate", other)),
        }
    }

    pub async fn apply_two_qubit_gate(
        &self,
        control: &RemoteQubitRef,
        target: &RemoteQubitRef,
        gate: TwoQubitGate,
    ) -> MeshResult<()> {
        let request = Request::ApplyTwoQubitGate { control: self.local(control)?, target: self.local(target)?, gate };
        match self.call(request).await? {
            Reply::Done => Ok(()),
            other => Err(self.unexpected("apply_two_qubit_gate", other)),
        }
    }

    pub async fn merge_registers(&self, first: &RemoteQubitRef, second: &RemoteQubitRef) -> MeshResult<RegisterHandle> {
        let request = Request::MergeRegisters { first: self.local(first)?, second: self.local(second)? };
        match self.call(request).await? {
            Reply::Register(handle) => Ok(handle),
            other => Err(self.unexpected("merge_registers", other)),
        }
    }

    /// Joint state over `qubits`; `qubits[0]` is the most significant factor.
    pub async fn read_joint_state(&self, qubits: &[RemoteQubitRef]) -> MeshResult<JointState> {
        let qubits = qubits.iter().map(|q| self.local(q)).collect::<MeshResult<Vec<_>>>()?;
        match self.call(Request::ReadJointState { qubits }).await? {
            Reply::State(state) => Ok(state),
            other => Err(self.unexpected("read_joint_state", other)),
        }
    }

    pub async fn measure(&self, qubit: &RemoteQubitRef) -> MeshResult<u8> {
        let qubit = self.local(qubit)?;
        match self.call(Request::Measure { qubit }).await? {
            Reply::Outcome(bit) => Ok(bit),
            other => Err(self.unexpected("measure", other)),
        }
    }

    pub async fn register_size(&self) -> MeshResult<usize> {
        match self.call(Request::RegisterSize).await? {
            Reply::Size(size) => Ok(size),
            other => Err(self.unexpected("register_size", other)),
        }
    }

    pub async fn notify(&self, from: &str, index: usize) -> MeshResult<()> {
        match self.call(Request::Notify { from: from.to_string(), index }).await? {
            Reply::Done => Ok(()),
            other => Err(self.unexpected("notify", other)),
        }
    }
}
