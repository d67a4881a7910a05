// src/broker/service.rs

use super::client::BrokerClient;
use super::message::{Reply, Request, Trigger};
use crate::core::{JointState, MeshError, MeshResult, QubitRef, RegisterHandle, TEST_ACK};
use crate::node::NodeConfig;
use crate::operations::{Gate, TwoQubitGate};
use crate::simulation::VirtualRegister;
use tokio::sync::mpsc;
use tracing::{debug, info};

struct Local {
    register: VirtualRegister,
    root: RegisterHandle,
}

enum Binding {
    /// The broker owns the register: a virtual node.
    Local(Local),
    /// The register lives behind another broker: a classical server fronting
    /// its node's virtual node.
    Forward(BrokerClient),
}

/// Routes remote calls to one node's Virtual Register.
///
/// Until [`Broker::bind`] or [`Broker::bind_virtual_node`] runs every call
/// fails with `NotReady` and touches nothing. Each `remote_*` method is one
/// operation of the RPC surface, served from a locally bound register.
pub struct Broker {
    node: String,
    merge_implicitly: bool,
    bound: Option<Binding>,
    triggers: Option<mpsc::UnboundedSender<Trigger>>,
}

impl Broker {
    pub fn new(node: impl Into<String>, config: &NodeConfig) -> Self {
        Self { node: node.into(), merge_implicitly: config.merge_implicitly, bound: None, triggers: None }
    }

    /// Forwards `notify` calls to `triggers`.
    pub fn with_triggers(mut self, triggers: mpsc::UnboundedSender<Trigger>) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn bind(&mut self, register: VirtualRegister, root: RegisterHandle) {
        info!(node = %self.node, register = %register.id(), root = %root, backend = %register.backend(), "Broker bound");
        self.bound = Some(Binding::Local(Local { register, root }));
    }

    /// Binds to the register of the virtual node behind `virtual_node`; register
    /// calls are forwarded there, `test` and `notify` are answered here.
    pub fn bind_virtual_node(&mut self, virtual_node: BrokerClient) {
        info!(node = %self.node, virtual_node = %virtual_node.node(), "Broker bound to virtual node");
        self.bound = Some(Binding::Forward(virtual_node));
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// Unbinds and hands the register back, if this broker owned one.
    pub fn into_register(self) -> Option<VirtualRegister> {
        match self.bound {
            Some(Binding::Local(local)) => Some(local.register),
            _ => None,
        }
    }

    fn binding(&mut self, operation: &str) -> MeshResult<&mut Binding> {
        let node = &self.node;
        self.bound.as_mut().ok_or_else(|| MeshError::NotReady {
            message: format!("{} refused: broker for {} is not bound to a register", operation, node),
        })
    }

    fn bound(&mut self, operation: &str) -> MeshResult<&mut Local> {
        let node = self.node.clone();
        match self.binding(operation)? {
            Binding::Local(local) => Ok(local),
            Binding::Forward(client) => Err(MeshError::invalid_operation(format!(
                "{} on {} is served by virtual node {}; send it through Broker::handle",
                operation,
                node,
                client.node()
            ))),
        }
    }

    pub fn remote_test(&mut self) -> MeshResult<String> {
        self.binding("test")?;
        Ok(TEST_ACK.to_string())
    }

    pub fn remote_get_reference(&mut self, index: usize) -> MeshResult<QubitRef> {
        self.bound("get_reference")?.register.reference(index)
    }

    pub fn remote_new_register(&mut self) -> MeshResult<RegisterHandle> {
        Ok(self.bound("new_register")?.register.new_group())
    }

    pub fn remote_allocate(&mut self, register: Option<RegisterHandle>) -> MeshResult<QubitRef> {
        let bound = self.bound("allocate")?;
        let group = register.unwrap_or(bound.root);
        bound.register.allocate(group)
    }

    pub fn remote_apply_gate(&mut self, qubit: &QubitRef, gate: Gate) -> MeshResult<()> {
        self.bound("apply_gate")?.register.apply_gate(qubit, gate)
    }

    pub fn remote_apply_two_qubit_gate(
        &mut self,
        control: &QubitRef,
        target: &QubitRef,
        gate: TwoQubitGate,
    ) -> MeshResult<()> {
        let merge_implicitly = self.merge_implicitly;
        self.bound("apply_two_qubit_gate")?
            .register
            .apply_two_qubit_gate(control, target, gate, merge_implicitly)
    }

    pub fn remote_merge_registers(&mut self, first: &QubitRef, second: &QubitRef) -> MeshResult<RegisterHandle> {
        self.bound("merge_registers")?.register.merge(first, second)
    }

    pub fn remote_read_joint_state(&mut self, qubits: &[QubitRef]) -> MeshResult<JointState> {
        self.bound("read_joint_state")?.register.read_joint_state(qubits)
    }

    pub fn remote_measure(&mut self, qubit: &QubitRef) -> MeshResult<u8> {
        self.bound("measure")?.register.measure(qubit)
    }

    pub fn remote_register_size(&mut self) -> MeshResult<usize> {
        Ok(self.bound("register_size")?.register.size())
    }

    pub fn remote_notify(&mut self, from: &str, index: usize) -> MeshResult<()> {
        self.binding("notify")?;
        let triggers = self.triggers.as_ref().ok_or_else(|| {
            MeshError::invalid_operation(format!("Node {} has no program waiting for notifications", self.node))
        })?;
        triggers
            .send(Trigger { from: from.to_string(), index })
            .map_err(|_| MeshError::Disconnected {
                node: self.node.clone(),
                message: "Node program stopped listening for notifications".to_string(),
            })?;
        debug!(node = %self.node, from, index, "Forwarded notification");
        Ok(())
    }

    /// Serves one decoded request, forwarding register calls when bound to a
    /// virtual node.
    pub async fn handle(&mut self, request: Request) -> MeshResult<Reply> {
        if let Some(Binding::Forward(virtual_node)) = &self.bound {
            if request.touches_register() {
                let virtual_node = virtual_node.clone();
                debug!(node = %self.node, virtual_node = %virtual_node.node(), operation = request.name(), "Forwarding remote call");
                return virtual_node.call(request).await;
            }
        }
        self.dispatch(request)
    }

    fn dispatch(&mut self, request: Request) -> MeshResult<Reply> {
        match request {
            Request::Test => self.remote_test().map(Reply::Ack),
            Request::GetReference { index } => self.remote_get_reference(index).map(Reply::Qubit),
            Request::NewRegister => self.remote_new_register().map(Reply::Register),
            Request::Allocate { register } => self.remote_allocate(register).map(Reply::Qubit),
            Request::ApplyGate { qubit, gate } => self.remote_apply_gate(&qubit, gate).map(|_| Reply::Done),
            Request::ApplyTwoQubitGate { control, target, gate } => {
                self.remote_apply_two_qubit_gate(&control, &target, gate).map(|_| Reply::Done)
            }
            Request::MergeRegisters { first, second } => {
                self.remote_merge_registers(&first, &second).map(Reply::Register)
            }
            Request::ReadJointState { qubits } => self.remote_read_joint_state(&qubits).map(Reply::State),
            Request::Measure { qubit } => self.remote_measure(&qubit).map(Reply::Outcome),
            Request::RegisterSize => self.remote_register_size().map(Reply::Size),
            Request::Notify { from, index } => self.remote_notify(&from, index).map(|_| Reply::Done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Backend, ErrorKind};

    fn bound_broker(config: &NodeConfig) -> Broker {
        let mut register = VirtualRegister::seeded(config.backend, 5);
        let root = register.new_group();
        let mut broker = Broker::new("Bob", config);
        broker.bind(register, root);
        broker
    }

    #[test]
    fn every_call_before_bind_is_not_ready() {
        let mut broker = Broker::new("Bob", &NodeConfig::default());
        assert_eq!(broker.remote_test().unwrap_err().kind(), ErrorKind::NotReady);
        assert_eq!(broker.remote_allocate(None).unwrap_err().kind(), ErrorKind::NotReady);
        assert_eq!(broker.remote_register_size().unwrap_err().kind(), ErrorKind::NotReady);
        assert_eq!(broker.remote_notify("Alice", 0).unwrap_err().kind(), ErrorKind::NotReady);
        assert!(broker.into_register().is_none());
    }

    #[test]
    fn liveness_check_acknowledges() -> MeshResult<()> {
        let mut broker = bound_broker(&NodeConfig::default());
        assert_eq!(broker.remote_test()?, "Tested!");
        Ok(())
    }

    #[test]
    fn allocate_grows_the_register_with_distinct_references() -> MeshResult<()> {
        let mut broker = bound_broker(&NodeConfig::default());
        let first = broker.remote_allocate(None)?;
        let before = broker.remote_register_size()?;
        let second = broker.remote_allocate(None)?;
        assert_eq!(broker.remote_register_size()?, before + 1);
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn out_of_range_reference_is_invalid_index() {
        let mut broker = bound_broker(&NodeConfig::default());
        let err = broker.remote_get_reference(4).unwrap_err();
        assert_eq!(err, MeshError::InvalidIndex { index: 4, size: 0 });
    }

    #[test]
    fn cross_register_gate_needs_an_explicit_merge_when_implicit_merging_is_off() -> MeshResult<()> {
        let config = NodeConfig { merge_implicitly: false, ..NodeConfig::for_backend(Backend::AmplitudeVector) };
        let mut broker = bound_broker(&config);
        let a = broker.remote_allocate(None)?;
        let other = broker.remote_new_register()?;
        let b = broker.remote_allocate(Some(other))?;
        let err = broker.remote_apply_two_qubit_gate(&a, &b, TwoQubitGate::Cnot).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossRegisterUnsupported);

        broker.remote_merge_registers(&a, &b)?;
        broker.remote_apply_gate(&a, Gate::X)?;
        broker.remote_apply_two_qubit_gate(&a, &b, TwoQubitGate::Cnot)?;
        assert_eq!(broker.remote_measure(&b)?, 1);
        Ok(())
    }

    #[test]
    fn notify_without_a_listening_program_is_rejected() {
        let mut broker = bound_broker(&NodeConfig::default());
        assert_eq!(broker.remote_notify("Alice", 0).unwrap_err().kind(), ErrorKind::InvalidOperation);
    }

    #[tokio::test]
    async fn notify_reaches_the_trigger_channel() -> MeshResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut broker = bound_broker(&NodeConfig::default()).with_triggers(tx);
        broker.handle(Request::Notify { from: "Alice".to_string(), index: 3 }).await?;
        assert_eq!(rx.try_recv().ok(), Some(Trigger { from: "Alice".to_string(), index: 3 }));
        Ok(())
    }

    #[tokio::test]
    async fn virtual_node_binding_forwards_register_calls() -> MeshResult<()> {
        let config = NodeConfig::for_backend(Backend::AmplitudeVector);
        let (server, calls) = crate::broker::BrokerServer::spawn(bound_broker(&config));
        let virtual_node = BrokerClient::new("Bob", calls, config.rpc_timeout());
        let placed = virtual_node.allocate(None).await?;

        let mut classical = Broker::new("Bob", &config);
        classical.bind_virtual_node(virtual_node.clone());
        assert_eq!(classical.handle(Request::RegisterSize).await?, Reply::Size(1));
        assert_eq!(classical.handle(Request::GetReference { index: 0 }).await?, Reply::Qubit(placed.qubit));
        assert_eq!(classical.handle(Request::Test).await?, Reply::Ack(TEST_ACK.to_string()));

        classical.handle(Request::Allocate { register: None }).await?;
        assert_eq!(virtual_node.register_size().await?, 2);
        // Register calls cannot bypass the forwarding path
        assert_eq!(classical.remote_register_size().unwrap_err().kind(), ErrorKind::InvalidOperation);
        assert!(classical.into_register().is_none());
        server.shutdown().await?;
        Ok(())
    }
}
