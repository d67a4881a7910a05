// src/node/driver.rs

//! Node Role Driver and the programs a node can run.

use super::config::NodeConfig;
use super::network::LocalNetwork;
use super::topology::Topology;
use crate::broker::{Broker, BrokerClient, Trigger};
use crate::core::{MeshError, MeshResult};
use crate::protocol::{MergeProtocol, Verdict};
use crate::validation::{Verifier, VerifierConfig};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Everything a node program can reach once its node is online.
pub struct Session {
    pub node: String,
    pub config: NodeConfig,
    pub(crate) network: LocalNetwork,
    pub(crate) virtual_topology: Topology,
    pub(crate) classical_topology: Topology,
    /// Client for this node's own virtual node
    pub own_virtual: BrokerClient,
    /// Notifications received by this node's broker; `None` for pure callers.
    pub triggers: Option<mpsc::UnboundedReceiver<Trigger>>,
}

impl Session {
    /// Client for `peer`'s virtual node.
    pub async fn virtual_peer(&self, peer: &str) -> MeshResult<BrokerClient> {
        let endpoint = self.virtual_topology.require(peer, "virtual")?;
        self.network.connect(peer, endpoint, &self.config).await
    }

    /// Client for `peer`'s classical server.
    pub async fn classical_peer(&self, peer: &str) -> MeshResult<BrokerClient> {
        let endpoint = self.classical_topology.require(peer, "classical")?;
        self.network.connect(peer, endpoint, &self.config).await
    }

    /// Waits for the next notification, bounded by the connect timeout.
    pub async fn next_trigger(&mut self) -> MeshResult<Trigger> {
        let node = self.node.clone();
        let millis = self.config.connect_timeout_ms;
        let triggers = self.triggers.as_mut().ok_or_else(|| {
            MeshError::invalid_operation(format!("{} has no classical server to receive notifications", node))
        })?;
        match tokio::time::timeout(self.config.connect_timeout(), triggers.recv()).await {
            Ok(Some(trigger)) => Ok(trigger),
            Ok(None) => Err(MeshError::Disconnected { node, message: "Notification channel closed".to_string() }),
            Err(_) => Err(MeshError::Timeout { node, operation: "notify".to_string(), millis }),
        }
    }

    /// Verifier matching this node's backend and tolerances.
    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.config.backend).with_config(VerifierConfig {
            amplitude_tolerance: self.config.amplitude_tolerance,
            density_tolerance: self.config.density_tolerance,
        })
    }
}

/// Entry program a node runs once connectivity is established.
#[async_trait]
pub trait NodeProgram: Send + Sized {
    async fn on_ready(self, session: Session) -> MeshResult<Option<Verdict>>;
}

/// Callee of the classical link: waits for a peer's notification, merges the
/// announced qubit with a fresh one on its own virtual node and prints the
/// verdict line.
#[derive(Debug, Clone, Default)]
pub struct Responder;

impl Responder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeProgram for Responder {
    async fn on_ready(self, mut session: Session) -> MeshResult<Option<Verdict>> {
        let Trigger { from, index } = session.next_trigger().await?;
        info!(node = %session.node, from = %from, index, "Received qubit notification");

        let merge = MergeProtocol::new(&session.own_virtual).run(index).await;
        let verdict = Verdict::judge(merge, &session.verifier());
        match &verdict {
            Verdict::Pass => info!(node = %session.node, "Register merge verified"),
            other => warn!(node = %session.node, verdict = %other, "Register merge failed"),
        }
        println!("{}", verdict.report_line(&from, &session.node));
        Ok(Some(verdict))
    }
}

/// Caller of the classical link: leaves a fresh qubit in a new register on
/// `peer`'s virtual node and tells `peer` where it is.
#[derive(Debug, Clone)]
pub struct Initiator {
    peer: String,
}

impl Initiator {
    pub fn new(peer: impl Into<String>) -> Self {
        Self { peer: peer.into() }
    }
}

#[async_trait]
impl NodeProgram for Initiator {
    async fn on_ready(self, session: Session) -> MeshResult<Option<Verdict>> {
        let peer_virtual = session.virtual_peer(&self.peer).await?;
        let register = peer_virtual.new_register().await?;
        let qubit = peer_virtual.allocate(Some(register)).await?;
        info!(node = %session.node, peer = %self.peer, qubit = %qubit, "Placed qubit on peer");

        let classical = session.classical_peer(&self.peer).await?;
        classical.notify(&session.node, qubit.qubit.index).await?;
        Ok(None)
    }
}

/// Runs node `name`: a classical server when the classical table lists it,
/// a pure caller otherwise. A classical server's broker is bound to the
/// node's own virtual node, so peers calling it reach that register.
pub async fn run<P: NodeProgram>(
    name: &str,
    virtual_topology: &Topology,
    classical_topology: &Topology,
    network: &LocalNetwork,
    config: &NodeConfig,
    program: P,
) -> MeshResult<Option<Verdict>> {
    let own_endpoint = virtual_topology.require(name, "virtual")?;
    let broker = if classical_topology.contains(name) {
        let own_virtual = network.connect(name, own_endpoint, config).await?;
        let mut broker = Broker::new(name, config);
        broker.bind_virtual_node(own_virtual);
        info!(node = name, "Starting as classical server");
        Some(broker)
    } else {
        info!(node = name, "Starting as pure caller");
        None
    };
    network
        .setup_local(name, virtual_topology, classical_topology, broker, config, program)
        .await
}
