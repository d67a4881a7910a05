// src/node/network.rs

//! In-process transport: an endpoint → request-channel registry.

use super::config::NodeConfig;
use super::driver::{NodeProgram, Session};
use super::topology::{Endpoint, Topology};
use crate::broker::{Broker, BrokerClient, BrokerServer, Envelope};
use crate::core::{MeshError, MeshResult};
use crate::protocol::Verdict;
use crate::simulation::VirtualRegister;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info};

/// Pause between attempts to reach an endpoint nobody listens on yet.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Brokers listening in this process, by endpoint. Clones share the registry.
#[derive(Debug, Clone, Default)]
pub struct LocalNetwork {
    listeners: Arc<Mutex<HashMap<Endpoint, mpsc::Sender<Envelope>>>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes calls for `endpoint` to `calls`.
    pub async fn listen(&self, endpoint: &Endpoint, calls: mpsc::Sender<Envelope>) -> MeshResult<()> {
        let mut listeners = self.listeners.lock().await;
        if listeners.get(endpoint).is_some_and(|existing| !existing.is_closed()) {
            return Err(MeshError::invalid_operation(format!("Endpoint {} is already in use", endpoint)));
        }
        listeners.insert(endpoint.clone(), calls);
        debug!(endpoint = %endpoint, "Endpoint listening");
        Ok(())
    }

    pub async fn unlisten(&self, endpoint: &Endpoint) {
        self.listeners.lock().await.remove(endpoint);
    }

    /// A client for the broker at `endpoint`, waiting up to the connect timeout
    /// for it to start listening.
    pub async fn connect(&self, node: &str, endpoint: &Endpoint, config: &NodeConfig) -> MeshResult<BrokerClient> {
        let deadline = Instant::now() + config.connect_timeout();
        loop {
            let calls = self.listeners.lock().await.get(endpoint).filter(|tx| !tx.is_closed()).cloned();
            if let Some(calls) = calls {
                debug!(node, endpoint = %endpoint, "Connected");
                return Ok(BrokerClient::new(node, calls, config.rpc_timeout()));
            }
            if Instant::now() >= deadline {
                return Err(MeshError::Timeout {
                    node: node.to_string(),
                    operation: "connect".to_string(),
                    millis: config.connect_timeout_ms,
                });
            }
            tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
        }
    }

    /// Starts a virtual node: a broker bound to a fresh register with one
    /// root register group, listening at `endpoint`.
    pub async fn spawn_virtual_node(&self, name: &str, endpoint: &Endpoint, config: &NodeConfig) -> MeshResult<BrokerServer> {
        let mut register = register_for(config);
        let root = register.new_group();
        let mut broker = Broker::new(name, config);
        broker.bind(register, root);
        let (server, calls) = BrokerServer::spawn(broker);
        self.listen(endpoint, calls).await?;
        info!(node = name, endpoint = %endpoint, backend = %config.backend, "Virtual node started");
        Ok(server)
    }

    /// Brings `name` online and hands control to `on_ready` exactly once.
    ///
    /// With a broker, the node first serves it at its classical endpoint;
    /// notifications it receives are delivered through the session. The node
    /// then connects to its own virtual node. The broker stops once `on_ready`
    /// returns.
    pub async fn setup_local<P: NodeProgram>(
        &self,
        name: &str,
        virtual_topology: &Topology,
        classical_topology: &Topology,
        broker: Option<Broker>,
        config: &NodeConfig,
        on_ready: P,
    ) -> MeshResult<Option<Verdict>> {
        let mut triggers = None;
        let mut serving = None;
        if let Some(broker) = broker {
            let endpoint = classical_topology.require(name, "classical")?.clone();
            let (tx, rx) = mpsc::unbounded_channel();
            let (server, calls) = BrokerServer::spawn(broker.with_triggers(tx));
            self.listen(&endpoint, calls).await?;
            triggers = Some(rx);
            serving = Some((server, endpoint));
        }

        let result = async {
            let own_endpoint = virtual_topology.require(name, "virtual")?;
            let own_virtual = self.connect(name, own_endpoint, config).await?;
            let session = Session {
                node: name.to_string(),
                config: config.clone(),
                network: self.clone(),
                virtual_topology: virtual_topology.clone(),
                classical_topology: classical_topology.clone(),
                own_virtual,
                triggers,
            };
            info!(node = name, "Node ready");
            on_ready.on_ready(session).await
        }
        .await;

        if let Some((server, endpoint)) = serving {
            self.unlisten(&endpoint).await;
            server.shutdown().await?;
        }
        result
    }
}

/// A register seeded from `config`, or from the OS when no seed is set.
fn register_for(config: &NodeConfig) -> VirtualRegister {
    let register = match config.seed {
        Some(seed) => VirtualRegister::seeded(config.backend, seed),
        None => VirtualRegister::new(config.backend),
    };
    register.with_qubit_limit(config.qubit_limit())
}
