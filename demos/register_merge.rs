// demos/register_merge.rs

//! Alice leaves a qubit on Bob's virtual node, Bob merges it with a fresh
//! qubit of his own and checks the result.
//!
//! ```text
//! cargo run --example register_merge -- [density|amplitude|stabilizer]
//! RUST_LOG=qmesh=debug cargo run --example register_merge
//! ```

use anyhow::{Context, Result};
use qmesh::node::{self, Initiator, LocalNetwork, NodeConfig, Responder, Topology};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = NodeConfig::from_toml_str(include_str!("config/node.toml")).context("node config")?;
    if let Some(backend) = std::env::args().nth(1) {
        config.backend = backend.parse().context("backend argument")?;
    }
    let virtual_topology = Topology::from_toml_str(include_str!("config/virtual.toml")).context("virtual topology")?;
    let classical_topology =
        Topology::from_toml_str(include_str!("config/classical.toml")).context("classical topology")?;
    info!(backend = %config.backend, "Starting register merge demo");

    let network = LocalNetwork::new();
    let mut virtual_nodes = Vec::new();
    for (name, endpoint) in virtual_topology.iter() {
        virtual_nodes.push(network.spawn_virtual_node(name, endpoint, &config).await?);
    }

    let (alice, bob) = tokio::join!(
        node::run("Alice", &virtual_topology, &classical_topology, &network, &config, Initiator::new("Bob")),
        node::run("Bob", &virtual_topology, &classical_topology, &network, &config, Responder::new()),
    );
    alice.context("Alice")?;
    let verdict = bob.context("Bob")?;
    info!(verdict = ?verdict, "Demo finished");

    for server in virtual_nodes {
        server.shutdown().await?;
    }
    Ok(())
}
