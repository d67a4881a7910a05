// tests/node_tests.rs

use qmesh::node::{self, Session};
use qmesh::{
    Backend, BrokerServer, Endpoint, ErrorKind, Initiator, LocalNetwork, MeshError, NodeConfig, NodeProgram,
    Responder, Topology, Verdict,
};

const VIRTUAL: &str = r#"
[nodes.Alice]
host = "localhost"
port = 8801

[nodes.Bob]
host = "localhost"
port = 8802
"#;

const CLASSICAL: &str = r#"
[nodes.Bob]
host = "localhost"
port = 8812
"#;

fn topologies() -> Result<(Topology, Topology), MeshError> {
    Ok((Topology::from_toml_str(VIRTUAL)?, Topology::from_toml_str(CLASSICAL)?))
}

async fn spawn_virtual_nodes(
    network: &LocalNetwork,
    topology: &Topology,
    config: &NodeConfig,
) -> Result<Vec<BrokerServer>, MeshError> {
    let mut servers = Vec::new();
    for (name, endpoint) in topology.iter() {
        servers.push(network.spawn_virtual_node(name, endpoint, config).await?);
    }
    Ok(servers)
}

#[tokio::test]
async fn test_initiator_and_responder_pass_on_every_backend() -> Result<(), MeshError> {
    for backend in ["qutip", "projectq", "stabilizer"] {
        let config = NodeConfig::from_toml_str(&format!("backend = \"{}\"\nseed = 3", backend))?;
        let (virtual_topology, classical_topology) = topologies()?;
        let network = LocalNetwork::new();
        let _virtual_nodes = spawn_virtual_nodes(&network, &virtual_topology, &config).await?;

        let (alice, bob) = tokio::join!(
            node::run("Alice", &virtual_topology, &classical_topology, &network, &config, Initiator::new("Bob")),
            node::run("Bob", &virtual_topology, &classical_topology, &network, &config, Responder::new()),
        );
        assert_eq!(alice?, None);
        assert_eq!(bob?, Some(Verdict::Pass), "{}", backend);
    }
    Ok(())
}

#[tokio::test]
async fn test_unknown_node_fails_topology_lookup() -> Result<(), MeshError> {
    let (virtual_topology, classical_topology) = topologies()?;
    let network = LocalNetwork::new();
    let err = node::run(
        "Charlie",
        &virtual_topology,
        &classical_topology,
        &network,
        &NodeConfig::default(),
        Responder::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err, MeshError::TopologyLookupFailed { node: "Charlie".to_string(), table: "virtual".to_string() });
    Ok(())
}

#[tokio::test]
async fn test_initiator_needs_a_classical_peer() -> Result<(), MeshError> {
    let config = NodeConfig::default();
    let (virtual_topology, _) = topologies()?;
    let network = LocalNetwork::new();
    let _virtual_nodes = spawn_virtual_nodes(&network, &virtual_topology, &config).await?;

    let err = node::run("Alice", &virtual_topology, &Topology::new(), &network, &config, Initiator::new("Bob"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TopologyLookupFailed);
    Ok(())
}

#[tokio::test]
async fn test_responder_without_notification_times_out() -> Result<(), MeshError> {
    let config = NodeConfig { connect_timeout_ms: 100, ..NodeConfig::default() };
    let (virtual_topology, classical_topology) = topologies()?;
    let network = LocalNetwork::new();
    let _virtual_nodes = spawn_virtual_nodes(&network, &virtual_topology, &config).await?;

    let err = node::run("Bob", &virtual_topology, &classical_topology, &network, &config, Responder::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    Ok(())
}

#[tokio::test]
async fn test_missing_virtual_node_times_out_on_connect() -> Result<(), MeshError> {
    let config = NodeConfig { connect_timeout_ms: 100, ..NodeConfig::default() };
    let (virtual_topology, classical_topology) = topologies()?;
    let err = node::run("Alice", &virtual_topology, &classical_topology, &LocalNetwork::new(), &config, Initiator::new("Bob"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MeshError::Timeout { node: "Alice".to_string(), operation: "connect".to_string(), millis: 100 }
    );
    Ok(())
}

// Places a qubit like the Initiator, then checks that Bob's classical server
// answers for Bob's virtual register before notifying
struct PlaceAndInspect;

#[async_trait::async_trait]
impl NodeProgram for PlaceAndInspect {
    async fn on_ready(self, session: Session) -> Result<Option<Verdict>, MeshError> {
        let bob_virtual = session.virtual_peer("Bob").await?;
        let register = bob_virtual.new_register().await?;
        let placed = bob_virtual.allocate(Some(register)).await?;

        let bob_classical = session.classical_peer("Bob").await?;
        assert_eq!(bob_classical.register_size().await?, 1);
        assert_eq!(bob_classical.get_reference(placed.qubit.index).await?, placed);
        bob_classical.notify(&session.node, placed.qubit.index).await?;
        Ok(None)
    }
}

#[tokio::test]
async fn test_classical_server_fronts_its_nodes_virtual_register() -> Result<(), MeshError> {
    let config = NodeConfig::for_backend(Backend::StabilizerTableau);
    let (virtual_topology, classical_topology) = topologies()?;
    let network = LocalNetwork::new();
    let _virtual_nodes = spawn_virtual_nodes(&network, &virtual_topology, &config).await?;

    let (alice, bob) = tokio::join!(
        node::run("Alice", &virtual_topology, &classical_topology, &network, &config, PlaceAndInspect),
        node::run("Bob", &virtual_topology, &classical_topology, &network, &config, Responder::new()),
    );
    assert_eq!(alice?, None);
    assert_eq!(bob?, Some(Verdict::Pass));
    Ok(())
}

// A program that only checks its session and reports nothing
struct SessionCheck;

#[async_trait::async_trait]
impl NodeProgram for SessionCheck {
    async fn on_ready(self, session: Session) -> Result<Option<Verdict>, MeshError> {
        assert_eq!(session.node, "Bob");
        assert!(session.triggers.is_some(), "Bob is a classical server");
        assert_eq!(session.own_virtual.test().await?, "Tested!");
        Ok(None)
    }
}

#[tokio::test]
async fn test_classical_server_is_served_only_while_the_program_runs() -> Result<(), MeshError> {
    let config = NodeConfig { connect_timeout_ms: 100, ..NodeConfig::for_backend(Backend::AmplitudeVector) };
    let (virtual_topology, classical_topology) = topologies()?;
    let network = LocalNetwork::new();
    let _virtual_nodes = spawn_virtual_nodes(&network, &virtual_topology, &config).await?;

    let verdict = node::run("Bob", &virtual_topology, &classical_topology, &network, &config, SessionCheck).await?;
    assert_eq!(verdict, None);

    let bob_classical = Endpoint::new("localhost", 8812);
    let err = network.connect("Bob", &bob_classical, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    Ok(())
}
