// tests/merge_tests.rs

use qmesh::broker::Envelope;
use qmesh::{
    Backend, BellState, Broker, BrokerClient, BrokerServer, Endpoint, ErrorKind, Gate, LocalNetwork, MergeProtocol,
    MergeStep, MeshError, NodeConfig, TwoQubitGate, Verdict, Verifier, VirtualRegister,
};
use std::time::Duration;
use tokio::sync::mpsc;

const BACKENDS: [Backend; 3] = [Backend::DensityMatrix, Backend::AmplitudeVector, Backend::StabilizerTableau];

// Helper: one virtual node named Bob and a client for it
async fn bob(config: &NodeConfig) -> Result<(BrokerServer, BrokerClient), MeshError> {
    let network = LocalNetwork::new();
    let endpoint = Endpoint::new("localhost", 8802);
    let server = network.spawn_virtual_node("Bob", &endpoint, config).await?;
    let client = network.connect("Bob", &endpoint, config).await?;
    Ok((server, client))
}

#[tokio::test]
async fn test_merge_passes_on_every_backend() -> Result<(), MeshError> {
    for backend in BACKENDS {
        let config = NodeConfig::for_backend(backend);
        let (_server, client) = bob(&config).await?;

        // The peer's half sits in a register group of its own
        let group = client.new_register().await?;
        let peer_half = client.allocate(Some(group)).await?;

        let outcome = MergeProtocol::new(&client).run(peer_half.qubit.index).await?;
        assert_eq!(outcome.peer_half, peer_half);
        assert_eq!(outcome.joint.backend(), backend);
        let verdict = Verdict::judge(Ok(outcome), &Verifier::new(backend));
        assert_eq!(verdict, Verdict::Pass, "{}", backend);
        assert_eq!(verdict.report_line("Alice", "Bob"), "Testing register merge: Alice to Bob............ok");
    }
    Ok(())
}

#[tokio::test]
async fn test_readout_order_is_preserved() -> Result<(), MeshError> {
    let config = NodeConfig::for_backend(Backend::AmplitudeVector);
    let (_server, client) = bob(&config).await?;
    let peer_half = client.allocate(None).await?;
    let fresh = client.allocate(None).await?;

    // Both in |1⟩: H then CNOT yields Ψ−, which changes sign under exchange
    client.apply_gate(&peer_half, Gate::X).await?;
    client.apply_gate(&fresh, Gate::X).await?;
    client.apply_gate(&peer_half, Gate::H).await?;
    client.apply_two_qubit_gate(&peer_half, &fresh, TwoQubitGate::Cnot).await?;

    let verifier = Verifier::for_bell(Backend::AmplitudeVector, BellState::PsiMinus);
    let in_order = client.read_joint_state(&[peer_half.clone(), fresh.clone()]).await?;
    let swapped = client.read_joint_state(&[fresh, peer_half]).await?;
    assert!(verifier.verify(&in_order)?);
    assert!(!verifier.verify(&swapped)?);
    Ok(())
}

#[tokio::test]
async fn test_failed_step_aborts_without_verifying() -> Result<(), MeshError> {
    let config = NodeConfig::default();
    let (_server, client) = bob(&config).await?;

    let failure = MergeProtocol::new(&client).run(99).await.unwrap_err();
    assert_eq!(failure.step, MergeStep::GetReference);
    assert_eq!(failure.error.kind(), ErrorKind::InvalidIndex);
    // Nothing was allocated
    assert_eq!(client.register_size().await?, 0);

    let verdict = Verdict::judge(Err(failure), &Verifier::new(config.backend));
    assert!(matches!(verdict, Verdict::Aborted { step: MergeStep::GetReference, .. }));
    assert!(verdict.report_line("Alice", "Bob").ends_with("fail"));
    Ok(())
}

#[tokio::test]
async fn test_merge_aborts_at_cnot_without_implicit_merging() -> Result<(), MeshError> {
    let config = NodeConfig { merge_implicitly: false, ..NodeConfig::for_backend(Backend::StabilizerTableau) };
    let (_server, client) = bob(&config).await?;
    let group = client.new_register().await?;
    let peer_half = client.allocate(Some(group)).await?;

    let failure = MergeProtocol::new(&client).run(peer_half.qubit.index).await.unwrap_err();
    assert_eq!(failure.step, MergeStep::Cnot);
    assert_eq!(failure.error.kind(), ErrorKind::CrossRegisterUnsupported);
    // No rollback: the fresh qubit and the Hadamard stay
    assert_eq!(client.register_size().await?, 2);
    Ok(())
}

#[tokio::test]
async fn test_one_virtual_node_serves_sequential_merges() -> Result<(), MeshError> {
    for backend in BACKENDS {
        let config = NodeConfig::for_backend(backend);
        let (_server, client) = bob(&config).await?;
        let verifier = Verifier::new(backend);

        for round in 1..=3 {
            let group = client.new_register().await?;
            let peer_half = client.allocate(Some(group)).await?;
            let merge = MergeProtocol::new(&client).run(peer_half.qubit.index).await;
            assert_eq!(Verdict::judge(merge, &verifier), Verdict::Pass, "{} round {}", backend, round);
            assert_eq!(client.register_size().await?, 2 * round);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrent_merges_on_one_client_queue() -> Result<(), MeshError> {
    for backend in BACKENDS {
        let config = NodeConfig::for_backend(backend);
        let (_server, client) = bob(&config).await?;
        let first = client.allocate(None).await?;
        let second = client.new_register().await?;
        let second = client.allocate(Some(second)).await?;

        let protocol = MergeProtocol::new(&client);
        let (a, b) = tokio::join!(protocol.run(first.qubit.index), protocol.run(second.qubit.index));
        // Whichever runs second reads its pair out of a group that also holds the first pair
        let verifier = Verifier::new(backend);
        assert!(verifier.verify(&a?.joint)?, "{}", backend);
        assert!(verifier.verify(&b?.joint)?, "{}", backend);
        assert_eq!(client.register_size().await?, 4);
    }
    Ok(())
}

#[tokio::test]
async fn test_readout_of_half_an_entangled_pair_depends_on_backend() -> Result<(), MeshError> {
    for backend in BACKENDS {
        let (_server, client) = bob(&NodeConfig::for_backend(backend)).await?;
        let waiting = client.allocate(None).await?;
        let outcome = MergeProtocol::new(&client).run(waiting.qubit.index).await?;

        let half = client.read_joint_state(&[outcome.fresh.clone()]).await;
        match backend {
            Backend::DensityMatrix => assert_eq!(half?.density_matrix()?.len(), 2),
            _ => assert_eq!(half.unwrap_err().kind(), ErrorKind::InvalidOperation, "{}", backend),
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_measure_over_the_wire() -> Result<(), MeshError> {
    let (_server, client) = bob(&NodeConfig::for_backend(Backend::StabilizerTableau)).await?;
    let zero = client.allocate(None).await?;
    let one = client.allocate(None).await?;
    client.apply_gate(&one, Gate::X).await?;
    assert_eq!(client.measure(&zero).await?, 0);
    assert_eq!(client.measure(&one).await?, 1);
    let err = client.apply_gate(&one, Gate::X).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StaleReference);
    Ok(())
}

#[tokio::test]
async fn test_unbound_broker_is_not_ready_until_bound() -> Result<(), MeshError> {
    let config = NodeConfig::default();
    let (server, calls) = BrokerServer::spawn(Broker::new("Bob", &config));
    let client = BrokerClient::new("Bob", calls, config.rpc_timeout());

    assert_eq!(client.test().await.unwrap_err().kind(), ErrorKind::NotReady);
    assert_eq!(client.allocate(None).await.unwrap_err().kind(), ErrorKind::NotReady);

    let mut register = VirtualRegister::new(config.backend);
    let root = register.new_group();
    server.bind(register, root).await?;
    assert_eq!(client.test().await?, "Tested!");
    assert_eq!(client.register_size().await?, 0);

    let broker = server.shutdown().await?;
    assert!(broker.is_bound());
    Ok(())
}

#[tokio::test]
async fn test_unanswered_call_times_out() {
    let (calls, _held) = mpsc::channel::<Envelope>(1);
    let client = BrokerClient::new("Bob", calls, Duration::from_millis(50));
    let err = client.test().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn test_closed_channel_is_disconnected() {
    let (calls, held) = mpsc::channel::<Envelope>(1);
    drop(held);
    let client = BrokerClient::new("Bob", calls, Duration::from_millis(50));
    assert_eq!(client.register_size().await.unwrap_err().kind(), ErrorKind::Disconnected);
}

#[tokio::test]
async fn test_reference_from_another_node_is_stale() -> Result<(), MeshError> {
    let config = NodeConfig::default();
    let network = LocalNetwork::new();
    let alice_at = Endpoint::new("localhost", 8801);
    let bob_at = Endpoint::new("localhost", 8802);
    let _alice_node = network.spawn_virtual_node("Alice", &alice_at, &config).await?;
    let _bob_node = network.spawn_virtual_node("Bob", &bob_at, &config).await?;
    let alice = network.connect("Alice", &alice_at, &config).await?;
    let bob = network.connect("Bob", &bob_at, &config).await?;

    let on_alice = alice.allocate(None).await?;
    assert_eq!(bob.apply_gate(&on_alice, Gate::H).await.unwrap_err().kind(), ErrorKind::StaleReference);
    Ok(())
}
