//! End-to-end bootstrap of networks against the in-memory runtime and
//! platform.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fleet_orchestrator::domain::flag_keys;
use fleet_orchestrator::test_utils::{
    fake_deps, test_config, FakePlatform, FakeRuntime, PlatformCall, RuntimeEvent,
};
use fleet_orchestrator::{
    bootstrap_new_network, restart_network, stop_network, BootstrapPhase, Chain, ContextError,
    Network, NetworkController, OpContext, OrchestratorConfig, OrchestratorError, Subnet,
};
use shared_crypto::PrivateKey;
use shared_types::{NodeId, VmId};
use tempfile::TempDir;
use tokio::time::Instant;

const EXEC_PATH: &str = "/fake/node";

struct Harness {
    tmp: TempDir,
    runtime: Arc<FakeRuntime>,
    platform: FakePlatform,
}

impl Harness {
    fn new() -> Self {
        Self {
            tmp: tempfile::tempdir().unwrap(),
            runtime: Arc::new(FakeRuntime::new()),
            platform: FakePlatform::new(),
        }
    }

    fn config(&self) -> OrchestratorConfig {
        test_config(self.tmp.path())
    }

    fn register_primaries(&self, network: &Network) {
        for node in &network.nodes {
            self.platform
                .register_primary(node.node_id, 2_000, 1_900_000_000);
        }
    }

    async fn bootstrap(
        &self,
        ctx: &OpContext,
        config: OrchestratorConfig,
        network: Network,
    ) -> Result<NetworkController, OrchestratorError> {
        bootstrap_new_network(
            ctx,
            config,
            network,
            Path::new(EXEC_PATH),
            None,
            fake_deps(&self.runtime, &self.platform),
        )
        .await
    }
}

fn ids(network: &Network) -> Vec<NodeId> {
    network.nodes.iter().map(|node| node.node_id).collect()
}

fn subnet(name: &str, validators: &[NodeId]) -> Subnet {
    Subnet::new(name, validators.to_vec()).with_chain(Chain::new(VmId::from_name(name), b"{}".to_vec()))
}

fn ctx() -> OpContext {
    OpContext::with_timeout(Duration::from_secs(60))
}

#[tokio::test]
async fn test_network_without_subnets_starts_every_node() {
    let harness = Harness::new();
    let network = Network::new_default("ci", 2);
    let ids = ids(&network);

    let controller = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await
        .unwrap();

    assert_eq!(controller.phase(), BootstrapPhase::AllStarted);
    assert_eq!(controller.node_uris().len(), 2);
    for id in &ids {
        assert_eq!(harness.runtime.starts_of(id).len(), 1);
        assert!(harness.runtime.health_queries(id) >= 1);
    }
    assert!(harness.platform.calls().is_empty());
}

#[tokio::test]
async fn test_subnet_bootstrap_uses_single_node_without_sybil_protection() {
    let harness = Harness::new();
    let mut network = Network::new_default("ci", 5);
    let ids = ids(&network);
    harness.register_primaries(&network);
    network.subnets.push(subnet("xsvm", &ids[..3]));

    let controller = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await
        .unwrap();
    assert_eq!(controller.phase(), BootstrapPhase::AllStarted);

    // Node 0 ran alone without sybil protection, then was restarted with it.
    let bootstrap_starts = harness.runtime.starts_of(&ids[0]);
    assert_eq!(bootstrap_starts.len(), 2);
    assert!(!bootstrap_starts[0]
        .get_bool(flag_keys::SYBIL_PROTECTION_ENABLED, true)
        .unwrap());
    assert!(!bootstrap_starts[1].contains_key(flag_keys::SYBIL_PROTECTION_ENABLED));
    assert!(!controller.network().nodes[0]
        .flags
        .contains_key(flag_keys::SYBIL_PROTECTION_ENABLED));

    let created = controller.get_subnet("xsvm").unwrap();
    assert!(created.is_created());
    assert!(created.chains[0].is_created());
    assert_eq!(
        bootstrap_starts[1]
            .get_string(flag_keys::TRACK_SUBNETS)
            .unwrap(),
        Some(created.subnet_id.to_string())
    );

    // The remaining nodes start once, after node 0 is back.
    let started: Vec<NodeId> = harness
        .runtime
        .events()
        .into_iter()
        .filter_map(|event| match event {
            RuntimeEvent::Started { node_id, .. } => Some(node_id),
            _ => None,
        })
        .collect();
    assert_eq!(started[..2], [ids[0], ids[0]]);
    assert_eq!(started[2..], ids[1..]);
    for id in &ids[1..] {
        let flags = &harness.runtime.starts_of(id)[0];
        assert!(!flags.contains_key(flag_keys::SYBIL_PROTECTION_ENABLED));
        let bootstrap_ids = flags.get_string(flag_keys::BOOTSTRAP_IDS).unwrap().unwrap();
        assert!(bootstrap_ids.contains(&ids[0].to_string()));
    }
    for id in &ids {
        assert!(harness.runtime.health_queries(id) >= 1, "{id} never checked");
    }

    // Every platform call went through node 0.
    let calls = harness.platform.calls();
    let connects: Vec<&PlatformCall> = calls
        .iter()
        .filter(|call| matches!(call, PlatformCall::Connect { .. }))
        .collect();
    assert_eq!(connects.len(), 1);
    let PlatformCall::Connect { uri } = connects[0] else {
        unreachable!()
    };
    assert_eq!(uri.as_str(), "http://127.0.0.1:9650");
    let added: Vec<NodeId> = calls
        .iter()
        .filter_map(|call| match call {
            PlatformCall::AddSubnetValidator { node_id, .. } => Some(*node_id),
            _ => None,
        })
        .collect();
    assert_eq!(added, ids[..3]);
    assert_eq!(
        calls
            .iter()
            .filter(|call| matches!(call, PlatformCall::CreateChain { .. }))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_single_node_with_subnet_is_fully_restarted() {
    let harness = Harness::new();
    let mut network = Network::new_default("ci", 1);
    let ids = ids(&network);
    harness.register_primaries(&network);
    network.subnets.push(subnet("xsvm", &ids));

    let controller = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await
        .unwrap();

    assert_eq!(controller.phase(), BootstrapPhase::AllStarted);
    let starts = harness.runtime.starts_of(&ids[0]);
    assert_eq!(starts.len(), 2);
    // A lone staker needs sybil protection off to reach liveness.
    for flags in &starts {
        assert!(!flags
            .get_bool(flag_keys::SYBIL_PROTECTION_ENABLED, true)
            .unwrap());
    }
    // Waited for health before and after the restart.
    assert_eq!(harness.runtime.health_queries(&ids[0]), 2);
}

#[tokio::test]
async fn test_exhausted_key_pool_fails_without_issuing_a_call() {
    let harness = Harness::new();
    let config = OrchestratorConfig {
        pre_funded_key_count: 1,
        ..harness.config()
    };
    let mut network = Network::new_default("ci", 1);
    let ids = ids(&network);
    harness.register_primaries(&network);
    network.subnets.push(subnet("first", &ids));
    network.subnets.push(subnet("second", &ids));

    let err = harness.bootstrap(&ctx(), config, network).await.unwrap_err();

    assert!(
        matches!(&err, OrchestratorError::KeyPoolExhausted { subnet } if subnet == "second"),
        "{err}"
    );
    assert_eq!(harness.platform.subnet_owners().len(), 1);
    // Cleanup stopped the bootstrap node.
    assert!(!harness.runtime.is_running(&ids[0]));
}

#[tokio::test]
async fn test_subnet_owners_come_from_the_end_of_the_pool() {
    let harness = Harness::new();
    let mut network = Network::new_default("ci", 1);
    let ids = ids(&network);
    harness.register_primaries(&network);
    let pool: Vec<PrivateKey> = (0..4).map(|_| PrivateKey::generate()).collect();
    network.pre_funded_keys = pool.clone();
    for name in ["a", "b", "c"] {
        network.subnets.push(subnet(name, &ids));
    }

    let controller = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await
        .unwrap();

    assert_eq!(controller.network().pre_funded_keys, pool[..1]);
    assert_eq!(
        harness.platform.subnet_owners(),
        vec![pool[3].address(), pool[2].address(), pool[1].address()]
    );
    for (name, key) in [("a", &pool[3]), ("b", &pool[2]), ("c", &pool[1])] {
        let subnet = controller.get_subnet(name).unwrap();
        assert_eq!(subnet.owning_key.as_ref(), Some(key));
    }
}

#[tokio::test]
async fn test_created_subnets_are_not_created_again() {
    let harness = Harness::new();
    let mut network = Network::new_default("ci", 2);
    let ids = ids(&network);
    harness.register_primaries(&network);
    network.subnets.push(subnet("xsvm", &ids));

    let mut controller = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await
        .unwrap();
    let calls = harness.platform.calls().len();
    let starts = harness.runtime.events().len();

    let uri = controller.node_uris()[0].uri.clone();
    controller.create_subnets(&ctx(), &uri, true).await.unwrap();

    assert_eq!(harness.platform.calls().len(), calls);
    assert_eq!(harness.runtime.events().len(), starts);
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_node_fails_bootstrap_at_the_deadline() {
    let harness = Harness::new();
    let network = Network::new_default("ci", 1);
    let stuck = network.nodes[0].node_id;
    harness.runtime.never_healthy(stuck);

    let ctx = OpContext::with_timeout(Duration::from_secs(10));
    let started = Instant::now();
    let err = harness
        .bootstrap(&ctx, harness.config(), network)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    match err {
        OrchestratorError::HealthTimeout { unhealthy, source } => {
            assert_eq!(unhealthy, vec![stuck]);
            assert_eq!(source, ContextError::DeadlineExceeded);
        }
        other => panic!("expected health timeout, got {other}"),
    }
    assert!(elapsed >= Duration::from_secs(10), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(10_200), "{elapsed:?}");
    assert!(!harness.runtime.is_running(&stuck));
}

#[tokio::test]
async fn test_failed_bootstrap_stops_started_nodes() {
    let harness = Harness::new();
    let network = Network::new_default("ci", 3);
    let ids = ids(&network);
    harness.runtime.fail_start(ids[2]);

    let err = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::NodeStart { node_id, .. } if node_id == ids[2]));
    for id in &ids {
        assert!(!harness.runtime.is_running(id));
    }
    // Configuration stays behind for inspection.
    let network_dirs: Vec<_> = std::fs::read_dir(harness.tmp.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(network_dirs.len(), 1);
    assert!(network_dirs[0].join("network.json").is_file());
}

#[tokio::test]
async fn test_failed_cleanup_is_reported_with_the_cause() {
    let harness = Harness::new();
    let network = Network::new_default("ci", 2);
    let ids = ids(&network);
    harness.runtime.fail_start(ids[1]);
    harness.runtime.fail_stop(ids[0]);

    let err = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await
        .unwrap_err();

    let OrchestratorError::BootstrapFailed { source, cleanup } = err else {
        panic!("expected bootstrap failure with cleanup error");
    };
    assert!(matches!(*source, OrchestratorError::NodeStart { node_id, .. } if node_id == ids[1]));
    assert!(matches!(*cleanup, OrchestratorError::StopFailed(ref errors) if errors.len() == 1));
}

#[tokio::test]
async fn test_network_can_be_stopped_and_restarted_from_disk() -> anyhow::Result<()> {
    let harness = Harness::new();
    let network = Network::new_default("ci", 2);
    let ids = ids(&network);

    let controller = harness
        .bootstrap(&ctx(), harness.config(), network)
        .await?;
    let dir = controller
        .network()
        .dir
        .clone()
        .ok_or_else(|| anyhow::anyhow!("bootstrapped network has no directory"))?;
    drop(controller);

    stop_network(
        &ctx(),
        &dir,
        harness.config(),
        fake_deps(&harness.runtime, &harness.platform),
    )
    .await?;
    assert!(ids.iter().all(|id| !harness.runtime.is_running(id)));

    let restarted = restart_network(
        &ctx(),
        &dir,
        harness.config(),
        fake_deps(&harness.runtime, &harness.platform),
    )
    .await?;
    assert!(ids.iter().all(|id| harness.runtime.is_running(id)));
    assert_eq!(restarted.node_uris().len(), 2);

    // The second node bootstraps from the first, which is running again.
    let flags = harness
        .runtime
        .starts_of(&ids[1])
        .pop()
        .ok_or_else(|| anyhow::anyhow!("second node never started"))?;
    assert_eq!(
        flags.get_string(flag_keys::BOOTSTRAP_IDS)?,
        Some(ids[0].to_string())
    );
    Ok(())
}
