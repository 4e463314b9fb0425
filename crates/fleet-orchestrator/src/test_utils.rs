//! In-memory fakes of the outbound ports for deterministic testing.
//!
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleet_orchestrator::test_utils::{fake_deps, test_config, FakePlatform, FakeRuntime};
//!
//! let runtime = Arc::new(FakeRuntime::new());
//! let platform = FakePlatform::new();
//! let config = test_config(tmp.path());
//! let controller = bootstrap_new_network(
//!     &ctx, config, network, "/fake/node".as_ref(), None, fake_deps(&runtime, &platform),
//! ).await?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_crypto::{Address, PrivateKey};
use shared_types::{ChainId, FlagsMap, NodeId, SubnetId, TxId};

use crate::config::OrchestratorConfig;
use crate::context::OpContext;
use crate::domain::{BackendRef, RpcError, RuntimeError, RuntimeHandle, VersionError};
use crate::ports::{
    CreateChainRequest, HealthProbe, NodeLaunch, NodeRuntime, PlatformClient, PlatformConnector,
    SubnetValidatorRequest, ValidatorInfo, VersionProbe,
};
use crate::service::ControllerDeps;

/// Configuration rooted at `root_dir` with a small key pool.
pub fn test_config(root_dir: &Path) -> OrchestratorConfig {
    OrchestratorConfig {
        root_dir: root_dir.to_path_buf(),
        health_check_interval: Duration::from_millis(200),
        polling_interval: Duration::from_millis(100),
        network_timeout: Duration::from_secs(30),
        pre_funded_key_count: 4,
        ..OrchestratorConfig::default()
    }
}

/// Controller dependencies backed by fakes.
pub fn fake_deps(runtime: &Arc<FakeRuntime>, platform: &FakePlatform) -> ControllerDeps {
    ControllerDeps {
        runtime: Arc::clone(runtime) as Arc<dyn NodeRuntime>,
        connector: Arc::new(platform.clone()),
        version_probe: Arc::new(FakeVersionProbe::new()),
    }
}

// =============================================================================
// HEALTH PROBE
// =============================================================================

/// Health probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticHealthProbe(pub bool);

#[async_trait]
impl HealthProbe for StaticHealthProbe {
    async fn check(&self, _uri: &str) -> Result<bool, RuntimeError> {
        Ok(self.0)
    }
}

// =============================================================================
// NODE RUNTIME
// =============================================================================

/// What a `FakeRuntime` was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// Carries the flag file the node was started with.
    Started { node_id: NodeId, flags: FlagsMap },
    StopInitiated { node_id: NodeId },
    Stopped { node_id: NodeId },
}

#[derive(Debug, Clone, Copy)]
enum HealthPlan {
    /// Healthy from the given query onwards (1-based)
    After(usize),
    Never,
    Fail,
}

#[derive(Default)]
struct RuntimeState {
    next_port: u16,
    next_pid: u32,
    by_pid: HashMap<u32, NodeId>,
    running: HashMap<NodeId, RuntimeHandle>,
    health: HashMap<NodeId, HealthPlan>,
    health_queries: HashMap<NodeId, usize>,
    fail_start: Vec<NodeId>,
    fail_stop: Vec<NodeId>,
    events: Vec<RuntimeEvent>,
}

impl RuntimeState {
    fn allocate(&mut self, node_id: NodeId) -> RuntimeHandle {
        let port = self.next_port;
        self.next_port += 2;
        let pid = self.next_pid;
        self.next_pid += 1;

        let handle = RuntimeHandle {
            uri: format!("http://127.0.0.1:{port}"),
            staking_address: ([127, 0, 0, 1], port + 1).into(),
            backend: BackendRef::Process { pid },
        };
        self.by_pid.insert(pid, node_id);
        self.running.insert(node_id, handle.clone());
        handle
    }
}

/// Node runtime that starts nothing.
///
/// Nodes are healthy on their first query unless configured otherwise.
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RuntimeState {
                next_port: 9650,
                next_pid: 1000,
                ..RuntimeState::default()
            }),
        }
    }

    /// Handle of `node_id` as if it had been started.
    pub fn attach(&self, node_id: NodeId) -> RuntimeHandle {
        self.state.lock().allocate(node_id)
    }

    /// Report `node_id` healthy from its `query`th health query onwards.
    pub fn healthy_after(&self, node_id: NodeId, query: usize) {
        self.state.lock().health.insert(node_id, HealthPlan::After(query));
    }

    pub fn never_healthy(&self, node_id: NodeId) {
        self.state.lock().health.insert(node_id, HealthPlan::Never);
    }

    /// Fail every health query of `node_id`.
    pub fn fail_health(&self, node_id: NodeId) {
        self.state.lock().health.insert(node_id, HealthPlan::Fail);
    }

    pub fn fail_start(&self, node_id: NodeId) {
        self.state.lock().fail_start.push(node_id);
    }

    pub fn fail_stop(&self, node_id: NodeId) {
        self.state.lock().fail_stop.push(node_id);
    }

    pub fn health_queries(&self, node_id: &NodeId) -> usize {
        self.state
            .lock()
            .health_queries
            .get(node_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn events(&self) -> Vec<RuntimeEvent> {
        self.state.lock().events.clone()
    }

    /// Flag files of every start of `node_id`, oldest first.
    pub fn starts_of(&self, node_id: &NodeId) -> Vec<FlagsMap> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                RuntimeEvent::Started { node_id: id, flags } if id == node_id => {
                    Some(flags.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn is_running(&self, node_id: &NodeId) -> bool {
        self.state.lock().running.contains_key(node_id)
    }

    pub fn handle_for(&self, node_id: &NodeId) -> Option<RuntimeHandle> {
        self.state.lock().running.get(node_id).cloned()
    }

    fn node_for(&self, handle: &RuntimeHandle) -> Result<NodeId, RuntimeError> {
        let BackendRef::Process { pid } = handle.backend else {
            return Err(RuntimeError::UnsupportedConfig {
                runtime: "fake",
                found: "container",
            });
        };
        self.state
            .lock()
            .by_pid
            .get(&pid)
            .copied()
            .ok_or(RuntimeError::NotRunning)
    }
}

#[async_trait]
impl NodeRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn start(
        &self,
        _ctx: &OpContext,
        launch: &NodeLaunch,
    ) -> Result<RuntimeHandle, RuntimeError> {
        let content = std::fs::read(&launch.flags_path).map_err(|source| RuntimeError::Io {
            path: launch.flags_path.clone(),
            source,
        })?;
        let flags: FlagsMap =
            serde_json::from_slice(&content).map_err(|e| RuntimeError::InvalidProcessContext {
                path: launch.flags_path.clone(),
                reason: e.to_string(),
            })?;

        let mut state = self.state.lock();
        if state.fail_start.contains(&launch.node_id) {
            return Err(RuntimeError::ProcessExited {
                status: "exit status: 1".into(),
            });
        }

        let handle = state.allocate(launch.node_id);
        state.events.push(RuntimeEvent::Started {
            node_id: launch.node_id,
            flags,
        });
        Ok(handle)
    }

    async fn initiate_stop(&self, handle: &RuntimeHandle) -> Result<(), RuntimeError> {
        let node_id = self.node_for(handle)?;
        let mut state = self.state.lock();
        if state.fail_stop.contains(&node_id) {
            return Err(RuntimeError::Signal {
                pid: 0,
                reason: "operation not permitted".into(),
            });
        }
        state.events.push(RuntimeEvent::StopInitiated { node_id });
        Ok(())
    }

    async fn wait_for_stopped(
        &self,
        _ctx: &OpContext,
        handle: &RuntimeHandle,
    ) -> Result<(), RuntimeError> {
        let node_id = self.node_for(handle)?;
        let mut state = self.state.lock();
        state.running.remove(&node_id);
        state.events.push(RuntimeEvent::Stopped { node_id });
        Ok(())
    }

    async fn is_healthy(&self, handle: &RuntimeHandle) -> Result<bool, RuntimeError> {
        let node_id = self.node_for(handle)?;
        let mut state = self.state.lock();
        let queries = state.health_queries.entry(node_id).or_insert(0);
        *queries += 1;
        let queries = *queries;
        match state.health.get(&node_id).copied().unwrap_or(HealthPlan::After(1)) {
            HealthPlan::After(n) => Ok(queries >= n),
            HealthPlan::Never => Ok(false),
            HealthPlan::Fail => Err(RuntimeError::HealthTransport("connection reset".into())),
        }
    }
}

// =============================================================================
// PLATFORM
// =============================================================================

/// A platform call observed by `FakePlatform`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Connect {
        uri: String,
    },
    CreateSubnet {
        owner: Address,
    },
    AddSubnetValidator {
        subnet_id: SubnetId,
        node_id: NodeId,
        weight: u64,
        end_time: u64,
    },
    CreateChain {
        subnet_id: SubnetId,
        chain_name: String,
    },
    CurrentValidators {
        subnet_id: SubnetId,
    },
}

struct PendingValidator {
    node_id: NodeId,
    weight: u64,
    end_time: u64,
    /// Visible from this query of the subnet's validators onwards
    active_from: usize,
}

#[derive(Default)]
struct PlatformState {
    next_id: u64,
    primary: Vec<ValidatorInfo>,
    subnet_validators: HashMap<SubnetId, Vec<PendingValidator>>,
    validator_queries: HashMap<SubnetId, usize>,
    activation_delay: usize,
    fail_validator_queries: bool,
    calls: Vec<PlatformCall>,
}

impl PlatformState {
    fn next_bytes(&mut self) -> [u8; 32] {
        self.next_id += 1;
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&self.next_id.to_be_bytes());
        bytes
    }
}

/// Platform chain that accepts every transaction.
///
/// Subnet validators become active on the first validator query after
/// they are added, plus any configured activation delay.
#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node_id` a primary network validator.
    pub fn register_primary(&self, node_id: NodeId, weight: u64, end_time: u64) {
        self.state.lock().primary.push(ValidatorInfo {
            node_id,
            weight,
            end_time,
        });
    }

    /// Make `node_id` an active validator of `subnet_id` from its `query`th
    /// validator query onwards.
    pub fn activate_after(&self, subnet_id: SubnetId, node_id: NodeId, query: usize) {
        self.state
            .lock()
            .subnet_validators
            .entry(subnet_id)
            .or_default()
            .push(PendingValidator {
                node_id,
                weight: 1,
                end_time: 0,
                active_from: query,
            });
    }

    /// Queries added validators must wait out before they become active.
    pub fn set_activation_delay(&self, queries: usize) {
        self.state.lock().activation_delay = queries;
    }

    pub fn fail_validator_queries(&self) {
        self.state.lock().fail_validator_queries = true;
    }

    pub fn validator_queries(&self, subnet_id: SubnetId) -> usize {
        self.state
            .lock()
            .validator_queries
            .get(&subnet_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    /// Owners of every subnet creation, in order.
    pub fn subnet_owners(&self) -> Vec<Address> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::CreateSubnet { owner } => Some(*owner),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl PlatformConnector for FakePlatform {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn PlatformClient>, RpcError> {
        self.state.lock().calls.push(PlatformCall::Connect {
            uri: uri.to_string(),
        });
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn create_subnet(&self, owner: &PrivateKey) -> Result<SubnetId, RpcError> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::CreateSubnet {
            owner: owner.address(),
        });
        Ok(SubnetId::new(state.next_bytes()))
    }

    async fn add_subnet_validator(
        &self,
        _owner: &PrivateKey,
        request: &SubnetValidatorRequest,
    ) -> Result<TxId, RpcError> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::AddSubnetValidator {
            subnet_id: request.subnet_id,
            node_id: request.node_id,
            weight: request.weight,
            end_time: request.end_time,
        });
        let active_from = state
            .validator_queries
            .get(&request.subnet_id)
            .copied()
            .unwrap_or(0)
            + 1
            + state.activation_delay;
        state
            .subnet_validators
            .entry(request.subnet_id)
            .or_default()
            .push(PendingValidator {
                node_id: request.node_id,
                weight: request.weight,
                end_time: request.end_time,
                active_from,
            });
        Ok(TxId::new(state.next_bytes()))
    }

    async fn create_chain(
        &self,
        _owner: &PrivateKey,
        request: &CreateChainRequest,
    ) -> Result<ChainId, RpcError> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::CreateChain {
            subnet_id: request.subnet_id,
            chain_name: request.chain_name.clone(),
        });
        Ok(ChainId::new(state.next_bytes()))
    }

    async fn current_validators(
        &self,
        subnet_id: SubnetId,
    ) -> Result<Vec<ValidatorInfo>, RpcError> {
        let mut state = self.state.lock();
        state.calls.push(PlatformCall::CurrentValidators { subnet_id });
        if state.fail_validator_queries {
            return Err(RpcError::Transport("connection reset".into()));
        }
        if subnet_id == SubnetId::PRIMARY_NETWORK {
            return Ok(state.primary.clone());
        }

        let queries = state.validator_queries.entry(subnet_id).or_insert(0);
        *queries += 1;
        let queries = *queries;
        Ok(state
            .subnet_validators
            .get(&subnet_id)
            .into_iter()
            .flatten()
            .filter(|validator| validator.active_from <= queries)
            .map(|validator| ValidatorInfo {
                node_id: validator.node_id,
                weight: validator.weight,
                end_time: validator.end_time,
            })
            .collect())
    }
}

// =============================================================================
// VERSION PROBE
// =============================================================================

/// Version probe answering from a table of executable paths.
///
/// Unknown paths fail as if the binary printed nothing useful.
#[derive(Default)]
pub struct FakeVersionProbe {
    versions: Mutex<HashMap<PathBuf, u64>>,
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl FakeVersionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_version(&self, exec_path: impl AsRef<Path>, version: u64) {
        self.versions
            .lock()
            .insert(exec_path.as_ref().to_path_buf(), version);
    }

    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VersionProbe for FakeVersionProbe {
    async fn rpc_version(&self, exec_path: &Path, args: &[String]) -> Result<u64, VersionError> {
        self.calls
            .lock()
            .push((exec_path.to_path_buf(), args.to_vec()));
        self.versions
            .lock()
            .get(exec_path)
            .copied()
            .ok_or_else(|| VersionError::Command {
                command: exec_path.to_path_buf(),
                output: String::new(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_added_validators_activate_after_delay() {
        let platform = FakePlatform::new();
        platform.set_activation_delay(1);
        let subnet_id = SubnetId::new([9; 32]);
        let node_id = NodeId::new([1; 20]);
        let owner = PrivateKey::generate();
        let request = SubnetValidatorRequest {
            subnet_id,
            node_id,
            end_time: 10,
            weight: 20,
        };
        platform.add_subnet_validator(&owner, &request).await.unwrap();

        assert!(platform.current_validators(subnet_id).await.unwrap().is_empty());
        let active = platform.current_validators(subnet_id).await.unwrap();
        assert_eq!(
            active,
            vec![ValidatorInfo {
                node_id,
                weight: 20,
                end_time: 10,
            }]
        );
    }

    #[tokio::test]
    async fn test_version_probe_answers_known_paths_only() {
        let probe = FakeVersionProbe::new();
        probe.set_version("/bin/node", 7);
        assert_eq!(probe.rpc_version(Path::new("/bin/node"), &[]).await.unwrap(), 7);
        assert!(probe.rpc_version(Path::new("/bin/vm"), &[]).await.is_err());
        assert_eq!(probe.calls().len(), 2);
    }
}
