use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared_types::NodeId;
use tracing::info;

use crate::adapters::{
    runtime_for, CommandVersionProbe, HttpHealthProbe, JsonRpcPlatformConnector, NetworkStore,
};
use crate::config::OrchestratorConfig;
use crate::domain::{
    BootstrapPhase, Network, Node, NodeRuntimeConfig, NodeUri, OrchestratorError, StoreError,
    Subnet,
};
use crate::ports::{NodeRuntime, PlatformConnector, VersionProbe};
use crate::service::health::HealthMonitor;

/// External collaborators of a controller.
#[derive(Clone)]
pub struct ControllerDeps {
    pub runtime: Arc<dyn NodeRuntime>,
    pub connector: Arc<dyn PlatformConnector>,
    pub version_probe: Arc<dyn VersionProbe>,
}

impl ControllerDeps {
    /// Production collaborators for nodes run with `runtime_config`.
    pub fn for_runtime(
        runtime_config: &NodeRuntimeConfig,
        config: &OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let request_timeout = config.polling_interval.max(std::time::Duration::from_secs(5));
        let health = Arc::new(HttpHealthProbe::new(request_timeout)?);
        let connector = JsonRpcPlatformConnector::new(config.network_timeout).map_err(|source| {
            OrchestratorError::Rpc {
                phase: "platform client setup",
                source,
            }
        })?;
        Ok(Self {
            runtime: runtime_for(runtime_config, config, health),
            connector: Arc::new(connector),
            version_probe: Arc::new(CommandVersionProbe),
        })
    }

    /// Production collaborators running nodes as local processes.
    pub fn for_process_runtime(config: &OrchestratorConfig) -> Result<Self, OrchestratorError> {
        Self::for_runtime(&NodeRuntimeConfig::process(PathBuf::new()), config)
    }
}

/// Drives one network through its lifecycle.
///
/// Owns the network's nodes and subnets; every mutation of their flags or
/// identifiers goes through this type.
///
/// # Example
///
/// ```rust,ignore
/// let mut controller = NetworkController::new(network, config, deps);
/// controller.ensure_default_config(Some(exec_path), None)?;
/// controller.create(None)?;
/// controller.bootstrap(&ctx).await?;
/// ```
pub struct NetworkController {
    pub(crate) network: Network,
    pub(crate) config: OrchestratorConfig,
    pub(crate) deps: ControllerDeps,
    pub(crate) phase: BootstrapPhase,
}

impl fmt::Debug for NetworkController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkController")
            .field("network_uuid", &self.network.uuid)
            .field("dir", &self.network.dir)
            .field("nodes", &self.network.nodes.len())
            .field("subnets", &self.network.subnets.len())
            .field("phase", &self.phase)
            .field("runtime", &self.deps.runtime.name())
            .finish_non_exhaustive()
    }
}

impl NetworkController {
    pub fn new(network: Network, config: OrchestratorConfig, deps: ControllerDeps) -> Self {
        Self {
            network,
            config,
            deps,
            phase: BootstrapPhase::Unconfigured,
        }
    }

    /// Re-attach to a network created earlier, possibly by another process.
    pub fn read(
        dir: &Path,
        config: OrchestratorConfig,
        deps: ControllerDeps,
    ) -> Result<Self, OrchestratorError> {
        let dir = dir.canonicalize().map_err(|source| {
            OrchestratorError::Store(StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })
        })?;
        let network = NetworkStore::new(dir).read_network()?;
        Ok(Self {
            network,
            config,
            deps,
            phase: BootstrapPhase::Created,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Mutable access for declaring nodes and subnets before bootstrap.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    /// Fill in every default a new network needs. Idempotent.
    pub fn ensure_default_config(
        &mut self,
        exec_path: Option<&Path>,
        plugin_dir: Option<&Path>,
    ) -> Result<(), OrchestratorError> {
        info!(
            exec_path = ?exec_path,
            plugin_dir = ?plugin_dir,
            "preparing configuration for new network"
        );
        self.network
            .ensure_default_config(&self.config, exec_path, plugin_dir)?;
        if self.phase < BootstrapPhase::Configured {
            self.advance(BootstrapPhase::Configured);
        }
        Ok(())
    }

    pub fn node_uris(&self) -> Vec<NodeUri> {
        self.network.node_uris()
    }

    pub fn get_node(&self, node_id: &NodeId) -> Result<&Node, OrchestratorError> {
        self.network.get_node(node_id)
    }

    pub fn get_subnet(&self, name: &str) -> Option<&Subnet> {
        self.network.get_subnet(name)
    }

    pub fn network_id(&self) -> u32 {
        self.network.network_id()
    }

    pub fn plugin_dir(&self) -> Result<Option<PathBuf>, OrchestratorError> {
        Ok(self.network.plugin_dir()?)
    }

    pub fn tracked_subnets_for_node(&self, node_id: &NodeId) -> String {
        self.network.tracked_subnets_for_node(node_id)
    }

    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(&self.deps.runtime),
            self.config.health_check_interval,
        )
    }

    pub(crate) fn store(&self) -> Result<NetworkStore, OrchestratorError> {
        self.network
            .dir
            .as_ref()
            .map(NetworkStore::new)
            .ok_or(OrchestratorError::NotCreated)
    }

    pub(crate) fn write(&self) -> Result<(), OrchestratorError> {
        self.store()?.write_network(&self.network)?;
        Ok(())
    }

    pub(crate) fn advance(&mut self, phase: BootstrapPhase) {
        info!(
            network_uuid = %self.network.uuid,
            from = %self.phase,
            to = %phase,
            "network phase transition"
        );
        self.phase = phase;
    }

    /// Record subnet provisioning progress during bootstrap only.
    pub(crate) fn record_provisioning(&mut self, phase: BootstrapPhase) {
        if self.phase.is_provisioning() {
            self.advance(phase);
        }
    }
}
