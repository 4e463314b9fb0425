//! Network creation, bootstrap and node lifecycle.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use fleet_telemetry::{log_node_event, network_span};
use shared_types::{FlagsMap, NodeId};
use tracing::{error, info, warn, Instrument};

use crate::config::OrchestratorConfig;
use crate::context::OpContext;
use crate::domain::{
    flag_keys, BootstrapPhase, Network, Node, OrchestratorError, RuntimeError, RuntimeHandle,
};
use crate::ports::NodeLaunch;
use crate::service::compat::{check_vm_binaries, CompatReport};
use crate::service::core::{ControllerDeps, NetworkController};
use crate::service::flags::FlagComposer;

fn create_dir(path: &Path) -> Result<(), OrchestratorError> {
    fs::create_dir_all(path).map_err(|source| OrchestratorError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

impl NetworkController {
    /// Create the network directory and write the initial configuration.
    ///
    /// `root_dir` defaults to the configured root. Networks without a
    /// genesis or network id get a generated genesis staking every node.
    pub fn create(&mut self, root_dir: Option<&Path>) -> Result<(), OrchestratorError> {
        let root_dir = root_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.root_dir.clone());
        create_dir(&root_dir)?;

        // Time-ordered names keep network dirs sorted by creation.
        let mut dir_name = chrono::Local::now().format("%Y%m%d-%H%M%S%.6f").to_string();
        if !self.network.owner.is_empty() {
            dir_name = format!("{dir_name}-{}", self.network.owner);
        }
        let network_dir = root_dir.join(dir_name);
        create_dir(&network_dir)?;
        let canonical = network_dir
            .canonicalize()
            .map_err(|source| OrchestratorError::CreateDir {
                path: network_dir.clone(),
                source,
            })?;
        self.network.dir = Some(canonical);

        if let Some(plugin_dir) = self.network.plugin_dir()? {
            create_dir(&plugin_dir)?;
        }

        if self.network.network_id == 0 && self.network.genesis.is_none() {
            self.network.genesis = Some(self.network.default_genesis(&self.config)?);
        }

        let defaults = self.network.node_defaults();
        for node in &mut self.network.nodes {
            defaults.apply(node)?;
        }

        self.write()?;
        self.advance(BootstrapPhase::Created);
        Ok(())
    }

    /// Start the network for the first time.
    ///
    /// With subnets declared, node 0 is started alone (with sybil protection
    /// off when it has peers to come), used to create the subnets and their
    /// chains, then restarted before the remaining nodes join.
    pub async fn bootstrap(&mut self, ctx: &OpContext) -> Result<(), OrchestratorError> {
        let all: Vec<NodeId> = self.network.nodes.iter().map(|n| n.node_id).collect();
        let Some(&bootstrap_id) = all.first() else {
            return Err(OrchestratorError::InsufficientNodes);
        };

        if self.network.subnets.is_empty() {
            self.start_nodes(ctx, &all).await?;
            self.advance(BootstrapPhase::AllStarted);
            return Ok(());
        }

        let mut re_enable_sybil_protection = false;
        if all.len() > 1 {
            info!("starting a single-node network with sybil protection disabled for quicker subnet creation");
            let bootstrap_node = &mut self.network.nodes[0];
            re_enable_sybil_protection = bootstrap_node
                .flags
                .get_bool(flag_keys::SYBIL_PROTECTION_ENABLED, true)?;
            bootstrap_node
                .flags
                .insert(flag_keys::SYBIL_PROTECTION_ENABLED, false);
        }

        self.start_nodes(ctx, &[bootstrap_id]).await?;
        self.advance(BootstrapPhase::SingleNodeUp);

        let uri = self
            .network
            .get_node(&bootstrap_id)?
            .uri()
            .ok_or(OrchestratorError::NodeNotRunning {
                node_id: bootstrap_id,
            })?
            .to_string();
        // The bootstrap node is restarted below regardless.
        self.create_subnets(ctx, &uri, false).await?;

        if re_enable_sybil_protection {
            log_node_event!(info, "re-enabling sybil protection", bootstrap_id);
            self.network.nodes[0]
                .flags
                .remove(flag_keys::SYBIL_PROTECTION_ENABLED);
        }

        log_node_event!(info, "restarting bootstrap node", bootstrap_id);
        if all.len() == 1 {
            self.restart_node(ctx, &bootstrap_id).await?;
            self.advance(BootstrapPhase::Restarted);
        } else {
            // Cannot report healthy until its peers exist.
            self.restart_bootstrap_node(ctx, &bootstrap_id).await?;
            self.advance(BootstrapPhase::Restarted);

            info!("starting remaining nodes");
            self.start_nodes(ctx, &all[1..]).await?;
        }
        self.advance(BootstrapPhase::AllStarted);
        Ok(())
    }

    /// Start `node_ids` in order, then wait for them to report healthy.
    ///
    /// When the bootstrap node is not in the batch the whole roster is
    /// awaited.
    pub async fn start_nodes(
        &mut self,
        ctx: &OpContext,
        node_ids: &[NodeId],
    ) -> Result<(), OrchestratorError> {
        if node_ids.is_empty() {
            return Err(OrchestratorError::InsufficientNodes);
        }
        let includes_bootstrap_node = self
            .network
            .nodes
            .first()
            .is_some_and(|node| node_ids.contains(&node.node_id));
        let wait_for: Vec<NodeId> = if includes_bootstrap_node {
            info!(
                network_dir = ?self.network.dir,
                network_uuid = %self.network.uuid,
                "starting network"
            );
            node_ids.to_vec()
        } else {
            self.network.nodes.iter().map(|n| n.node_id).collect()
        };

        for node_id in node_ids {
            self.start_node(ctx, node_id).await?;
        }

        info!(count = wait_for.len(), "waiting for nodes to report healthy");
        self.wait_for_healthy(ctx, &wait_for).await?;
        info!(
            network_dir = ?self.network.dir,
            network_uuid = %self.network.uuid,
            "started network"
        );
        Ok(())
    }

    /// Configure and start one roster node without waiting for health.
    pub async fn start_node(
        &mut self,
        ctx: &OpContext,
        node_id: &NodeId,
    ) -> Result<(), OrchestratorError> {
        let index = self.network.node_index(node_id)?;
        let mut node = self.network.nodes[index].clone();
        let result = self.launch(ctx, &mut node).await;
        self.network.nodes[index] = node;
        result
    }

    /// Stop, reconfigure and start a roster node, then wait for it to be
    /// healthy.
    pub async fn restart_node(
        &mut self,
        ctx: &OpContext,
        node_id: &NodeId,
    ) -> Result<(), OrchestratorError> {
        let index = self.network.node_index(node_id)?;
        let node = &mut self.network.nodes[index];
        if node
            .runtime_config
            .as_ref()
            .is_some_and(|runtime| runtime.reuse_dynamic_ports())
        {
            node.save_api_port();
        }

        self.stop_node(ctx, index).await?;
        self.start_node(ctx, node_id).await?;
        log_node_event!(info, "waiting for node to report healthy", node_id);
        self.wait_for_healthy(ctx, &[*node_id]).await
    }

    /// Stop and start the bootstrap node without waiting for health.
    pub async fn restart_bootstrap_node(
        &mut self,
        ctx: &OpContext,
        node_id: &NodeId,
    ) -> Result<(), OrchestratorError> {
        let index = self.network.node_index(node_id)?;
        self.stop_node(ctx, index).await?;
        self.start_node(ctx, node_id).await
    }

    /// Restart every roster node in order.
    pub async fn restart(&mut self, ctx: &OpContext) -> Result<(), OrchestratorError> {
        info!(network_uuid = %self.network.uuid, "restarting network");
        let roster: Vec<NodeId> = self
            .network
            .nodes
            .iter()
            .filter(|node| !node.is_ephemeral)
            .map(|node| node.node_id)
            .collect();
        for node_id in &roster {
            self.restart_node(ctx, node_id).await?;
        }
        Ok(())
    }

    /// Stop every node recorded on disk, ephemeral nodes included.
    ///
    /// All nodes are signalled before any is awaited. Every failure is
    /// collected.
    pub async fn stop(&mut self, ctx: &OpContext) -> Result<(), OrchestratorError> {
        let store = self.store()?;
        let mut nodes = store.read_nodes(true)?;
        let mut errors = Vec::new();
        let mut failed = BTreeSet::new();

        let running: Vec<(NodeId, RuntimeHandle)> = nodes
            .iter()
            .filter_map(|node| node.handle.clone().map(|handle| (node.node_id, handle)))
            .collect();

        for (node_id, handle) in &running {
            if let Err(source) = self.deps.runtime.initiate_stop(handle).await {
                failed.insert(*node_id);
                errors.push(OrchestratorError::NodeStop {
                    node_id: *node_id,
                    source,
                });
            }
        }
        for (node_id, handle) in &running {
            if failed.contains(node_id) {
                continue;
            }
            if let Err(source) = self.deps.runtime.wait_for_stopped(ctx, handle).await {
                failed.insert(*node_id);
                errors.push(OrchestratorError::NodeStop {
                    node_id: *node_id,
                    source,
                });
            }
        }

        for node in nodes.iter_mut().filter(|n| n.is_running()) {
            if failed.contains(&node.node_id) {
                continue;
            }
            node.handle = None;
            if let Err(e) = store.write_node(node) {
                errors.push(e.into());
            }
            if let Ok(index) = self.network.node_index(&node.node_id) {
                self.network.nodes[index].handle = None;
            }
            log_node_event!(info, "stopped node", node.node_id);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OrchestratorError::StopFailed(errors))
        }
    }

    /// Start a node outside the roster and record it on disk.
    pub async fn add_ephemeral_node(
        &mut self,
        ctx: &OpContext,
        flags: FlagsMap,
    ) -> Result<Node, OrchestratorError> {
        let mut node = Node::new_ephemeral(flags);
        self.launch(ctx, &mut node).await?;
        Ok(node)
    }

    /// Point `latest_<owner>` under the root dir at this network.
    #[cfg(unix)]
    pub fn link_reusable_network(&self) -> Result<PathBuf, OrchestratorError> {
        let dir = self
            .network
            .dir
            .as_ref()
            .ok_or(OrchestratorError::NotCreated)?;
        let link = self
            .config
            .reusable_network_path_for_owner(&self.network.owner);
        let io_err = |source| OrchestratorError::CreateDir {
            path: link.clone(),
            source,
        };
        match fs::symlink_metadata(&link) {
            Ok(_) => fs::remove_file(&link).map_err(io_err)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }
        std::os::unix::fs::symlink(dir, &link).map_err(io_err)?;
        info!(link = %link.display(), target = %dir.display(), "linked reusable network");
        Ok(link)
    }

    /// Compare VM binaries of the network's subnets with `exec_path`.
    pub async fn check_vm_binaries(
        &self,
        exec_path: &Path,
    ) -> Result<CompatReport, OrchestratorError> {
        let plugin_dir = self.network.plugin_dir()?;
        Ok(check_vm_binaries(
            self.deps.version_probe.as_ref(),
            &self.network.subnets,
            exec_path,
            plugin_dir.as_deref(),
        )
        .await)
    }

    /// Configure, write and start `node`. Nothing is left running on error.
    pub(crate) async fn launch(
        &self,
        ctx: &OpContext,
        node: &mut Node,
    ) -> Result<(), OrchestratorError> {
        let store = self.store()?;
        self.network.node_defaults().apply(node)?;
        store.write_node(node)?;

        let node_id = node.node_id;
        let runtime_config = node.runtime_config.clone().ok_or_else(|| {
            OrchestratorError::NodeStart {
                node_id,
                source: RuntimeError::UnsupportedConfig {
                    runtime: self.deps.runtime.name(),
                    found: "unset",
                },
            }
        })?;

        if let Some(exec_path) = runtime_config.exec_path() {
            let report = self.check_vm_binaries(exec_path).await?;
            if !report.is_compatible() {
                error!(
                    node_id = %node_id,
                    mismatches = report.mismatches.len(),
                    "starting node with incompatible VM binaries"
                );
            }
        }

        let peers = store.read_nodes(false)?;
        let flags = FlagComposer::new(&self.network, &self.config.default_flags)
            .compose(node, &peers)?;
        let flags_path = store.write_flags(&node_id, &flags)?;

        let launch = NodeLaunch {
            node_id,
            data_dir: node.data_dir()?.unwrap_or_else(|| store.node_dir(&node_id)),
            flags_path,
            runtime_config,
            network_uuid: node.network_uuid.clone(),
            network_owner: node.network_owner.clone(),
            is_ephemeral: node.is_ephemeral,
        };

        let handle = self
            .deps
            .runtime
            .start(ctx, &launch)
            .await
            .map_err(|source| OrchestratorError::NodeStart { node_id, source });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                node.handle = None;
                // Best effort; the start error is what the caller needs.
                if let Err(write_err) = store.write_node(node) {
                    warn!(node_id = %node_id, error = %write_err, "failed to record failed start");
                }
                return Err(e);
            }
        };

        log_node_event!(info, "started node", node_id, uri = %handle.uri);
        node.handle = Some(handle.clone());
        if let Err(e) = store.write_node(node) {
            // Unrecorded nodes could not be stopped later.
            return Err(self.compensate(ctx, node, &handle, e.into()).await);
        }
        Ok(())
    }

    /// Stop a node whose start could not be completed.
    async fn compensate(
        &self,
        ctx: &OpContext,
        node: &mut Node,
        handle: &RuntimeHandle,
        cause: OrchestratorError,
    ) -> OrchestratorError {
        node.handle = None;
        match self.deps.runtime.stop(ctx, handle).await {
            Ok(()) => cause,
            Err(source) => OrchestratorError::StartFailed {
                node_id: node.node_id,
                source: Box::new(cause),
                cleanup: Box::new(OrchestratorError::NodeStop {
                    node_id: node.node_id,
                    source,
                }),
            },
        }
    }

    /// Stop a roster node and record that it is no longer running.
    pub(crate) async fn stop_node(
        &mut self,
        ctx: &OpContext,
        index: usize,
    ) -> Result<(), OrchestratorError> {
        let node_id = self.network.nodes[index].node_id;
        let Some(handle) = self.network.nodes[index].handle.clone() else {
            return Ok(());
        };
        self.deps
            .runtime
            .stop(ctx, &handle)
            .await
            .map_err(|source| OrchestratorError::NodeStop { node_id, source })?;
        self.network.nodes[index].handle = None;
        self.store()?.write_node(&self.network.nodes[index])?;
        log_node_event!(info, "stopped node", node_id);
        Ok(())
    }

    pub(crate) async fn wait_for_healthy(
        &self,
        ctx: &OpContext,
        node_ids: &[NodeId],
    ) -> Result<(), OrchestratorError> {
        let nodes = node_ids
            .iter()
            .map(|node_id| {
                let node = self.network.get_node(node_id)?;
                let handle = node
                    .handle
                    .clone()
                    .ok_or(OrchestratorError::NodeNotRunning { node_id: *node_id })?;
                Ok((*node_id, handle))
            })
            .collect::<Result<Vec<_>, OrchestratorError>>()?;
        self.health_monitor().wait_for_healthy(ctx, nodes).await
    }
}

/// Configure, create and bootstrap a new network.
///
/// On bootstrap failure every started node is stopped; the on-disk state is
/// kept for inspection.
pub async fn bootstrap_new_network(
    ctx: &OpContext,
    config: OrchestratorConfig,
    network: Network,
    exec_path: &Path,
    plugin_dir: Option<&Path>,
    deps: ControllerDeps,
) -> Result<NetworkController, OrchestratorError> {
    if network.nodes.is_empty() {
        return Err(OrchestratorError::InsufficientNodes);
    }
    let span = network_span!("bootstrap_new_network", owner = %network.owner);
    async move {
        let mut controller = NetworkController::new(network, config, deps);

        let report = check_vm_binaries(
            controller.deps.version_probe.as_ref(),
            &controller.network.subnets,
            exec_path,
            plugin_dir,
        )
        .await;
        if !report.is_compatible() {
            error!(
                mismatches = report.mismatches.len(),
                "the plugin protocol version of one or more VMs may not be compatible with the node binary"
            );
        }

        controller.ensure_default_config(Some(exec_path), plugin_dir)?;
        controller.create(None)?;

        if let Err(source) = controller.bootstrap(ctx).await {
            error!(error = %source, "bootstrap failed, stopping started nodes");
            // The operation deadline may be what failed the bootstrap.
            let cleanup_ctx = OpContext::with_timeout(controller.config.stop_timeout);
            return Err(match controller.stop(&cleanup_ctx).await {
                Ok(()) => source,
                Err(cleanup) => OrchestratorError::BootstrapFailed {
                    source: Box::new(source),
                    cleanup: Box::new(cleanup),
                },
            });
        }
        Ok(controller)
    }
    .instrument(span)
    .await
}

/// Stop the nodes of the network in `dir`.
pub async fn stop_network(
    ctx: &OpContext,
    dir: &Path,
    config: OrchestratorConfig,
    deps: ControllerDeps,
) -> Result<(), OrchestratorError> {
    NetworkController::read(dir, config, deps)?.stop(ctx).await
}

/// Restart the nodes of the network in `dir`.
pub async fn restart_network(
    ctx: &OpContext,
    dir: &Path,
    config: OrchestratorConfig,
    deps: ControllerDeps,
) -> Result<NetworkController, OrchestratorError> {
    let mut controller = NetworkController::read(dir, config, deps)?;
    controller.restart(ctx).await?;
    Ok(controller)
}
