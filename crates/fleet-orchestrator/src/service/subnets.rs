//! Subnet provisioning through a running node's platform API.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use shared_crypto::PrivateKey;
use shared_types::{NodeId, SubnetId};
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::context::OpContext;
use crate::domain::{flag_keys, BootstrapPhase, OrchestratorError, RpcError, Subnet};
use crate::ports::{CreateChainRequest, PlatformClient, SubnetValidatorRequest};
use crate::service::core::NetworkController;

fn rpc_error(phase: &'static str) -> impl FnOnce(RpcError) -> OrchestratorError {
    move |source| OrchestratorError::Rpc { phase, source }
}

impl NetworkController {
    /// Ensure every declared subnet exists on chain, with its validators and
    /// chains.
    ///
    /// Subnets already created are skipped, so calling this again issues no
    /// platform calls. With `restart_required` false, restarting nodes to
    /// pick up the new configuration is left to the caller.
    pub async fn create_subnets(
        &mut self,
        ctx: &OpContext,
        uri: &str,
        restart_required: bool,
    ) -> Result<(), OrchestratorError> {
        let mut client: Option<Arc<dyn PlatformClient>> = None;
        let mut created: Vec<(usize, PrivateKey)> = Vec::new();

        for index in 0..self.network.subnets.len() {
            let subnet = &self.network.subnets[index];
            if subnet.validator_ids.is_empty() {
                return Err(OrchestratorError::MissingValidators {
                    subnet: subnet.name.clone(),
                });
            }
            if subnet.is_created() {
                continue;
            }
            info!(subnet = %subnet.name, "creating subnet");

            let owner = self.allocate_owning_key(index)?;
            let platform = match &client {
                Some(platform) => Arc::clone(platform),
                None => {
                    let platform = self
                        .deps
                        .connector
                        .connect(uri)
                        .await
                        .map_err(rpc_error("platform connection"))?;
                    client = Some(Arc::clone(&platform));
                    platform
                }
            };

            let subnet_id = platform
                .create_subnet(&owner)
                .await
                .map_err(rpc_error("subnet creation"))?;
            let subnet = &mut self.network.subnets[index];
            subnet.subnet_id = subnet_id;
            info!(subnet = %subnet.name, subnet_id = %subnet_id, "created subnet");

            // Persists the shrunken key pool along with the subnet.
            self.write()?;
            created.push((index, owner));
        }

        let Some(client) = client else {
            return Ok(());
        };
        self.record_provisioning(BootstrapPhase::SubnetsCreated);

        let reconfigured = self.update_tracked_subnets()?;
        if restart_required {
            info!("restarting node(s) to enable them to track the new subnet(s)");
            for node_id in &reconfigured {
                if !self.network.get_node(node_id)?.is_running() {
                    continue;
                }
                self.restart_node(ctx, node_id).await?;
            }
        }

        let primary_validators = client
            .current_validators(SubnetId::PRIMARY_NETWORK)
            .await
            .map_err(rpc_error("primary validator query"))?;
        for (index, owner) in &created {
            let subnet = &self.network.subnets[*index];
            info!(subnet = %subnet.name, "adding validators for subnet");
            for node in self
                .network
                .nodes
                .iter()
                .filter(|node| subnet.is_validator(&node.node_id))
            {
                let primary = primary_validators
                    .iter()
                    .find(|validator| validator.node_id == node.node_id)
                    .ok_or(OrchestratorError::NotPrimaryValidator {
                        node_id: node.node_id,
                    })?;
                let request = SubnetValidatorRequest {
                    subnet_id: subnet.subnet_id,
                    node_id: node.node_id,
                    end_time: primary.end_time,
                    weight: primary.weight,
                };
                client
                    .add_subnet_validator(owner, &request)
                    .await
                    .map_err(rpc_error("subnet validator addition"))?;
                info!(subnet = %subnet.name, node_id = %node.node_id, "added subnet validator");
            }
        }
        self.record_provisioning(BootstrapPhase::ValidatorsAssigned);

        let mut validators_to_restart = BTreeSet::new();
        for (index, owner) in &created {
            wait_for_active_validators(
                ctx,
                client.as_ref(),
                &self.network.subnets[*index],
                self.config.polling_interval,
            )
            .await?;

            // Chains assume a validated subnet.
            self.create_chains(client.as_ref(), *index, owner).await?;
            self.write()?;

            let subnet = &self.network.subnets[*index];
            info!(subnet = %subnet.name, subnet_id = %subnet.subnet_id, "wrote subnet configuration");
            // Validators only read chain configuration on start.
            if subnet.has_chain_config() {
                validators_to_restart.extend(subnet.validator_ids.iter().copied());
            }
        }
        self.record_provisioning(BootstrapPhase::ChainsCreated);

        if !restart_required || validators_to_restart.is_empty() {
            return Ok(());
        }

        info!("restarting node(s) to pick up chain configuration");
        let to_restart: Vec<NodeId> = self
            .network
            .nodes
            .iter()
            .map(|node| node.node_id)
            .filter(|node_id| validators_to_restart.contains(node_id))
            .collect();
        for node_id in &to_restart {
            self.restart_node(ctx, node_id).await?;
        }
        Ok(())
    }

    /// Take the subnet's funding key, drawing from the end of the pool when
    /// it has none yet.
    fn allocate_owning_key(&mut self, index: usize) -> Result<PrivateKey, OrchestratorError> {
        let network = &mut self.network;
        let subnet = &mut network.subnets[index];
        if let Some(key) = &subnet.owning_key {
            return Ok(key.clone());
        }
        let key = network
            .pre_funded_keys
            .pop()
            .ok_or_else(|| OrchestratorError::KeyPoolExhausted {
                subnet: subnet.name.clone(),
            })?;
        subnet.owning_key = Some(key.clone());
        Ok(key)
    }

    /// Set `track-subnets` on every roster node whose tracked subnets
    /// changed, returning those nodes.
    fn update_tracked_subnets(&mut self) -> Result<Vec<NodeId>, OrchestratorError> {
        let mut reconfigured = Vec::new();
        for index in 0..self.network.nodes.len() {
            let node = &self.network.nodes[index];
            let existing = node
                .flags
                .get_string(flag_keys::TRACK_SUBNETS)?
                .unwrap_or_default();
            let tracked = self.network.tracked_subnets_for_node(&node.node_id);
            if existing == tracked {
                continue;
            }
            let node_id = node.node_id;
            self.network.nodes[index]
                .flags
                .insert(flag_keys::TRACK_SUBNETS, tracked);
            reconfigured.push(node_id);
        }
        if !reconfigured.is_empty() {
            self.write()?;
        }
        Ok(reconfigured)
    }

    async fn create_chains(
        &mut self,
        client: &dyn PlatformClient,
        index: usize,
        owner: &PrivateKey,
    ) -> Result<(), OrchestratorError> {
        let subnet = &self.network.subnets[index];
        let pending: Vec<(usize, CreateChainRequest)> = subnet
            .chains
            .iter()
            .enumerate()
            .filter(|(_, chain)| !chain.is_created())
            .map(|(chain_index, chain)| {
                let request = CreateChainRequest {
                    subnet_id: subnet.subnet_id,
                    vm_id: chain.vm_id,
                    chain_name: subnet.name.clone(),
                    genesis: chain.genesis.clone(),
                };
                (chain_index, request)
            })
            .collect();

        for (chain_index, request) in pending {
            info!(subnet = %request.chain_name, vm_id = %request.vm_id, "creating chain");
            let chain_id = client
                .create_chain(owner, &request)
                .await
                .map_err(rpc_error("chain creation"))?;
            self.network.subnets[index].chains[chain_index].chain_id = chain_id;
            info!(subnet = %request.chain_name, chain_id = %chain_id, "created chain");
        }
        Ok(())
    }
}

/// Poll the platform chain until every declared validator of `subnet` is
/// active.
///
/// A partial validator set means the registrations are still propagating
/// and the query is retried every `interval`. Query errors are fatal.
pub async fn wait_for_active_validators(
    ctx: &OpContext,
    client: &dyn PlatformClient,
    subnet: &Subnet,
    interval: Duration,
) -> Result<(), OrchestratorError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    info!(
        subnet = %subnet.name,
        subnet_id = %subnet.subnet_id,
        "waiting for subnet validators to become active"
    );

    loop {
        let active: HashSet<NodeId> = client
            .current_validators(subnet.subnet_id)
            .await
            .map_err(rpc_error("validator activation query"))?
            .into_iter()
            .map(|validator| validator.node_id)
            .collect();
        let missing: Vec<NodeId> = subnet
            .validator_ids
            .iter()
            .filter(|node_id| !active.contains(node_id))
            .copied()
            .collect();

        if missing.is_empty() {
            info!(subnet = %subnet.name, "saw the expected active validators of the subnet");
            return Ok(());
        }

        tokio::select! {
            source = ctx.done() => {
                return Err(OrchestratorError::ValidatorsNotActive {
                    subnet: subnet.name.clone(),
                    missing,
                    source,
                });
            }
            _ = ticker.tick() => {}
        }
    }
}
