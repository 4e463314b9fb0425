//! The network aggregate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use shared_crypto::{new_private_keys, PrivateKey};
use shared_types::encoding::to_base64;
use shared_types::{FlagError, FlagsMap, NodeId, SubnetId};

use super::node::NodeDefaults;
use super::{flag_keys, Genesis, Node, NodeRuntimeConfig, NodeUri, OrchestratorError, Subnet};
use crate::config::OrchestratorConfig;

/// A temporary network: configuration shared by its nodes, the node roster
/// and its subnets.
///
/// The effective network id comes from `genesis` when it declares a
/// non-zero id, otherwise from `network_id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Network {
    /// Correlation id, distinct from the ledger's network id
    pub uuid: String,

    /// Who started or maintains the network
    pub owner: String,

    /// Canonical absolute directory, set once the network is created
    pub dir: Option<PathBuf>,

    pub network_id: u32,
    pub genesis: Option<Genesis>,

    pub primary_subnet_config: Option<FlagsMap>,

    /// Primary chain alias to chain configuration
    pub primary_chain_configs: BTreeMap<String, FlagsMap>,

    /// Flags applied to every node of this network
    pub default_flags: FlagsMap,
    pub default_runtime_config: Option<NodeRuntimeConfig>,

    /// Keys funded in genesis, consumed last-to-first
    pub pre_funded_keys: Vec<PrivateKey>,

    pub nodes: Vec<Node>,
    pub subnets: Vec<Subnet>,
}

#[derive(Serialize)]
struct ChainConfigEntry {
    #[serde(rename = "Config")]
    config: String,
}

impl Network {
    /// A network of `node_count` fresh nodes.
    pub fn new_default(owner: impl Into<String>, node_count: usize) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            nodes: Node::new_nodes(node_count),
            ..Self::default()
        }
    }

    /// Fill in everything a new network needs before it can be created.
    ///
    /// Idempotent. Caller-supplied values are never overwritten.
    pub fn ensure_default_config(
        &mut self,
        config: &OrchestratorConfig,
        exec_path: Option<&Path>,
        plugin_dir: Option<&Path>,
    ) -> Result<(), OrchestratorError> {
        if self.uuid.is_empty() {
            self.uuid = uuid::Uuid::new_v4().to_string();
        }

        // An unset plugin dir leaves the node on its own default.
        if let Some(plugin_dir) = plugin_dir.filter(|p| !p.as_os_str().is_empty()) {
            self.default_flags
                .set_default(flag_keys::PLUGIN_DIR, plugin_dir.to_string_lossy().into_owned());
        }

        if self.genesis.is_none() && self.pre_funded_keys.is_empty() {
            self.pre_funded_keys = new_private_keys(config.pre_funded_key_count);
        }

        for (alias, chain_config) in &config.default_chain_configs {
            self.primary_chain_configs
                .entry(alias.clone())
                .or_default()
                .set_defaults(chain_config);
        }

        if let Some(exec_path) = exec_path {
            match &mut self.default_runtime_config {
                Some(runtime) => runtime.ensure_exec_path(exec_path),
                None => {
                    self.default_runtime_config = Some(NodeRuntimeConfig::process(exec_path));
                }
            }
        }

        let defaults = self.node_defaults();
        for node in &mut self.nodes {
            defaults.apply(node)?;
        }
        Ok(())
    }

    pub fn node_defaults(&self) -> NodeDefaults {
        NodeDefaults {
            network_uuid: self.uuid.clone(),
            network_owner: self.owner.clone(),
            network_dir: self.dir.clone(),
            runtime_config: self.default_runtime_config.clone(),
        }
    }

    /// Effective network id.
    pub fn network_id(&self) -> u32 {
        match &self.genesis {
            Some(genesis) if genesis.network_id > 0 => genesis.network_id,
            _ => self.network_id,
        }
    }

    /// Genesis for a network that declares neither genesis nor network id.
    ///
    /// Funds the well-known test key ahead of the pre-funded pool. Tests
    /// using that key share its balance with every other user of it.
    pub fn default_genesis(&self, config: &OrchestratorConfig) -> Result<Genesis, OrchestratorError> {
        let mut keys = vec![PrivateKey::well_known()?];
        keys.extend(self.pre_funded_keys.iter().cloned());
        Genesis::for_test(
            config.default_network_id,
            &self.nodes,
            &keys,
            config.validator_weight,
        )
    }

    pub fn plugin_dir(&self) -> Result<Option<PathBuf>, FlagError> {
        Ok(self
            .default_flags
            .get_string(flag_keys::PLUGIN_DIR)?
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from))
    }

    pub fn get_node(&self, node_id: &NodeId) -> Result<&Node, OrchestratorError> {
        self.nodes
            .iter()
            .find(|node| &node.node_id == node_id)
            .ok_or(OrchestratorError::UnknownNode { node_id: *node_id })
    }

    pub(crate) fn node_index(&self, node_id: &NodeId) -> Result<usize, OrchestratorError> {
        self.nodes
            .iter()
            .position(|node| &node.node_id == node_id)
            .ok_or(OrchestratorError::UnknownNode { node_id: *node_id })
    }

    pub fn get_subnet(&self, name: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|subnet| subnet.name == name)
    }

    /// URIs of the running roster nodes.
    pub fn node_uris(&self) -> Vec<NodeUri> {
        self.nodes
            .iter()
            .filter_map(|node| {
                node.uri().map(|uri| NodeUri {
                    node_id: node.node_id,
                    uri: uri.to_string(),
                })
            })
            .collect()
    }

    /// Comma-joined ids of the created subnets `node_id` validates.
    pub fn tracked_subnets_for_node(&self, node_id: &NodeId) -> String {
        self.subnets
            .iter()
            .filter(|subnet| subnet.is_created() && subnet.is_validator(node_id))
            .map(|subnet| subnet.subnet_id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether a lone node must run without sybil protection to reach liveness.
    pub fn is_single_node_network(&self) -> bool {
        self.nodes.len() == 1
            && self
                .genesis
                .as_ref()
                .is_some_and(|genesis| genesis.initial_stakers.len() == 1)
    }

    /// Base64 JSON of the genesis, or `None` without one.
    pub fn genesis_file_content(&self) -> Result<Option<String>, OrchestratorError> {
        self.genesis
            .as_ref()
            .map(|genesis| Ok(to_base64(serde_json::to_vec(genesis)?)))
            .transpose()
    }

    /// Base64 JSON map of subnet id to subnet configuration. Empty when no
    /// subnet has configuration.
    pub fn subnet_config_content(&self) -> Result<String, OrchestratorError> {
        let mut configs: BTreeMap<String, &FlagsMap> = BTreeMap::new();
        if let Some(primary) = &self.primary_subnet_config {
            configs.insert(SubnetId::PRIMARY_NETWORK.to_string(), primary);
        }
        // Uncreated subnets have no id to key configuration by.
        for subnet in self.subnets.iter().filter(|s| s.is_created()) {
            if let Some(config) = &subnet.config {
                configs.insert(subnet.subnet_id.to_string(), config);
            }
        }
        if configs.is_empty() {
            return Ok(String::new());
        }
        Ok(to_base64(serde_json::to_vec(&configs)?))
    }

    /// Base64 JSON map of chain alias or id to base64 chain configuration.
    pub fn chain_config_content(&self) -> Result<String, OrchestratorError> {
        let mut configs: BTreeMap<String, ChainConfigEntry> = BTreeMap::new();
        for (alias, flags) in &self.primary_chain_configs {
            configs.insert(
                alias.clone(),
                ChainConfigEntry {
                    config: to_base64(serde_json::to_vec(flags)?),
                },
            );
        }
        for chain in self.subnets.iter().flat_map(|s| &s.chains) {
            if !chain.is_created() {
                continue;
            }
            configs.insert(
                chain.chain_id.to_string(),
                ChainConfigEntry {
                    config: to_base64(chain.config.as_bytes()),
                },
            );
        }
        if configs.is_empty() {
            return Ok(String::new());
        }
        Ok(to_base64(serde_json::to_vec(&configs)?))
    }
}
