//! Cluster members.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_crypto::{CryptoError, StakingKey};
use shared_types::encoding::{from_base64, to_base64};
use shared_types::{FlagError, FlagsMap, NodeId};

use super::flag_keys;
use super::{NodeRuntimeConfig, OrchestratorError, RuntimeHandle};

/// One member of a network.
///
/// `node_id` is derived from the staking key held in the node's flags and is
/// stable once assigned. `handle` is only present while the node runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub node_id: NodeId,

    #[serde(default)]
    pub flags: FlagsMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_config: Option<NodeRuntimeConfig>,

    /// Created ad hoc and excluded from bootstrap bookkeeping
    #[serde(default)]
    pub is_ephemeral: bool,

    /// Labels copied from the owning network
    #[serde(default)]
    pub network_uuid: String,
    #[serde(default)]
    pub network_owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<RuntimeHandle>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(flags: FlagsMap) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    /// Node created outside the steady-state roster.
    pub fn new_ephemeral(flags: FlagsMap) -> Self {
        Self {
            flags,
            is_ephemeral: true,
            ..Self::default()
        }
    }

    /// `count` nodes with fresh staking keys.
    pub fn new_nodes(count: usize) -> Vec<Node> {
        (0..count)
            .map(|_| {
                let mut node = Node::new();
                node.set_staking_key(&StakingKey::generate());
                node
            })
            .collect()
    }

    /// Ensure a staking key is present and derive the node id from it.
    pub fn ensure_keys(&mut self) -> Result<(), OrchestratorError> {
        match self.staking_key()? {
            Some(key) => self.node_id = key.node_id(),
            None => self.set_staking_key(&StakingKey::generate()),
        }
        Ok(())
    }

    /// The staking key stored in the flags, if any.
    pub fn staking_key(&self) -> Result<Option<StakingKey>, OrchestratorError> {
        let Some(content) = self.flags.get_string(flag_keys::STAKING_KEY_CONTENT)? else {
            return Ok(None);
        };
        let seed = from_base64(&content).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        Ok(Some(StakingKey::from_seed(&seed)?))
    }

    fn set_staking_key(&mut self, key: &StakingKey) {
        self.flags.insert(
            flag_keys::STAKING_KEY_CONTENT,
            to_base64(key.seed().as_slice()),
        );
        self.node_id = key.node_id();
    }

    pub fn data_dir(&self) -> Result<Option<PathBuf>, FlagError> {
        Ok(self.flags.get_string(flag_keys::DATA_DIR)?.map(PathBuf::from))
    }

    pub fn uri(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.uri.as_str())
    }

    pub fn staking_address(&self) -> Option<SocketAddr> {
        self.handle.as_ref().map(|h| h.staking_address)
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Pin the ports of the running node so a restart reuses them.
    pub fn save_api_port(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        let api_port = handle.api_port();
        let staking_port = handle.staking_address.port();
        if let Some(port) = api_port {
            self.flags.insert(flag_keys::HTTP_PORT, Value::from(port));
        }
        self.flags.insert(flag_keys::STAKING_PORT, Value::from(staking_port));
    }
}

/// Network-level settings every node picks up before it is written or started.
#[derive(Debug, Clone, Default)]
pub struct NodeDefaults {
    pub network_uuid: String,
    pub network_owner: String,
    pub network_dir: Option<PathBuf>,
    pub runtime_config: Option<NodeRuntimeConfig>,
}

impl NodeDefaults {
    /// Ensure `node` has what it needs to start.
    ///
    /// The data dir defaults to `<network dir>/<node id>` once the network
    /// has a directory.
    pub fn apply(&self, node: &mut Node) -> Result<(), OrchestratorError> {
        node.network_uuid.clone_from(&self.network_uuid);
        node.network_owner.clone_from(&self.network_owner);

        node.ensure_keys()?;

        if let Some(dir) = &self.network_dir {
            if node.data_dir()?.is_none() {
                let data_dir = node_dir(dir, &node.node_id);
                node.flags
                    .insert(flag_keys::DATA_DIR, data_dir.to_string_lossy().into_owned());
            }
        }

        if node.runtime_config.is_none() {
            node.runtime_config.clone_from(&self.runtime_config);
        }
        Ok(())
    }
}

/// Directory holding a node's documents.
pub fn node_dir(network_dir: &Path, node_id: &NodeId) -> PathBuf {
    network_dir.join(node_id.to_string())
}

/// Where to reach a running node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUri {
    pub node_id: NodeId,
    pub uri: String,
}
