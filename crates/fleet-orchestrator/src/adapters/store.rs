//! On-disk mirror of a network.
//!
//! ```text
//! <network dir>/
//!     network.json      network document with the ordered node roster
//!     <NodeID>/
//!         config.json   node document
//!         flags.json    composed flag file
//! ```
//!
//! Every document is written to `<name>.tmp` and renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_crypto::PrivateKey;
use shared_types::{FlagsMap, NodeId};
use tracing::debug;

use crate::domain::{node_dir, Genesis, Network, Node, NodeRuntimeConfig, StoreError, Subnet};

const NETWORK_FILE: &str = "network.json";
const NODE_FILE: &str = "config.json";
const FLAGS_FILE: &str = "flags.json";

/// Everything about a network except its node documents.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkDocument {
    uuid: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    network_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    genesis: Option<Genesis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primary_subnet_config: Option<FlagsMap>,
    #[serde(default)]
    primary_chain_configs: BTreeMap<String, FlagsMap>,
    #[serde(default)]
    default_flags: FlagsMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_runtime_config: Option<NodeRuntimeConfig>,
    #[serde(default)]
    pre_funded_keys: Vec<PrivateKey>,
    #[serde(default)]
    subnets: Vec<Subnet>,
    /// Roster order; node documents live in their own directories
    #[serde(default)]
    nodes: Vec<NodeId>,
}

impl From<&Network> for NetworkDocument {
    fn from(network: &Network) -> Self {
        Self {
            uuid: network.uuid.clone(),
            owner: network.owner.clone(),
            network_id: network.network_id,
            genesis: network.genesis.clone(),
            primary_subnet_config: network.primary_subnet_config.clone(),
            primary_chain_configs: network.primary_chain_configs.clone(),
            default_flags: network.default_flags.clone(),
            default_runtime_config: network.default_runtime_config.clone(),
            pre_funded_keys: network.pre_funded_keys.clone(),
            subnets: network.subnets.clone(),
            nodes: network.nodes.iter().map(|node| node.node_id).collect(),
        }
    }
}

/// Reads and writes one network directory.
#[derive(Debug, Clone)]
pub struct NetworkStore {
    dir: PathBuf,
}

impl NetworkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn node_dir(&self, node_id: &NodeId) -> PathBuf {
        node_dir(&self.dir, node_id)
    }

    pub fn flags_path(&self, node_id: &NodeId) -> PathBuf {
        self.node_dir(node_id).join(FLAGS_FILE)
    }

    /// Write the network document and every roster node.
    pub fn write_network(&self, network: &Network) -> Result<(), StoreError> {
        write_json(&self.dir.join(NETWORK_FILE), &NetworkDocument::from(network))?;
        for node in &network.nodes {
            self.write_node(node)?;
        }
        Ok(())
    }

    /// Rebuild the network, nodes in roster order.
    pub fn read_network(&self) -> Result<Network, StoreError> {
        let doc: NetworkDocument = read_json(&self.dir.join(NETWORK_FILE))?;
        let nodes = doc
            .nodes
            .iter()
            .map(|node_id| {
                let path = self.node_dir(node_id).join(NODE_FILE);
                if !path.exists() {
                    return Err(StoreError::MissingNode {
                        node_id: *node_id,
                        path,
                    });
                }
                read_json(&path)
            })
            .collect::<Result<Vec<Node>, _>>()?;

        Ok(Network {
            uuid: doc.uuid,
            owner: doc.owner,
            dir: Some(self.dir.clone()),
            network_id: doc.network_id,
            genesis: doc.genesis,
            primary_subnet_config: doc.primary_subnet_config,
            primary_chain_configs: doc.primary_chain_configs,
            default_flags: doc.default_flags,
            default_runtime_config: doc.default_runtime_config,
            pre_funded_keys: doc.pre_funded_keys,
            nodes,
            subnets: doc.subnets,
        })
    }

    /// Every node document in the network dir, ephemeral nodes included on
    /// request.
    pub fn read_nodes(&self, include_ephemeral: bool) -> Result<Vec<Node>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut nodes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path().join(NODE_FILE);
            if !path.is_file() {
                continue;
            }
            let node: Node = read_json(&path)?;
            if node.is_ephemeral && !include_ephemeral {
                continue;
            }
            nodes.push(node);
        }
        nodes.sort_by_key(|node| node.node_id);
        Ok(nodes)
    }

    pub fn write_node(&self, node: &Node) -> Result<(), StoreError> {
        write_json(&self.node_dir(&node.node_id).join(NODE_FILE), node)
    }

    /// Write the composed flag file and return its path.
    pub fn write_flags(&self, node_id: &NodeId, flags: &FlagsMap) -> Result<PathBuf, StoreError> {
        let path = self.flags_path(node_id);
        write_json(&path, flags)?;
        Ok(path)
    }

    pub fn read_flags(&self, node_id: &NodeId) -> Result<FlagsMap, StoreError> {
        read_json(&self.flags_path(node_id))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    debug!(path = %path.display(), "wrote document");
    Ok(())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}
