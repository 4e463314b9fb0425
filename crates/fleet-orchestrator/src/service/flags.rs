//! Composition of the flag file written before every node start.
//!
//! Layers, applied with set-if-absent so a value already on the node always
//! survives:
//!
//! 1. network id
//! 2. bootstrap peers (running, non-ephemeral, not the node itself)
//! 3. genesis content, and sybil protection off for a lone single-staker node
//! 4. subnet and chain configuration content, when present
//! 5. network default flags
//! 6. orchestrator default flags

use shared_types::{FlagsMap, NodeId};
use tracing::info;

use crate::domain::{flag_keys, Network, Node, OrchestratorError};

/// Staking addresses and ids of the peers a node should bootstrap from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapPeers {
    pub ips: Vec<String>,
    pub ids: Vec<String>,
}

impl BootstrapPeers {
    /// Running non-ephemeral `candidates` other than `node_id`.
    pub fn for_node(node_id: &NodeId, candidates: &[Node]) -> Self {
        let mut peers = Self::default();
        for candidate in candidates {
            if candidate.is_ephemeral || &candidate.node_id == node_id {
                continue;
            }
            let Some(address) = candidate.staking_address() else {
                continue;
            };
            peers.ips.push(address.to_string());
            peers.ids.push(candidate.node_id.to_string());
        }
        peers
    }
}

/// Builds a node's final flag set from network state.
pub struct FlagComposer<'a> {
    network: &'a Network,
    orchestrator_defaults: &'a FlagsMap,
}

impl<'a> FlagComposer<'a> {
    pub fn new(network: &'a Network, orchestrator_defaults: &'a FlagsMap) -> Self {
        Self {
            network,
            orchestrator_defaults,
        }
    }

    /// Compose the flags for `node`, taking bootstrap peers from `peers`.
    pub fn compose(&self, node: &Node, peers: &[Node]) -> Result<FlagsMap, OrchestratorError> {
        let network = self.network;
        let mut flags = node.flags.clone();

        // A string survives JSON round-trips unchanged.
        flags.set_default(flag_keys::NETWORK_ID, network.network_id().to_string());

        let bootstrap = BootstrapPeers::for_node(&node.node_id, peers);
        flags.set_default(flag_keys::BOOTSTRAP_IDS, bootstrap.ids.join(","));
        flags.set_default(flag_keys::BOOTSTRAP_IPS, bootstrap.ips.join(","));

        if let Some(genesis_content) = network.genesis_file_content()? {
            flags.set_default(flag_keys::GENESIS_FILE_CONTENT, genesis_content);
            if network.is_single_node_network() {
                info!(
                    node_id = %node.node_id,
                    "defaulting to sybil protection disabled to enable a single-node network to start"
                );
                flags.set_default(flag_keys::SYBIL_PROTECTION_ENABLED, false);
            }
        }

        let subnet_config = network.subnet_config_content()?;
        if !subnet_config.is_empty() {
            flags.set_default(flag_keys::SUBNET_CONFIG_CONTENT, subnet_config);
        }

        let chain_config = network.chain_config_content()?;
        if !chain_config.is_empty() {
            flags.set_default(flag_keys::CHAIN_CONFIG_CONTENT, chain_config);
        }

        flags.set_defaults(&network.default_flags);
        flags.set_defaults(self.orchestrator_defaults);
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::domain::{BackendRef, RuntimeHandle};

    fn running(mut node: Node, port: u16) -> Node {
        node.handle = Some(RuntimeHandle {
            uri: format!("http://127.0.0.1:{}", port - 1),
            staking_address: format!("127.0.0.1:{port}").parse().unwrap(),
            backend: BackendRef::Process { pid: u32::from(port) },
        });
        node
    }

    fn created_network(node_count: usize) -> (Network, OrchestratorConfig) {
        let config = OrchestratorConfig {
            pre_funded_key_count: 2,
            ..OrchestratorConfig::default()
        };
        let mut network = Network::new_default("ci", node_count);
        network.ensure_default_config(&config, None, None).unwrap();
        network.genesis = Some(network.default_genesis(&config).unwrap());
        (network, config)
    }

    #[test]
    fn test_bootstrap_peers_skip_self_stopped_and_ephemeral() {
        let nodes = Node::new_nodes(4);
        let mut ephemeral = running(nodes[3].clone(), 9003);
        ephemeral.is_ephemeral = true;
        let candidates = vec![
            running(nodes[0].clone(), 9001),
            running(nodes[1].clone(), 9002),
            nodes[2].clone(),
            ephemeral,
        ];

        let peers = BootstrapPeers::for_node(&nodes[0].node_id, &candidates);
        assert_eq!(peers.ips, vec!["127.0.0.1:9002".to_string()]);
        assert_eq!(peers.ids, vec![nodes[1].node_id.to_string()]);
    }

    #[test]
    fn test_compose_layers_computed_values() {
        let (mut network, config) = created_network(2);
        network.default_flags.insert("log-level", "debug");
        let peers = vec![running(network.nodes[1].clone(), 9652)];
        let node = network.nodes[0].clone();

        let flags = FlagComposer::new(&network, &config.default_flags)
            .compose(&node, &peers)
            .unwrap();

        assert_eq!(
            flags.get_string(flag_keys::NETWORK_ID).unwrap().as_deref(),
            Some("88888")
        );
        assert_eq!(
            flags.get_string(flag_keys::BOOTSTRAP_IPS).unwrap().as_deref(),
            Some("127.0.0.1:9652")
        );
        assert!(flags.contains_key(flag_keys::GENESIS_FILE_CONTENT));
        assert!(flags.contains_key(flag_keys::CHAIN_CONFIG_CONTENT));
        assert!(!flags.contains_key(flag_keys::SUBNET_CONFIG_CONTENT));
        assert!(!flags.contains_key(flag_keys::SYBIL_PROTECTION_ENABLED));
        assert_eq!(flags.get_string("log-level").unwrap().as_deref(), Some("debug"));
        for key in config.default_flags.iter().map(|(k, _)| k) {
            assert!(flags.contains_key(key), "missing orchestrator default {key}");
        }
    }

    #[test]
    fn test_caller_values_are_never_overwritten() {
        let (mut network, config) = created_network(1);
        network.default_flags.insert(flag_keys::HEALTH_CHECK_FREQ, "9s");

        let mut node = network.nodes[0].clone();
        let explicit = [
            (flag_keys::NETWORK_ID, "12345"),
            (flag_keys::BOOTSTRAP_IDS, "NodeID-custom"),
            (flag_keys::BOOTSTRAP_IPS, "10.0.0.1:9651"),
            (flag_keys::GENESIS_FILE_CONTENT, "e30="),
            (flag_keys::CHAIN_CONFIG_CONTENT, "e30="),
            (flag_keys::SYBIL_PROTECTION_ENABLED, "true"),
            (flag_keys::HEALTH_CHECK_FREQ, "1s"),
            (flag_keys::NETWORK_MAX_RECONNECT_DELAY, "5s"),
        ];
        for (key, value) in explicit {
            node.flags.insert(key, value);
        }
        let peers = vec![running(Node::new_nodes(1).remove(0), 9700)];

        let flags = FlagComposer::new(&network, &config.default_flags)
            .compose(&node, &peers)
            .unwrap();
        for (key, value) in explicit {
            assert_eq!(flags.get_string(key).unwrap().as_deref(), Some(value), "{key}");
        }
    }

    #[test]
    fn test_single_node_network_disables_sybil_protection() {
        let (network, config) = created_network(1);
        let node = network.nodes[0].clone();
        let flags = FlagComposer::new(&network, &config.default_flags)
            .compose(&node, &[])
            .unwrap();
        assert!(!flags.get_bool(flag_keys::SYBIL_PROTECTION_ENABLED, true).unwrap());
        assert_eq!(flags.get_string(flag_keys::BOOTSTRAP_IDS).unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_network_without_genesis_uses_network_id() {
        let config = OrchestratorConfig::default();
        let mut network = Network::new_default("ci", 1);
        network.network_id = 5;
        let node = network.nodes[0].clone();
        let flags = FlagComposer::new(&network, &config.default_flags)
            .compose(&node, &[])
            .unwrap();
        assert_eq!(flags.get_string(flag_keys::NETWORK_ID).unwrap().as_deref(), Some("5"));
        assert!(!flags.contains_key(flag_keys::GENESIS_FILE_CONTENT));
        assert!(!flags.contains_key(flag_keys::SYBIL_PROTECTION_ENABLED));
    }
}
