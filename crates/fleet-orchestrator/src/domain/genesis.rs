//! Network genesis.

use serde::{Deserialize, Serialize};
use shared_crypto::{Address, PrivateKey};
use shared_types::NodeId;

use super::{Node, OrchestratorError};

/// Balance given to each funded key of a test genesis.
pub const TEST_ALLOCATION: u64 = 300_000_000_000_000_000;

/// Initial stake duration of a test genesis, in seconds.
pub const TEST_STAKE_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub address: Address,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staker {
    #[serde(rename = "nodeID")]
    pub node_id: NodeId,
    pub reward_address: Address,
    pub weight: u64,
    pub delegation_fee: u32,
}

/// Genesis document handed to every node as base64 JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    #[serde(rename = "networkID")]
    pub network_id: u32,
    pub allocations: Vec<Allocation>,
    pub start_time: u64,
    pub initial_stake_duration: u64,
    pub initial_staked_funds: Vec<Address>,
    pub initial_stakers: Vec<Staker>,
    #[serde(default)]
    pub message: String,
}

impl Genesis {
    /// Genesis funding `keys` and staking every node in `nodes`.
    ///
    /// Node ids must already be assigned.
    pub fn for_test(
        network_id: u32,
        nodes: &[Node],
        keys: &[PrivateKey],
        weight: u64,
    ) -> Result<Self, OrchestratorError> {
        if nodes.is_empty() {
            return Err(OrchestratorError::InsufficientNodes);
        }

        let allocations: Vec<Allocation> = keys
            .iter()
            .map(|key| Allocation {
                address: key.address(),
                balance: TEST_ALLOCATION,
            })
            .collect();

        let Some(reward_address) = allocations.first().map(|a| a.address) else {
            return Err(OrchestratorError::NoFundedKeys);
        };

        let initial_stakers = nodes
            .iter()
            .map(|node| {
                if node.node_id.is_empty() {
                    return Err(OrchestratorError::UnknownNode {
                        node_id: node.node_id,
                    });
                }
                Ok(Staker {
                    node_id: node.node_id,
                    reward_address,
                    weight,
                    delegation_fee: 62_500,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            network_id,
            allocations,
            start_time: chrono::Utc::now().timestamp().max(0) as u64,
            initial_stake_duration: TEST_STAKE_DURATION_SECS,
            initial_staked_funds: vec![reward_address],
            initial_stakers,
            message: "fleetnet test genesis".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_test_stakes_every_node() {
        let nodes = Node::new_nodes(3);
        let keys = shared_crypto::new_private_keys(2);
        let genesis = Genesis::for_test(88888, &nodes, &keys, 100).unwrap();

        assert_eq!(genesis.network_id, 88888);
        assert_eq!(genesis.allocations.len(), 2);
        assert_eq!(genesis.initial_stakers.len(), 3);
        assert_eq!(genesis.initial_stakers[0].node_id, nodes[0].node_id);
        assert_eq!(genesis.initial_staked_funds, vec![keys[0].address()]);
    }

    #[test]
    fn test_for_test_requires_nodes_and_keys() {
        let keys = shared_crypto::new_private_keys(1);
        assert!(matches!(
            Genesis::for_test(1, &[], &keys, 1),
            Err(OrchestratorError::InsufficientNodes)
        ));
        assert!(Genesis::for_test(1, &Node::new_nodes(1), &[], 1).is_err());
        assert!(matches!(
            Genesis::for_test(1, &[Node::new()], &keys, 1),
            Err(OrchestratorError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_json_field_names() {
        let genesis = Genesis::for_test(5, &Node::new_nodes(1), &[PrivateKey::generate()], 1)
            .unwrap();
        let json = serde_json::to_value(&genesis).unwrap();
        assert_eq!(json["networkID"], 5);
        assert!(json["initialStakers"][0]["nodeID"]
            .as_str()
            .unwrap()
            .starts_with("NodeID-"));
    }
}
