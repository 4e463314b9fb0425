//! Subnets and their chains.

use serde::{Deserialize, Serialize};
use shared_crypto::PrivateKey;
use shared_types::encoding::base64_bytes;
use shared_types::{ChainId, FlagsMap, NodeId, SubnetId, VmId};

/// A chain to create on a subnet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub vm_id: VmId,

    /// JSON chain configuration handed to the node
    #[serde(default)]
    pub config: String,

    #[serde(default, with = "base64_bytes")]
    pub genesis: Vec<u8>,

    /// Empty until the chain is created
    #[serde(default)]
    pub chain_id: ChainId,

    /// Arguments that make the VM binary print its protocol version
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub version_args: Vec<String>,
}

impl Chain {
    pub fn new(vm_id: VmId, genesis: Vec<u8>) -> Self {
        Self {
            vm_id,
            genesis,
            ..Self::default()
        }
    }

    pub fn is_created(&self) -> bool {
        !self.chain_id.is_empty()
    }
}

/// A subnet of the network.
///
/// `subnet_id` moves from empty to its on-chain value exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,

    #[serde(default)]
    pub subnet_id: SubnetId,

    /// Intended validator set, fixed when the subnet is declared
    #[serde(default)]
    pub validator_ids: Vec<NodeId>,

    /// Funding key, taken from the network's pre-funded pool on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owning_key: Option<PrivateKey>,

    #[serde(default)]
    pub chains: Vec<Chain>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<FlagsMap>,
}

impl Subnet {
    pub fn new(name: impl Into<String>, validator_ids: Vec<NodeId>) -> Self {
        Self {
            name: name.into(),
            validator_ids,
            ..Self::default()
        }
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn is_created(&self) -> bool {
        !self.subnet_id.is_empty()
    }

    /// Whether any chain carries explicit configuration.
    pub fn has_chain_config(&self) -> bool {
        self.chains.iter().any(|chain| !chain.config.is_empty())
    }

    pub fn is_validator(&self, node_id: &NodeId) -> bool {
        self.validator_ids.contains(node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_config_detection() {
        let plain = Subnet::new("a", vec![NodeId::new([1; 20])])
            .with_chain(Chain::new(VmId::from_name("vm"), vec![1, 2]));
        assert!(!plain.has_chain_config());

        let mut configured = Chain::new(VmId::from_name("vm"), vec![]);
        configured.config = r#"{"log-level":"debug"}"#.into();
        let subnet = plain.with_chain(configured);
        assert!(subnet.has_chain_config());
    }

    #[test]
    fn test_document_round_trip_keeps_owner_and_genesis() {
        let mut subnet = Subnet::new("xsvm", vec![NodeId::new([3; 20])])
            .with_chain(Chain::new(VmId::from_name("xsvm"), b"genesis".to_vec()));
        subnet.owning_key = Some(PrivateKey::generate());
        subnet.subnet_id = SubnetId::new([7; 32]);

        let json = serde_json::to_string(&subnet).unwrap();
        let restored: Subnet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, subnet);
        assert!(restored.is_created());
    }
}
