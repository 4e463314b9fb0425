//! JSON-RPC client for a node's platform chain API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared_crypto::{Address, PrivateKey};
use shared_types::{ChainId, NodeId, SubnetId, TxId, VmId};

use super::jsonrpc::{u64_from_str, JsonRpcClient};
use crate::domain::RpcError;
use crate::ports::{
    CreateChainRequest, PlatformClient, PlatformConnector, SubnetValidatorRequest, ValidatorInfo,
};

const PLATFORM_PATH: &str = "/ext/bc/P";

/// Funding key attached to every issuing call.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Funding<'a> {
    from: Address,
    private_key: &'a PrivateKey,
}

impl<'a> Funding<'a> {
    fn new(owner: &'a PrivateKey) -> Self {
        Self {
            from: owner.address(),
            private_key: owner,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubnetParams<'a> {
    #[serde(flatten)]
    funding: Funding<'a>,
    control_keys: Vec<Address>,
    threshold: u32,
}

#[derive(Deserialize)]
struct CreateSubnetReply {
    #[serde(rename = "subnetID")]
    subnet_id: SubnetId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddSubnetValidatorParams<'a> {
    #[serde(flatten)]
    funding: Funding<'a>,
    #[serde(rename = "subnetID")]
    subnet_id: SubnetId,
    #[serde(rename = "nodeID")]
    node_id: NodeId,
    end_time: String,
    weight: String,
}

#[derive(Deserialize)]
struct TxReply {
    #[serde(rename = "txID")]
    tx_id: TxId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBlockchainParams<'a> {
    #[serde(flatten)]
    funding: Funding<'a>,
    #[serde(rename = "subnetID")]
    subnet_id: SubnetId,
    #[serde(rename = "vmID")]
    vm_id: VmId,
    name: &'a str,
    genesis_data: String,
    encoding: &'static str,
}

#[derive(Deserialize)]
struct CreateBlockchainReply {
    #[serde(rename = "blockchainID")]
    blockchain_id: ChainId,
}

#[derive(Serialize)]
struct CurrentValidatorsParams {
    #[serde(rename = "subnetID")]
    subnet_id: SubnetId,
}

#[derive(Deserialize)]
struct CurrentValidatorsReply {
    validators: Vec<ValidatorEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidatorEntry {
    #[serde(rename = "nodeID")]
    node_id: NodeId,
    #[serde(deserialize_with = "u64_from_str")]
    weight: u64,
    #[serde(deserialize_with = "u64_from_str")]
    end_time: u64,
}

/// Platform client for one node.
#[derive(Debug)]
pub struct JsonRpcPlatformClient {
    rpc: JsonRpcClient,
}

impl JsonRpcPlatformClient {
    pub fn new(client: Client, uri: &str) -> Self {
        let endpoint = format!("{}{PLATFORM_PATH}", uri.trim_end_matches('/'));
        Self {
            rpc: JsonRpcClient::with_client(client, endpoint),
        }
    }
}

#[async_trait]
impl PlatformClient for JsonRpcPlatformClient {
    async fn create_subnet(&self, owner: &PrivateKey) -> Result<SubnetId, RpcError> {
        let params = CreateSubnetParams {
            funding: Funding::new(owner),
            control_keys: vec![owner.address()],
            threshold: 1,
        };
        let reply: CreateSubnetReply = self.rpc.call("platform.createSubnet", params).await?;
        Ok(reply.subnet_id)
    }

    async fn add_subnet_validator(
        &self,
        owner: &PrivateKey,
        request: &SubnetValidatorRequest,
    ) -> Result<TxId, RpcError> {
        let params = AddSubnetValidatorParams {
            funding: Funding::new(owner),
            subnet_id: request.subnet_id,
            node_id: request.node_id,
            end_time: request.end_time.to_string(),
            weight: request.weight.to_string(),
        };
        let reply: TxReply = self.rpc.call("platform.addSubnetValidator", params).await?;
        Ok(reply.tx_id)
    }

    async fn create_chain(
        &self,
        owner: &PrivateKey,
        request: &CreateChainRequest,
    ) -> Result<ChainId, RpcError> {
        let params = CreateBlockchainParams {
            funding: Funding::new(owner),
            subnet_id: request.subnet_id,
            vm_id: request.vm_id,
            name: &request.chain_name,
            genesis_data: hex::encode(&request.genesis),
            encoding: "hex",
        };
        let reply: CreateBlockchainReply =
            self.rpc.call("platform.createBlockchain", params).await?;
        Ok(reply.blockchain_id)
    }

    async fn current_validators(
        &self,
        subnet_id: SubnetId,
    ) -> Result<Vec<ValidatorInfo>, RpcError> {
        let reply: CurrentValidatorsReply = self
            .rpc
            .call(
                "platform.getCurrentValidators",
                CurrentValidatorsParams { subnet_id },
            )
            .await?;
        Ok(reply
            .validators
            .into_iter()
            .map(|v| ValidatorInfo {
                node_id: v.node_id,
                weight: v.weight,
                end_time: v.end_time,
            })
            .collect())
    }
}

/// Opens `JsonRpcPlatformClient`s sharing one connection pool.
#[derive(Debug, Clone)]
pub struct JsonRpcPlatformConnector {
    client: Client,
}

impl JsonRpcPlatformConnector {
    pub fn new(timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PlatformConnector for JsonRpcPlatformConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn PlatformClient>, RpcError> {
        Ok(Arc::new(JsonRpcPlatformClient::new(self.client.clone(), uri)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validator_entries_parse_string_integers() {
        let id = NodeId::new([1; 20]);
        let raw = format!(
            r#"{{"validators":[{{"nodeID":"{id}","weight":"20","endTime":"1700000000"}}]}}"#
        );
        let reply: CurrentValidatorsReply = serde_json::from_str(&raw).unwrap();
        assert_eq!(reply.validators[0].node_id, id);
        assert_eq!(reply.validators[0].weight, 20);
        assert_eq!(reply.validators[0].end_time, 1_700_000_000);
    }

    #[test]
    fn test_issuing_params_carry_funding_key() {
        let owner = PrivateKey::generate();
        let params = AddSubnetValidatorParams {
            funding: Funding::new(&owner),
            subnet_id: SubnetId::new([2; 32]),
            node_id: NodeId::new([3; 20]),
            end_time: "10".into(),
            weight: "5".into(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["from"], owner.address().to_string());
        assert_eq!(json["privateKey"], owner.to_string());
        assert_eq!(json["subnetID"], SubnetId::new([2; 32]).to_string());
        assert_eq!(json["endTime"], "10");
    }

    #[test]
    fn test_endpoint_path() {
        let client = JsonRpcPlatformClient::new(Client::new(), "http://127.0.0.1:9650/");
        assert_eq!(client.rpc.endpoint(), "http://127.0.0.1:9650/ext/bc/P");
    }
}
