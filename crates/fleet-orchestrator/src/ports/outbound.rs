//! # Driven Ports (Outbound SPI)
//!
//! Interfaces the orchestrator requires from its environment: something to
//! run nodes, something to ask them about health, the platform API of a
//! running node, and a way to probe binaries for their protocol version.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use shared_crypto::PrivateKey;
use shared_types::{ChainId, NodeId, SubnetId, TxId, VmId};

use crate::context::OpContext;
use crate::domain::{NodeRuntimeConfig, RpcError, RuntimeError, RuntimeHandle, VersionError};

/// Everything a runtime needs to start one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLaunch {
    pub node_id: NodeId,
    pub data_dir: PathBuf,
    /// Fully composed flag file the node reads on start
    pub flags_path: PathBuf,
    pub runtime_config: NodeRuntimeConfig,
    pub network_uuid: String,
    pub network_owner: String,
    pub is_ephemeral: bool,
}

/// Execution backend for nodes.
///
/// Stopping is split so a whole network can be signalled at once and then
/// awaited, rather than one node at a time.
#[async_trait]
pub trait NodeRuntime: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Start the node and wait until it has published its runtime identity.
    async fn start(
        &self,
        ctx: &OpContext,
        launch: &NodeLaunch,
    ) -> Result<RuntimeHandle, RuntimeError>;

    /// Ask the node to stop without waiting for it.
    ///
    /// Stopping a node that already exited succeeds.
    async fn initiate_stop(&self, handle: &RuntimeHandle) -> Result<(), RuntimeError>;

    /// Wait until the node has exited.
    async fn wait_for_stopped(
        &self,
        ctx: &OpContext,
        handle: &RuntimeHandle,
    ) -> Result<(), RuntimeError>;

    async fn stop(&self, ctx: &OpContext, handle: &RuntimeHandle) -> Result<(), RuntimeError> {
        self.initiate_stop(handle).await?;
        self.wait_for_stopped(ctx, handle).await
    }

    /// One health query. `Ok(false)` means not healthy yet.
    async fn is_healthy(&self, handle: &RuntimeHandle) -> Result<bool, RuntimeError>;
}

/// Health endpoint of a running node.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok(false)` for a node that is not yet reachable or not yet healthy.
    async fn check(&self, uri: &str) -> Result<bool, RuntimeError>;
}

/// Opens platform API clients against node URIs.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn PlatformClient>, RpcError>;
}

/// Request to add a node to a subnet's validator set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetValidatorRequest {
    pub subnet_id: SubnetId,
    pub node_id: NodeId,
    /// Unix seconds; matches the node's primary validation end
    pub end_time: u64,
    pub weight: u64,
}

/// Request to create a chain on a subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateChainRequest {
    pub subnet_id: SubnetId,
    pub vm_id: VmId,
    pub chain_name: String,
    pub genesis: Vec<u8>,
}

/// A validator as reported by the platform chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub node_id: NodeId,
    pub weight: u64,
    pub end_time: u64,
}

/// Platform chain API of one node.
///
/// Issuing calls return once the transaction has been accepted.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn create_subnet(&self, owner: &PrivateKey) -> Result<SubnetId, RpcError>;

    async fn add_subnet_validator(
        &self,
        owner: &PrivateKey,
        request: &SubnetValidatorRequest,
    ) -> Result<TxId, RpcError>;

    async fn create_chain(
        &self,
        owner: &PrivateKey,
        request: &CreateChainRequest,
    ) -> Result<ChainId, RpcError>;

    /// Validators currently active on `subnet_id`.
    async fn current_validators(&self, subnet_id: SubnetId)
        -> Result<Vec<ValidatorInfo>, RpcError>;
}

/// Reports the plugin protocol version of a binary.
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn rpc_version(&self, exec_path: &Path, args: &[String]) -> Result<u64, VersionError>;
}
