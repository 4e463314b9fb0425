//! # Adapters Layer
//!
//! Concrete implementations of the outbound ports:
//!
//! | Adapter | Port | Mechanism |
//! |---------|------|-----------|
//! | `ProcessRuntime` | `NodeRuntime` | child process, SIGTERM |
//! | `ContainerRuntime` | `NodeRuntime` | docker-compatible CLI |
//! | `HttpHealthProbe` | `HealthProbe` | JSON-RPC `health.health` |
//! | `JsonRpcPlatformConnector` | `PlatformConnector` | JSON-RPC on `/ext/bc/P` |
//! | `CommandVersionProbe` | `VersionProbe` | runs the binary |
//!
//! `NetworkStore` is the on-disk mirror of a network.

pub mod container;
pub mod health;
pub mod jsonrpc;
pub mod platform_rpc;
pub mod process;
pub mod store;
pub mod version;

use std::sync::Arc;

pub use container::ContainerRuntime;
pub use health::HttpHealthProbe;
pub use platform_rpc::{JsonRpcPlatformClient, JsonRpcPlatformConnector};
pub use process::ProcessRuntime;
pub use store::NetworkStore;
pub use version::CommandVersionProbe;

use crate::config::OrchestratorConfig;
use crate::domain::NodeRuntimeConfig;
use crate::ports::{HealthProbe, NodeRuntime};

/// Runtime backend for nodes configured with `runtime_config`.
pub fn runtime_for(
    runtime_config: &NodeRuntimeConfig,
    config: &OrchestratorConfig,
    health: Arc<dyn HealthProbe>,
) -> Arc<dyn NodeRuntime> {
    match runtime_config {
        NodeRuntimeConfig::Process { .. } => Arc::new(ProcessRuntime::new(config, health)),
        NodeRuntimeConfig::Container { docker_path, .. } => {
            Arc::new(ContainerRuntime::new(docker_path.clone(), config, health))
        }
    }
}
