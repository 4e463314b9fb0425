//! # Fleet Orchestrator
//!
//! Provisions, bootstraps, health-checks, reconfigures and tears down
//! ephemeral clusters of validator nodes for testing a proof-of-stake
//! ledger. The on-disk mirror of each network lets an independent process
//! re-attach to a cluster later to restart or stop it.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** network, node and subnet model; defaulting rules;
//!   flag key constants; errors
//! - **Ports Layer:** traits for the node runtime, health probe, platform
//!   RPC and version probe
//! - **Service Layer:** `NetworkController` and its bootstrap state machine,
//!   `FlagComposer`, `HealthMonitor`, subnet provisioning and the binary
//!   compatibility guard
//! - **Adapters Layer:** process and container runtimes, HTTP health probe,
//!   JSON-RPC platform client, version probe, on-disk store
//!
//! ## Example
//!
//! ```rust,ignore
//! use fleet_orchestrator::{
//!     bootstrap_new_network, ControllerDeps, Network, OpContext, OrchestratorConfig,
//! };
//!
//! let config = OrchestratorConfig::from_env();
//! let network = Network::new_default("ci", config.default_node_count);
//! let deps = ControllerDeps::for_process_runtime(&config)?;
//! let ctx = OpContext::with_timeout(config.network_timeout);
//! let controller = bootstrap_new_network(
//!     &ctx, config, network, "/usr/local/bin/node".as_ref(), None, deps,
//! ).await?;
//! println!("{:?}", controller.node_uris());
//! ```

pub mod adapters;
pub mod config;
pub mod context;
pub mod domain;
pub mod ports;
pub mod service;

/// In-memory fakes for the outbound ports.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::OrchestratorConfig;
pub use context::{ContextError, OpContext};

pub use domain::{
    BackendRef, BootstrapPhase, Chain, Genesis, Network, Node, NodeRuntimeConfig, NodeUri,
    OrchestratorError, RpcError, RuntimeError, RuntimeHandle, StoreError, Subnet, VersionError,
};

pub use ports::{
    CreateChainRequest, HealthProbe, NodeLaunch, NodeRuntime, PlatformClient, PlatformConnector,
    SubnetValidatorRequest, ValidatorInfo, VersionProbe,
};

pub use service::{
    bootstrap_new_network, restart_network, stop_network, wait_for_active_validators,
    CompatReport, ControllerDeps, FlagComposer, HealthMonitor, NetworkController,
    VersionMismatch,
};

pub use adapters::{runtime_for, NetworkStore};
