//! Domain Layer - network model with no I/O
//!
//! This module contains:
//! - Network, node and subnet aggregates
//! - Defaulting rules applied before a network is created
//! - Genesis generation for test networks
//! - Bootstrap phases
//! - Flag key constants and the error taxonomy

pub mod errors;
pub mod flag_keys;
pub mod genesis;
pub mod network;
pub mod node;
pub mod phase;
pub mod runtime;
pub mod subnet;

pub use errors::{OrchestratorError, RpcError, RuntimeError, StoreError, VersionError};
pub use genesis::{Allocation, Genesis, Staker};
pub use network::Network;
pub use node::{node_dir, Node, NodeDefaults, NodeUri};
pub use phase::BootstrapPhase;
pub use runtime::{BackendRef, NodeRuntimeConfig, RuntimeHandle};
pub use subnet::{Chain, Subnet};
