//! # Service Layer
//!
//! `NetworkController` wires the domain model to the outbound ports. Its
//! operations are spread over several files:
//!
//! - `core`: construction, re-attach from disk, defaulting, accessors
//! - `lifecycle`: create, bootstrap, start/stop/restart, ephemeral nodes
//! - `subnets`: subnet, validator and chain provisioning
//!
//! `FlagComposer`, `HealthMonitor` and the binary compatibility guard are
//! standalone and usable without a controller.

pub mod compat;
pub mod core;
pub mod flags;
pub mod health;
pub mod lifecycle;
pub mod subnets;


pub use compat::{check_vm_binaries, CompatReport, VersionMismatch};
pub use core::{ControllerDeps, NetworkController};
pub use flags::{BootstrapPeers, FlagComposer};
pub use health::HealthMonitor;
pub use lifecycle::{bootstrap_new_network, restart_network, stop_network};
pub use subnets::wait_for_active_validators;
