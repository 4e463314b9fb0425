//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! The orchestrator only drives outward: every collaborator it needs is an
//! outbound port implemented in `adapters` and faked in `test_utils`.

pub mod outbound;

pub use outbound::{
    CreateChainRequest, HealthProbe, NodeLaunch, NodeRuntime, PlatformClient, PlatformConnector,
    SubnetValidatorRequest, ValidatorInfo, VersionProbe,
};
