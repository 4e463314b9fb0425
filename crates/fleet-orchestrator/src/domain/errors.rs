//! Error taxonomy for orchestration.
//!
//! - Configuration errors are fatal and never retried.
//! - Convergence (not yet healthy, not yet active) is not an error until the
//!   operation deadline passes.
//! - External errors carry the node or phase they occurred in.
//! - Aggregate operations report every failure they collected.

use std::io;
use std::path::PathBuf;

use shared_crypto::CryptoError;
use shared_types::{FlagError, NodeId};
use thiserror::Error;

use crate::context::ContextError;

/// Failures of a node execution backend.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{runtime} runtime cannot run a {found} node")]
    UnsupportedConfig {
        runtime: &'static str,
        found: &'static str,
    },

    #[error("node process exited before reporting its process context: {status}")]
    ProcessExited { status: String },

    #[error("timed out waiting for process context at {path}")]
    ProcessContextTimeout { path: PathBuf },

    #[error("invalid process context at {path}: {reason}")]
    InvalidProcessContext { path: PathBuf, reason: String },

    #[error("failed to signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("timed out waiting for {target} to stop")]
    StopTimeout { target: String },

    #[error("container command `{command}` failed: {output}")]
    Container { command: String, output: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("node is not running")]
    NotRunning,

    #[error("health request failed: {0}")]
    HealthTransport(String),

    #[error("malformed health response: {0}")]
    MalformedHealth(String),
}

/// Failures talking to a node's platform API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("cannot connect to {0}")]
    Connection(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),
}

/// Failures probing a binary's protocol version.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("command {command} failed with output: {output}")]
    Command { command: PathBuf, output: String },

    #[error("failed to parse version output of {command}: {reason}, output: {output}")]
    Parse {
        command: PathBuf,
        reason: String,
        output: String,
    },
}

/// Failures reading or writing on-disk network state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("node {node_id} listed in the roster has no configuration at {path}")]
    MissingNode { node_id: NodeId, path: PathBuf },
}

/// Top-level orchestration errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------
    #[error("at least one node is required")]
    InsufficientNodes,

    #[error("subnet {subnet:?} needs at least one validator")]
    MissingValidators { subnet: String },

    #[error("no pre-funded keys available to create subnet {subnet:?}")]
    KeyPoolExhausted { subnet: String },

    #[error("genesis requires at least one funded key")]
    NoFundedKeys,

    #[error("{node_id} is not known to the network")]
    UnknownNode { node_id: NodeId },

    #[error("{node_id} is not a primary network validator")]
    NotPrimaryValidator { node_id: NodeId },

    #[error("{node_id} is not running")]
    NodeNotRunning { node_id: NodeId },

    #[error("network has not been created on disk")]
    NotCreated,

    // ------------------------------------------------------------------
    // Convergence escalated at the deadline
    // ------------------------------------------------------------------
    #[error("failed to see all nodes healthy before timeout: {source} (unhealthy: {})", join_ids(.unhealthy))]
    HealthTimeout {
        unhealthy: Vec<NodeId>,
        #[source]
        source: ContextError,
    },

    #[error("validators of subnet {subnet:?} not active before timeout: {source} (missing: {})", join_ids(.missing))]
    ValidatorsNotActive {
        subnet: String,
        missing: Vec<NodeId>,
        #[source]
        source: ContextError,
    },

    // ------------------------------------------------------------------
    // External, with context
    // ------------------------------------------------------------------
    #[error("failed to start node {node_id}: {source}")]
    NodeStart {
        node_id: NodeId,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to stop node {node_id}: {source}")]
    NodeStop {
        node_id: NodeId,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to check health of node {node_id}: {source}")]
    HealthCheck {
        node_id: NodeId,
        #[source]
        source: RuntimeError,
    },

    #[error("{phase} failed: {source}")]
    Rpc {
        phase: &'static str,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Flag(#[from] FlagError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("failed to encode content: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------
    #[error("failed to stop network: {}", join_errors(.0))]
    StopFailed(Vec<OrchestratorError>),

    #[error("{source}; cleanup of node {node_id} also failed: {cleanup}")]
    StartFailed {
        node_id: NodeId,
        source: Box<OrchestratorError>,
        cleanup: Box<OrchestratorError>,
    },

    #[error("bootstrap failed: {source}; stopping the network also failed: {cleanup}")]
    BootstrapFailed {
        source: Box<OrchestratorError>,
        cleanup: Box<OrchestratorError>,
    },
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_errors(errors: &[OrchestratorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrchestratorError {
    /// Whether this error is the escalation of a convergence wait.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::HealthTimeout { .. } | Self::ValidatorsNotActive { .. }
        )
    }
}
