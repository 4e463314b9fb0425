//! Execution backend selection and the identity of a running node.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which backend runs a node, with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeRuntimeConfig {
    /// Local child process.
    Process {
        exec_path: PathBuf,
        /// Keep the ports a node was assigned across restarts.
        #[serde(default)]
        reuse_dynamic_ports: bool,
    },
    /// Container run through a docker-compatible CLI.
    Container {
        image: String,
        #[serde(default = "default_docker_path")]
        docker_path: PathBuf,
        #[serde(default = "default_network_mode")]
        network_mode: String,
    },
}

fn default_docker_path() -> PathBuf {
    PathBuf::from("docker")
}

fn default_network_mode() -> String {
    "host".to_string()
}

impl NodeRuntimeConfig {
    pub fn process(exec_path: impl Into<PathBuf>) -> Self {
        Self::Process {
            exec_path: exec_path.into(),
            reuse_dynamic_ports: false,
        }
    }

    /// Executable whose protocol version can be probed locally.
    pub fn exec_path(&self) -> Option<&Path> {
        match self {
            Self::Process { exec_path, .. } if !exec_path.as_os_str().is_empty() => {
                Some(exec_path)
            }
            _ => None,
        }
    }

    pub fn reuse_dynamic_ports(&self) -> bool {
        matches!(
            self,
            Self::Process {
                reuse_dynamic_ports: true,
                ..
            }
        )
    }

    /// Fill an empty process executable path.
    pub fn ensure_exec_path(&mut self, path: &Path) {
        if let Self::Process { exec_path, .. } = self {
            if exec_path.as_os_str().is_empty() {
                *exec_path = path.to_path_buf();
            }
        }
    }

    /// Short backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Process { .. } => "process",
            Self::Container { .. } => "container",
        }
    }
}

/// Backend-specific reference to a running node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendRef {
    Process { pid: u32 },
    Container { container_id: String },
}

/// Runtime identity of a started node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeHandle {
    /// Base URI of the node's HTTP API
    pub uri: String,
    /// Address peers use to reach the node
    pub staking_address: SocketAddr,
    pub backend: BackendRef,
}

impl RuntimeHandle {
    /// Port of the HTTP API, if the URI carries one.
    pub fn api_port(&self) -> Option<u16> {
        let authority = self.uri.split("://").nth(1).unwrap_or(&self.uri);
        let authority = authority.split('/').next().unwrap_or(authority);
        authority.rsplit_once(':')?.1.parse().ok()
    }
}
