//! Local child-process runtime.
//!
//! A node is started with `--config-file=<flags.json>` and
//! `--process-context-file=<data dir>/process.json`. The node writes its pid,
//! API URI and staking address to the process context file once it is
//! listening; `start` returns when that file appears.
//!
//! Nodes run in their own process group and outlive the controller. Nodes
//! started by another controller are signalled by pid.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_telemetry::log_node_event;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::context::OpContext;
use crate::domain::{BackendRef, NodeRuntimeConfig, RuntimeError, RuntimeHandle};
use crate::ports::{HealthProbe, NodeLaunch, NodeRuntime};

pub(crate) const PROCESS_CONTEXT_FILE: &str = "process.json";

/// Bound for a SIGKILLed node to be reaped.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// What a started node reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProcessContext {
    pub pid: u32,
    pub uri: String,
    pub staking_address: SocketAddr,
}

/// Remove a context file left over from a previous run.
pub(crate) fn clear_process_context(path: &Path) -> Result<(), RuntimeError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn read_process_context(path: &Path) -> Result<Option<ProcessContext>, RuntimeError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(RuntimeError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if bytes.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| RuntimeError::InvalidProcessContext {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Poll for the process context until it parses, `exited` reports an exit
/// status, or `ctx` finishes.
pub(crate) async fn wait_for_process_context(
    ctx: &OpContext,
    path: &Path,
    interval: Duration,
    mut exited: impl FnMut() -> Option<String>,
) -> Result<ProcessContext, RuntimeError> {
    let mut ticker = tokio::time::interval(interval);
    // A half-written file is retried; reported only if it never settles.
    let mut last_invalid = None;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = ctx.done() => {
                return Err(last_invalid.unwrap_or_else(|| RuntimeError::ProcessContextTimeout {
                    path: path.to_path_buf(),
                }));
            }
        }

        match read_process_context(path) {
            Ok(Some(context)) => return Ok(context),
            Ok(None) => {}
            Err(e @ RuntimeError::InvalidProcessContext { .. }) => last_invalid = Some(e),
            Err(e) => return Err(e),
        }
        if let Some(status) = exited() {
            return Err(RuntimeError::ProcessExited { status });
        }
    }
}

fn to_pid(pid: u32) -> Result<Pid, RuntimeError> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| RuntimeError::Signal {
            pid,
            reason: "pid out of range".to_string(),
        })
}

/// Send `signal` (or probe with `None`). Returns whether the process exists.
fn signal_pid(pid: u32, signal: Option<Signal>) -> Result<bool, RuntimeError> {
    match kill(to_pid(pid)?, signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(RuntimeError::Signal {
            pid,
            reason: e.to_string(),
        }),
    }
}

/// Runs nodes as local child processes.
pub struct ProcessRuntime {
    health: Arc<dyn HealthProbe>,
    polling_interval: Duration,
    process_context_timeout: Duration,
    stop_timeout: Duration,
    /// Children started by this runtime, by pid
    children: Mutex<HashMap<u32, Child>>,
}

impl ProcessRuntime {
    pub fn new(config: &OrchestratorConfig, health: Arc<dyn HealthProbe>) -> Self {
        Self {
            health,
            polling_interval: config.polling_interval,
            process_context_timeout: config.process_context_timeout,
            stop_timeout: config.stop_timeout,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn pid(handle: &RuntimeHandle) -> Result<u32, RuntimeError> {
        match &handle.backend {
            BackendRef::Process { pid } => Ok(*pid),
            BackendRef::Container { .. } => Err(RuntimeError::UnsupportedConfig {
                runtime: "process",
                found: "container",
            }),
        }
    }

    /// Exit status of an owned child that has exited.
    fn exit_status(&self, pid: u32) -> Option<String> {
        let mut children = self.children.lock();
        let child = children.get_mut(&pid)?;
        let status = match child.try_wait() {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => return None,
            Err(e) => e.to_string(),
        };
        children.remove(&pid);
        Some(status)
    }

    fn is_alive(&self, pid: u32) -> Result<bool, RuntimeError> {
        if self.children.lock().contains_key(&pid) {
            return Ok(self.exit_status(pid).is_none());
        }
        signal_pid(pid, None)
    }

    /// Poll until `pid` has exited. `false` if `ctx` finished first.
    async fn wait_for_exit(&self, ctx: &OpContext, pid: u32) -> Result<bool, RuntimeError> {
        let mut ticker = tokio::time::interval(self.polling_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = ctx.done() => return Ok(false),
            }
            if !self.is_alive(pid)? {
                return Ok(true);
            }
        }
    }

    fn kill_child(&self, pid: u32) {
        if let Some(mut child) = self.children.lock().remove(&pid) {
            if let Err(e) = child.start_kill() {
                warn!(pid, error = %e, "failed to kill node process");
            }
        }
    }
}

#[async_trait]
impl NodeRuntime for ProcessRuntime {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn start(
        &self,
        ctx: &OpContext,
        launch: &NodeLaunch,
    ) -> Result<RuntimeHandle, RuntimeError> {
        let exec_path: PathBuf = match &launch.runtime_config {
            NodeRuntimeConfig::Process { exec_path, .. } => exec_path.clone(),
            other => {
                return Err(RuntimeError::UnsupportedConfig {
                    runtime: "process",
                    found: other.kind(),
                })
            }
        };

        let context_path = launch.data_dir.join(PROCESS_CONTEXT_FILE);
        clear_process_context(&context_path)?;

        let mut command = Command::new(&exec_path);
        command
            .arg(format!("--config-file={}", launch.flags_path.display()))
            .arg(format!("--process-context-file={}", context_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| RuntimeError::Spawn {
            path: exec_path.clone(),
            source,
        })?;
        let Some(pid) = child.id() else {
            return Err(RuntimeError::ProcessExited {
                status: "exited before its pid was read".to_string(),
            });
        };
        self.children.lock().insert(pid, child);
        log_node_event!(debug, "spawned node process", launch.node_id, pid = pid);

        let start_ctx = ctx.child(self.process_context_timeout);
        let context = wait_for_process_context(
            &start_ctx,
            &context_path,
            self.polling_interval,
            || self.exit_status(pid),
        )
        .await;

        match context {
            Ok(context) => Ok(RuntimeHandle {
                uri: context.uri,
                staking_address: context.staking_address,
                backend: BackendRef::Process { pid },
            }),
            Err(e) => {
                self.kill_child(pid);
                Err(e)
            }
        }
    }

    async fn initiate_stop(&self, handle: &RuntimeHandle) -> Result<(), RuntimeError> {
        let pid = Self::pid(handle)?;
        if !signal_pid(pid, Some(Signal::SIGTERM))? {
            debug!(pid, "node process already exited");
        }
        Ok(())
    }

    async fn wait_for_stopped(
        &self,
        ctx: &OpContext,
        handle: &RuntimeHandle,
    ) -> Result<(), RuntimeError> {
        let pid = Self::pid(handle)?;
        if self.wait_for_exit(&ctx.child(self.stop_timeout), pid).await? {
            return Ok(());
        }

        warn!(pid, "node process ignored SIGTERM, sending SIGKILL");
        if !signal_pid(pid, Some(Signal::SIGKILL))? {
            return Ok(());
        }
        // The caller's deadline may already be gone; the kill still gets reaped.
        let kill_ctx = OpContext::with_timeout(KILL_GRACE);
        if self.wait_for_exit(&kill_ctx, pid).await? {
            return Ok(());
        }
        Err(RuntimeError::StopTimeout {
            target: format!("pid {pid}"),
        })
    }

    async fn is_healthy(&self, handle: &RuntimeHandle) -> Result<bool, RuntimeError> {
        self.health.check(&handle.uri).await
    }
}
