//! Container runtime driving a docker-compatible CLI.
//!
//! The node's data dir is bind-mounted at the same path inside the
//! container so the flag file and process context file paths hold on both
//! sides.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_telemetry::log_node_event;
use tokio::process::Command;
use tracing::warn;

use super::process::{clear_process_context, wait_for_process_context, PROCESS_CONTEXT_FILE};
use crate::config::OrchestratorConfig;
use crate::context::OpContext;
use crate::domain::{BackendRef, NodeRuntimeConfig, RuntimeError, RuntimeHandle};
use crate::ports::{HealthProbe, NodeLaunch, NodeRuntime};

const LABEL_PREFIX: &str = "fleetnet";

pub struct ContainerRuntime {
    docker_path: PathBuf,
    health: Arc<dyn HealthProbe>,
    polling_interval: Duration,
    process_context_timeout: Duration,
    stop_timeout: Duration,
}

impl ContainerRuntime {
    pub fn new(
        docker_path: impl Into<PathBuf>,
        config: &OrchestratorConfig,
        health: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            docker_path: docker_path.into(),
            health,
            polling_interval: config.polling_interval,
            process_context_timeout: config.process_context_timeout,
            stop_timeout: config.stop_timeout,
        }
    }

    async fn docker(&self, args: &[String]) -> Result<String, RuntimeError> {
        let command = format!("{} {}", self.docker_path.display(), args.join(" "));
        let output = Command::new(&self.docker_path)
            .args(args)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                path: self.docker_path.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(RuntimeError::Container {
                command,
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn container_id(handle: &RuntimeHandle) -> Result<&str, RuntimeError> {
        match &handle.backend {
            BackendRef::Container { container_id } => Ok(container_id),
            BackendRef::Process { .. } => Err(RuntimeError::UnsupportedConfig {
                runtime: "container",
                found: "process",
            }),
        }
    }
}

/// Arguments of `docker run` for `launch`.
fn run_args(launch: &NodeLaunch, image: &str, network_mode: &str) -> Vec<String> {
    let context_path = launch.data_dir.join(PROCESS_CONTEXT_FILE);
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        format!("--network={network_mode}"),
        format!("--label={LABEL_PREFIX}.network-uuid={}", launch.network_uuid),
        format!("--label={LABEL_PREFIX}.network-owner={}", launch.network_owner),
        format!("--label={LABEL_PREFIX}.node-id={}", launch.node_id),
        format!("--label={LABEL_PREFIX}.ephemeral={}", launch.is_ephemeral),
        mount(&launch.data_dir),
    ];
    if let Some(flags_dir) = launch.flags_path.parent() {
        if flags_dir != launch.data_dir {
            args.push(mount(flags_dir));
        }
    }
    args.push(image.to_string());
    args.push(format!("--config-file={}", launch.flags_path.display()));
    args.push(format!("--process-context-file={}", context_path.display()));
    args
}

fn mount(dir: &Path) -> String {
    format!("--volume={0}:{0}", dir.display())
}

fn is_gone(err: &RuntimeError) -> bool {
    matches!(err, RuntimeError::Container { output, .. }
        if output.contains("No such container") || output.contains("is not running"))
}

#[async_trait]
impl NodeRuntime for ContainerRuntime {
    fn name(&self) -> &'static str {
        "container"
    }

    async fn start(
        &self,
        ctx: &OpContext,
        launch: &NodeLaunch,
    ) -> Result<RuntimeHandle, RuntimeError> {
        let NodeRuntimeConfig::Container {
            image,
            network_mode,
            ..
        } = &launch.runtime_config
        else {
            return Err(RuntimeError::UnsupportedConfig {
                runtime: "container",
                found: launch.runtime_config.kind(),
            });
        };

        let context_path = launch.data_dir.join(PROCESS_CONTEXT_FILE);
        clear_process_context(&context_path)?;

        let container_id = self.docker(&run_args(launch, image, network_mode)).await?;
        log_node_event!(debug, "started node container", launch.node_id, container_id = %container_id);

        let start_ctx = ctx.child(self.process_context_timeout);
        let context =
            wait_for_process_context(&start_ctx, &context_path, self.polling_interval, || None)
                .await;
        match context {
            Ok(context) => Ok(RuntimeHandle {
                uri: context.uri,
                staking_address: context.staking_address,
                backend: BackendRef::Container { container_id },
            }),
            Err(e) => {
                if let Err(kill_err) = self
                    .docker(&["rm".into(), "--force".into(), container_id.clone()])
                    .await
                {
                    warn!(container_id = %container_id, error = %kill_err, "failed to remove container");
                }
                Err(e)
            }
        }
    }

    async fn initiate_stop(&self, handle: &RuntimeHandle) -> Result<(), RuntimeError> {
        let id = Self::container_id(handle)?;
        let args = ["kill".into(), "--signal=SIGTERM".into(), id.to_string()];
        match self.docker(&args).await {
            Ok(_) => Ok(()),
            Err(e) if is_gone(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn wait_for_stopped(
        &self,
        ctx: &OpContext,
        handle: &RuntimeHandle,
    ) -> Result<(), RuntimeError> {
        let id = Self::container_id(handle)?;
        let stop_ctx = ctx.child(self.stop_timeout);
        let mut ticker = tokio::time::interval(self.polling_interval);
        let inspect = [
            "inspect".to_string(),
            "--format={{.State.Running}}".to_string(),
            id.to_string(),
        ];
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop_ctx.done() => {
                    return Err(RuntimeError::StopTimeout { target: format!("container {id}") });
                }
            }
            match self.docker(&inspect).await {
                Ok(running) if running == "true" => continue,
                Ok(_) => break,
                Err(e) if is_gone(&e) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        if let Err(e) = self.docker(&["rm".into(), id.to_string()]).await {
            if !is_gone(&e) {
                warn!(container_id = %id, error = %e, "failed to remove stopped container");
            }
        }
        Ok(())
    }

    async fn is_healthy(&self, handle: &RuntimeHandle) -> Result<bool, RuntimeError> {
        self.health.check(&handle.uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StaticHealthProbe;
    use shared_types::NodeId;

    fn launch() -> NodeLaunch {
        NodeLaunch {
            node_id: NodeId::new([5; 20]),
            data_dir: PathBuf::from("/nets/a/node"),
            flags_path: PathBuf::from("/nets/a/node/flags.json"),
            runtime_config: NodeRuntimeConfig::Container {
                image: "node:dev".into(),
                docker_path: "docker".into(),
                network_mode: "host".into(),
            },
            network_uuid: "uuid".into(),
            network_owner: "ci".into(),
            is_ephemeral: false,
        }
    }

    #[test]
    fn test_run_args_mount_data_dir_once() {
        let args = run_args(&launch(), "node:dev", "host");
        assert_eq!(args[0], "run");
        assert_eq!(
            args.iter().filter(|a| a.starts_with("--volume=")).count(),
            1
        );
        let image_at = args.iter().position(|a| a == "node:dev").unwrap();
        assert_eq!(args[image_at + 1], "--config-file=/nets/a/node/flags.json");
        assert_eq!(
            args[image_at + 2],
            "--process-context-file=/nets/a/node/process.json"
        );
        assert!(args.contains(&format!("--label=fleetnet.node-id={}", NodeId::new([5; 20]))));
    }

    #[test]
    fn test_run_args_mount_separate_flags_dir() {
        let mut launch = launch();
        launch.flags_path = PathBuf::from("/elsewhere/flags.json");
        let args = run_args(&launch, "node:dev", "bridge");
        assert!(args.contains(&"--volume=/elsewhere:/elsewhere".to_string()));
        assert!(args.contains(&"--network=bridge".to_string()));
    }

    #[tokio::test]
    async fn test_missing_cli_is_spawn_error() {
        let runtime = ContainerRuntime::new(
            "/nonexistent/docker",
            &OrchestratorConfig::default(),
            Arc::new(StaticHealthProbe(true)),
        );
        let ctx = OpContext::with_timeout(Duration::from_secs(1));
        let err = runtime.start(&ctx, &launch()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Spawn { .. }), "{err}");
    }
}
