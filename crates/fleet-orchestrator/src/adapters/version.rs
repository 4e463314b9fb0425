//! Protocol version probe running the binary itself.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::domain::VersionError;
use crate::ports::VersionProbe;

#[derive(Debug, Deserialize)]
struct VersionOutput {
    rpcchainvm: u64,
}

/// Runs `<exec> <args>` and reads `{"rpcchainvm": <n>}` from stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandVersionProbe;

#[async_trait]
impl VersionProbe for CommandVersionProbe {
    async fn rpc_version(&self, exec_path: &Path, args: &[String]) -> Result<u64, VersionError> {
        let output = Command::new(exec_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| VersionError::Spawn {
                command: exec_path.to_path_buf(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VersionError::Command {
                command: exec_path.to_path_buf(),
                output: format!("{stdout}{stderr}"),
            });
        }
        parse_version(exec_path, &stdout)
    }
}

fn parse_version(exec_path: &Path, stdout: &str) -> Result<u64, VersionError> {
    serde_json::from_str::<VersionOutput>(stdout.trim())
        .map(|v| v.rpcchainvm)
        .map_err(|e| VersionError::Parse {
            command: exec_path.to_path_buf(),
            reason: e.to_string(),
            output: stdout.to_string(),
        })
}
