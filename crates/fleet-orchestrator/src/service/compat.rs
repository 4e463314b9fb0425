//! Plugin protocol compatibility of VM binaries with the node binary.
//!
//! Best effort: the node enforces compatibility itself, so nothing here
//! blocks a start.

use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::domain::Subnet;
use crate::ports::VersionProbe;

/// Argument that makes the node binary print its versions as JSON.
pub const NODE_VERSION_ARG: &str = "--version-json";

/// A VM binary whose protocol version differs from the node's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub subnet: String,
    pub vm_path: PathBuf,
    pub node_version: u64,
    pub vm_version: u64,
}

/// Outcome of a compatibility check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompatReport {
    pub mismatches: Vec<VersionMismatch>,
    /// Binaries whose version could not be determined
    pub unchecked: Vec<PathBuf>,
}

impl CompatReport {
    pub fn is_compatible(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Compare the version of every chain's VM under `plugin_dir` with the
/// version of the node binary at `node_path`.
pub async fn check_vm_binaries(
    probe: &dyn VersionProbe,
    subnets: &[Subnet],
    node_path: &Path,
    plugin_dir: Option<&Path>,
) -> CompatReport {
    let mut report = CompatReport::default();
    if subnets.is_empty() {
        return report;
    }

    let node_version = match probe
        .rpc_version(node_path, &[NODE_VERSION_ARG.to_string()])
        .await
    {
        Ok(version) => version,
        Err(e) => {
            warn!(node_path = %node_path.display(), error = %e, "unable to check plugin protocol version of node binary");
            report.unchecked.push(node_path.to_path_buf());
            return report;
        }
    };

    for subnet in subnets {
        for chain in &subnet.chains {
            let vm_path = plugin_dir
                .unwrap_or_else(|| Path::new(""))
                .join(chain.vm_id.to_string());

            if !vm_path.exists() {
                warn!(subnet = %subnet.name, vm_path = %vm_path.display(), "unable to check plugin protocol version of missing VM binary");
                report.unchecked.push(vm_path);
                continue;
            }
            if chain.version_args.is_empty() {
                report.unchecked.push(vm_path);
                continue;
            }

            match probe.rpc_version(&vm_path, &chain.version_args).await {
                Ok(vm_version) if vm_version == node_version => {}
                Ok(vm_version) => {
                    error!(
                        subnet = %subnet.name,
                        node_path = %node_path.display(),
                        node_version,
                        vm_path = %vm_path.display(),
                        vm_version,
                        "unexpected plugin protocol version for VM binary"
                    );
                    report.mismatches.push(VersionMismatch {
                        subnet: subnet.name.clone(),
                        vm_path,
                        node_version,
                        vm_version,
                    });
                }
                Err(e) => {
                    warn!(subnet = %subnet.name, error = %e, "unable to check plugin protocol version of VM binary");
                    report.unchecked.push(vm_path);
                }
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Chain;
    use crate::test_utils::FakeVersionProbe;
    use shared_types::{NodeId, VmId};

    fn subnet_with(vm: &str, version_args: &[&str]) -> Subnet {
        let mut chain = Chain::new(VmId::from_name(vm), vec![]);
        chain.version_args = version_args.iter().map(|a| a.to_string()).collect();
        Subnet::new(vm, vec![NodeId::new([1; 20])]).with_chain(chain)
    }

    fn install(dir: &Path, vm: &str) -> PathBuf {
        let path = dir.join(VmId::from_name(vm).to_string());
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[tokio::test]
    async fn test_mismatch_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let good = install(tmp.path(), "good");
        let bad = install(tmp.path(), "bad");
        let probe = FakeVersionProbe::new();
        probe.set_version("/bin/node", 33);
        probe.set_version(&good, 33);
        probe.set_version(&bad, 34);

        let subnets = [
            subnet_with("good", &["--version"]),
            subnet_with("bad", &["--version"]),
        ];
        let report =
            check_vm_binaries(&probe, &subnets, Path::new("/bin/node"), Some(tmp.path())).await;

        assert!(!report.is_compatible());
        assert_eq!(
            report.mismatches,
            vec![VersionMismatch {
                subnet: "bad".into(),
                vm_path: bad,
                node_version: 33,
                vm_version: 34,
            }]
        );
        assert!(report.unchecked.is_empty());
    }

    #[tokio::test]
    async fn test_unverifiable_binaries_do_not_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let no_args = install(tmp.path(), "noargs");
        let probe = FakeVersionProbe::new();
        probe.set_version("/bin/node", 33);

        let subnets = [subnet_with("missing", &["--version"]), subnet_with("noargs", &[])];
        let report =
            check_vm_binaries(&probe, &subnets, Path::new("/bin/node"), Some(tmp.path())).await;

        assert!(report.is_compatible());
        assert_eq!(report.unchecked.len(), 2);
        assert!(report.unchecked.contains(&no_args));
    }

    #[tokio::test]
    async fn test_unknown_node_version_skips_vms() {
        let probe = FakeVersionProbe::new();
        let subnets = [subnet_with("vm", &["--version"])];
        let report = check_vm_binaries(&probe, &subnets, Path::new("/bin/node"), None).await;
        assert!(report.is_compatible());
        assert_eq!(report.unchecked, vec![PathBuf::from("/bin/node")]);
        assert!(probe.calls().iter().all(|(path, _)| path == Path::new("/bin/node")));
    }

    #[tokio::test]
    async fn test_no_subnets_probes_nothing() {
        let probe = FakeVersionProbe::new();
        let report = check_vm_binaries(&probe, &[], Path::new("/bin/node"), None).await;
        assert_eq!(report, CompatReport::default());
        assert!(probe.calls().is_empty());
    }
}
