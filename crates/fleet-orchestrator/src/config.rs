//! Orchestrator configuration.
//!
//! Every knob that would otherwise be process-wide state lives here and is
//! threaded through `NetworkController::new`.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use shared_types::FlagsMap;

use crate::domain::flag_keys;

/// Configuration for network orchestration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Directory under which network directories are created
    pub root_dir: PathBuf,

    /// Interval between health polling rounds
    pub health_check_interval: Duration,

    /// Interval for other periodic polling (validator activation, process
    /// context, stop confirmation)
    pub polling_interval: Duration,

    /// Default bound for bringing a whole network up
    pub network_timeout: Duration,

    /// Bound for a started node to publish its process context
    pub process_context_timeout: Duration,

    /// Bound for a stopped node to exit
    pub stop_timeout: Duration,

    /// Size of the generated pre-funded key pool
    pub pre_funded_key_count: usize,

    /// Node count of `Network::new_default`
    pub default_node_count: usize,

    /// Network id of a generated genesis
    pub default_network_id: u32,

    /// Stake weight of each initial staker in a generated genesis
    pub validator_weight: u64,

    /// Flags applied to every node after all other layers
    pub default_flags: FlagsMap,

    /// Primary chain configuration merged into every network
    pub default_chain_configs: BTreeMap<String, FlagsMap>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            health_check_interval: Duration::from_millis(200),
            polling_interval: Duration::from_millis(500),
            network_timeout: Duration::from_secs(4 * 60),
            process_context_timeout: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(30),
            pre_funded_key_count: 50,
            default_node_count: 2,
            default_network_id: 88888,
            validator_weight: 2_000_000_000_000,
            default_flags: default_node_flags(),
            default_chain_configs: default_chain_configs(),
        }
    }
}

impl OrchestratorConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FLEET_ROOT_DIR`: Network root (default: ~/.fleetnet/networks)
    /// - `FLEET_HEALTH_CHECK_INTERVAL_MS`: Health polling interval (default: 200)
    /// - `FLEET_POLLING_INTERVAL_MS`: General polling interval (default: 500)
    /// - `FLEET_NETWORK_TIMEOUT_SECS`: Network start bound (default: 240)
    /// - `FLEET_PRE_FUNDED_KEY_COUNT`: Generated key pool size (default: 50)
    /// - `FLEET_NODE_COUNT`: Default node count (default: 2)
    /// - `FLEET_NETWORK_ID`: Generated genesis network id (default: 88888)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// Unparsable values and zero polling intervals fall back to the
    /// default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            root_dir: lookup("FLEET_ROOT_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.root_dir),

            health_check_interval: parsed("FLEET_HEALTH_CHECK_INTERVAL_MS")
                .filter(|v| *v > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.health_check_interval),

            polling_interval: parsed("FLEET_POLLING_INTERVAL_MS")
                .filter(|v| *v > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.polling_interval),

            network_timeout: parsed("FLEET_NETWORK_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.network_timeout),

            pre_funded_key_count: parsed("FLEET_PRE_FUNDED_KEY_COUNT")
                .map(|v| v as usize)
                .unwrap_or(defaults.pre_funded_key_count),

            default_node_count: parsed("FLEET_NODE_COUNT")
                .map(|v| v as usize)
                .unwrap_or(defaults.default_node_count),

            default_network_id: parsed("FLEET_NETWORK_ID")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.default_network_id),

            ..defaults
        }
    }

    /// Path of the reusable-network symlink for `owner`.
    pub fn reusable_network_path_for_owner(&self, owner: &str) -> PathBuf {
        self.root_dir.join(format!("latest_{owner}"))
    }
}

fn default_root_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(env::temp_dir)
        .join(".fleetnet")
        .join("networks")
}

/// Timing knobs that let a small local network converge quickly.
pub fn default_node_flags() -> FlagsMap {
    [
        (flag_keys::NETWORK_PEER_LIST_PULL_GOSSIP_FREQ, json!("250ms")),
        (flag_keys::NETWORK_MAX_RECONNECT_DELAY, json!("1s")),
        (flag_keys::HEALTH_CHECK_FREQ, json!("500ms")),
        (flag_keys::ADMIN_API_ENABLED, json!(true)),
        (flag_keys::INDEX_ENABLED, json!(true)),
    ]
    .into_iter()
    .collect()
}

/// Non-default primary chain configuration suitable for testing.
pub fn default_chain_configs() -> BTreeMap<String, FlagsMap> {
    let c_chain: FlagsMap = [
        ("warp-api-enabled", json!(true)),
        ("log-level", json!("info")),
    ]
    .into_iter()
    .collect();
    BTreeMap::from([("C".to_string(), c_chain)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.health_check_interval, Duration::from_millis(200));
        assert_eq!(config.network_timeout, Duration::from_secs(240));
        assert_eq!(config.pre_funded_key_count, 50);
        assert_eq!(config.default_network_id, 88888);
        assert!(config.root_dir.ends_with(".fleetnet/networks"));
        assert_eq!(config.default_flags.len(), 5);
        assert!(config.default_chain_configs.contains_key("C"));
    }

    #[test]
    fn test_env_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("FLEET_ROOT_DIR", "/tmp/fleet"),
            ("FLEET_HEALTH_CHECK_INTERVAL_MS", "50"),
            ("FLEET_NETWORK_ID", "1337"),
            ("FLEET_NODE_COUNT", "bogus"),
        ]));
        assert_eq!(config.root_dir, PathBuf::from("/tmp/fleet"));
        assert_eq!(config.health_check_interval, Duration::from_millis(50));
        assert_eq!(config.default_network_id, 1337);
        assert_eq!(config.default_node_count, 2);
    }

    #[test]
    fn test_zero_intervals_fall_back_to_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("FLEET_HEALTH_CHECK_INTERVAL_MS", "0"),
            ("FLEET_POLLING_INTERVAL_MS", "0"),
        ]));
        let defaults = OrchestratorConfig::default();
        assert_eq!(config.health_check_interval, defaults.health_check_interval);
        assert_eq!(config.polling_interval, defaults.polling_interval);
        assert!(!config.health_check_interval.is_zero());
    }

    #[test]
    fn test_reusable_network_path() {
        let config = OrchestratorConfig {
            root_dir: PathBuf::from("/data/networks"),
            ..OrchestratorConfig::default()
        };
        assert_eq!(
            config.reusable_network_path_for_owner("ci"),
            PathBuf::from("/data/networks/latest_ci")
        );
    }
}
