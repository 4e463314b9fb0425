//! Names of the node flags the orchestrator reads or writes.

/// Stringified effective network id. Always computed.
pub const NETWORK_ID: &str = "network-id";
/// Comma-joined node ids of running peers. Always computed.
pub const BOOTSTRAP_IDS: &str = "bootstrap-ids";
/// Comma-joined staking addresses of running peers. Always computed.
pub const BOOTSTRAP_IPS: &str = "bootstrap-ips";

pub const GENESIS_FILE_CONTENT: &str = "genesis-file-content";
pub const SUBNET_CONFIG_CONTENT: &str = "subnet-config-content";
pub const CHAIN_CONFIG_CONTENT: &str = "chain-config-content";

pub const SYBIL_PROTECTION_ENABLED: &str = "sybil-protection-enabled";
pub const TRACK_SUBNETS: &str = "track-subnets";

pub const DATA_DIR: &str = "data-dir";
pub const PLUGIN_DIR: &str = "plugin-dir";
pub const HTTP_PORT: &str = "http-port";
pub const STAKING_PORT: &str = "staking-port";

/// Base64 seed of the node's ed25519 staking key.
pub const STAKING_KEY_CONTENT: &str = "staking-ed25519-key-file-content";

pub const NETWORK_PEER_LIST_PULL_GOSSIP_FREQ: &str = "network-peer-list-pull-gossip-frequency";
pub const NETWORK_MAX_RECONNECT_DELAY: &str = "network-max-reconnect-delay";
pub const HEALTH_CHECK_FREQ: &str = "health-check-frequency";
pub const ADMIN_API_ENABLED: &str = "api-admin-enabled";
pub const INDEX_ENABLED: &str = "index-enabled";
