//! Node configuration with TOML file support.
//!
//! One file describes the whole simulated network: the `peers` table maps
//! every bootstrap peer id to its address and flags, and the remaining
//! sections tune limits, the simulated link and task timing. A node looks
//! itself up in `peers` by id; a missing entry marks it as a new node.

use braid_network::{LinkParams, LivenessPolicy, OutboxConfig};
use braid_types::{PeerAddress, PeerFlags, PeerId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::NodeError;

/// Configuration for a braid node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bootstrap peer table, keyed by peer id.
    #[serde(default)]
    pub peers: BTreeMap<PeerId, PeerConfig>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Number of tasks draining the outbound queues.
    #[serde(default = "default_delivery_workers")]
    pub delivery_workers: usize,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub timing: TimingConfig,
}

/// One row of the peer table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    #[serde(default = "default_ip")]
    pub ip: String,
    pub port: u16,
    /// Gossip fan-out used by this peer.
    #[serde(default = "default_fanout")]
    pub fanout: usize,
    #[serde(default)]
    pub nat: bool,
    #[serde(default)]
    pub light: bool,
    /// Generates blocks with forged ids.
    #[serde(default)]
    pub malicious: bool,
}

impl PeerConfig {
    pub fn address(&self) -> PeerAddress {
        PeerAddress::new(self.ip.clone(), self.port)
    }

    pub fn flags(&self) -> PeerFlags {
        PeerFlags {
            nat: self.nat,
            light: self.light,
        }
    }
}

/// Rate limits, queue bounds, retry policy and cache lifetimes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_rate_limit")]
    pub send_rate_limit: usize,
    #[serde(default = "default_rate_window_secs")]
    pub send_rate_window_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_queue_ttl_secs")]
    pub queue_ttl_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,
    #[serde(default = "default_offense_threshold")]
    pub offense_threshold: u32,
    #[serde(default = "default_seen_expiry_secs")]
    pub seen_expiry_secs: u64,
    #[serde(default = "default_rate_limit")]
    pub inbound_rate_limit: usize,
    #[serde(default = "default_rate_window_secs")]
    pub inbound_rate_window_secs: u64,
    #[serde(default = "default_orphan_capacity")]
    pub orphan_capacity: usize,
    #[serde(default = "default_orphan_expiry_secs")]
    pub orphan_expiry_secs: u64,
}

/// Behaviour of the simulated link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_drop_probability")]
    pub drop_probability: f64,
    #[serde(default = "default_latency_min_ms")]
    pub latency_min_ms: u64,
    #[serde(default = "default_latency_max_ms")]
    pub latency_max_ms: u64,
    /// Initial sends per second.
    #[serde(default = "default_capacity")]
    pub capacity: u32,
    #[serde(default = "default_min_capacity")]
    pub min_capacity: u32,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u32,
    #[serde(default = "default_adjust_min_secs")]
    pub adjust_min_secs: u64,
    #[serde(default = "default_adjust_max_secs")]
    pub adjust_max_secs: u64,
}

/// Periods and timeouts of the background tasks, in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_ping_secs")]
    pub ping_secs: u64,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_removal_secs")]
    pub removal_secs: u64,
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_secs: u64,
    #[serde(default = "default_hello_secs")]
    pub hello_secs: u64,
    #[serde(default = "default_inventory_secs")]
    pub inventory_secs: u64,
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,
    #[serde(default = "default_tx_secs")]
    pub tx_secs: u64,
    /// How long block generation waits for sync before creating a genesis.
    #[serde(default = "default_sync_wait_secs")]
    pub sync_wait_secs: u64,
    /// Period of GET_LATEST_BLOCK requests.
    #[serde(default = "default_sync_secs")]
    pub sync_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_delivery_workers() -> usize {
    2
}

fn default_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_fanout() -> usize {
    braid_network::gossip::DEFAULT_FANOUT
}

fn default_rate_limit() -> usize {
    10
}

fn default_rate_window_secs() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    50
}

fn default_queue_ttl_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_interval_secs() -> u64 {
    5
}

fn default_offense_threshold() -> u32 {
    braid_network::reputation::DEFAULT_OFFENSE_THRESHOLD
}

fn default_seen_expiry_secs() -> u64 {
    600
}

fn default_orphan_capacity() -> usize {
    braid_ledger::DEFAULT_ORPHAN_CAPACITY
}

fn default_orphan_expiry_secs() -> u64 {
    braid_ledger::DEFAULT_ORPHAN_EXPIRY.as_secs()
}

fn default_drop_probability() -> f64 {
    0.05
}

fn default_latency_min_ms() -> u64 {
    20
}

fn default_latency_max_ms() -> u64 {
    100
}

fn default_capacity() -> u32 {
    braid_network::throttle::DEFAULT_LINK_CAPACITY
}

fn default_min_capacity() -> u32 {
    braid_network::throttle::DEFAULT_MIN_CAPACITY
}

fn default_max_capacity() -> u32 {
    braid_network::throttle::DEFAULT_MAX_CAPACITY
}

fn default_adjust_min_secs() -> u64 {
    30
}

fn default_adjust_max_secs() -> u64 {
    60
}

fn default_ping_secs() -> u64 {
    5
}

fn default_ping_timeout_secs() -> u64 {
    10
}

fn default_removal_secs() -> u64 {
    180
}

fn default_cleanup_secs() -> u64 {
    30
}

fn default_hello_secs() -> u64 {
    30
}

fn default_inventory_secs() -> u64 {
    10
}

fn default_block_secs() -> u64 {
    20
}

fn default_tx_secs() -> u64 {
    15
}

fn default_sync_wait_secs() -> u64 {
    30
}

fn default_sync_secs() -> u64 {
    30
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the background tasks cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let t = &self.timing;
        let periods = [
            ("timing.ping_secs", t.ping_secs),
            ("timing.cleanup_secs", t.cleanup_secs),
            ("timing.hello_secs", t.hello_secs),
            ("timing.inventory_secs", t.inventory_secs),
            ("timing.block_secs", t.block_secs),
            ("timing.tx_secs", t.tx_secs),
            ("timing.sync_secs", t.sync_secs),
            ("link.adjust_min_secs", self.link.adjust_min_secs),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, secs)| *secs == 0) {
            return Err(NodeError::Config(format!("{name} must be greater than zero")));
        }
        Ok(())
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// This node's row in the peer table, if present.
    pub fn own_entry(&self, id: &PeerId) -> Option<&PeerConfig> {
        self.peers.get(id)
    }

    /// Whether `id` is absent from the peer table.
    pub fn is_new_node(&self, id: &PeerId) -> bool {
        !self.peers.contains_key(id)
    }

    /// Every other peer in the table.
    pub fn bootstrap_peers<'a>(
        &'a self,
        self_id: &'a PeerId,
    ) -> impl Iterator<Item = (&'a PeerId, &'a PeerConfig)> + 'a {
        self.peers.iter().filter(move |(id, _)| *id != self_id)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            peers: BTreeMap::new(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            delivery_workers: default_delivery_workers(),
            limits: LimitsConfig::default(),
            link: LinkConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl LimitsConfig {
    pub fn outbox_config(&self) -> OutboxConfig {
        OutboxConfig {
            capacity: self.queue_capacity,
            ttl: Duration::from_secs(self.queue_ttl_secs),
            max_retries: self.max_retries,
            retry_interval: Duration::from_secs(self.retry_interval_secs),
        }
    }

    pub fn send_rate_window(&self) -> Duration {
        Duration::from_secs(self.send_rate_window_secs)
    }

    pub fn inbound_rate_window(&self) -> Duration {
        Duration::from_secs(self.inbound_rate_window_secs)
    }

    pub fn seen_expiry(&self) -> Duration {
        Duration::from_secs(self.seen_expiry_secs)
    }

    pub fn orphan_expiry(&self) -> Duration {
        Duration::from_secs(self.orphan_expiry_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            send_rate_limit: default_rate_limit(),
            send_rate_window_secs: default_rate_window_secs(),
            queue_capacity: default_queue_capacity(),
            queue_ttl_secs: default_queue_ttl_secs(),
            max_retries: default_max_retries(),
            retry_interval_secs: default_retry_interval_secs(),
            offense_threshold: default_offense_threshold(),
            seen_expiry_secs: default_seen_expiry_secs(),
            inbound_rate_limit: default_rate_limit(),
            inbound_rate_window_secs: default_rate_window_secs(),
            orphan_capacity: default_orphan_capacity(),
            orphan_expiry_secs: default_orphan_expiry_secs(),
        }
    }
}

impl LinkConfig {
    pub fn params(&self) -> LinkParams {
        LinkParams {
            drop_probability: self.drop_probability,
            latency_min: Duration::from_millis(self.latency_min_ms),
            latency_max: Duration::from_millis(self.latency_max_ms),
            capacity: self.capacity,
            min_capacity: self.min_capacity,
            max_capacity: self.max_capacity,
            adjust_min: Duration::from_secs(self.adjust_min_secs),
            adjust_max: Duration::from_secs(self.adjust_max_secs),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            drop_probability: default_drop_probability(),
            latency_min_ms: default_latency_min_ms(),
            latency_max_ms: default_latency_max_ms(),
            capacity: default_capacity(),
            min_capacity: default_min_capacity(),
            max_capacity: default_max_capacity(),
            adjust_min_secs: default_adjust_min_secs(),
            adjust_max_secs: default_adjust_max_secs(),
        }
    }
}

impl TimingConfig {
    pub fn liveness_policy(&self) -> LivenessPolicy {
        LivenessPolicy {
            ping_timeout: Duration::from_secs(self.ping_timeout_secs),
            removal_timeout: Duration::from_secs(self.removal_secs),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ping_secs: default_ping_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            removal_secs: default_removal_secs(),
            cleanup_secs: default_cleanup_secs(),
            hello_secs: default_hello_secs(),
            inventory_secs: default_inventory_secs(),
            block_secs: default_block_secs(),
            tx_secs: default_tx_secs(),
            sync_wait_secs: default_sync_wait_secs(),
            sync_secs: default_sync_secs(),
        }
    }
}

// ── Peer-table sink ────────────────────────────────────────────────────

/// Receives peer-table changes discovered at runtime.
pub trait PeerTableSink: Send + Sync {
    fn peer_added(&self, id: &PeerId, address: &PeerAddress, flags: PeerFlags)
        -> Result<(), NodeError>;
    fn peer_removed(&self, id: &PeerId) -> Result<(), NodeError>;
}

/// Discards every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopPeerTable;

impl PeerTableSink for NoopPeerTable {
    fn peer_added(&self, _: &PeerId, _: &PeerAddress, _: PeerFlags) -> Result<(), NodeError> {
        Ok(())
    }

    fn peer_removed(&self, _: &PeerId) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Keeps the `peers` table of a TOML config file in step with the directory.
///
/// Every change re-reads the file, edits the table and writes it back, so
/// other sections and concurrent edits by other nodes are preserved.
pub struct TomlPeerTable {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlPeerTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn update(&self, edit: impl FnOnce(&mut BTreeMap<PeerId, PeerConfig>)) -> Result<(), NodeError> {
        let _guard = self.write_lock.lock();
        let mut config = NodeConfig::from_toml_file(&self.path)?;
        edit(&mut config.peers);
        std::fs::write(&self.path, config.to_toml_string()?)?;
        Ok(())
    }
}

impl PeerTableSink for TomlPeerTable {
    fn peer_added(
        &self,
        id: &PeerId,
        address: &PeerAddress,
        flags: PeerFlags,
    ) -> Result<(), NodeError> {
        self.update(|peers| {
            peers.entry(id.clone()).or_insert_with(|| PeerConfig {
                ip: address.ip.clone(),
                port: address.port,
                fanout: default_fanout(),
                nat: flags.nat,
                light: flags.light,
                malicious: false,
            });
        })
    }

    fn peer_removed(&self, id: &PeerId) -> Result<(), NodeError> {
        self.update(|peers| {
            peers.remove(id);
        })
    }
}
