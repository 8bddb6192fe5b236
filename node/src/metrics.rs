//! Prometheus metrics for the braid node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]; [`NodeMetrics::encode`]
//! renders it in the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

/// Central collection of all node-level Prometheus metrics.
pub struct NodeMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Inbound messages that passed decoding.
    pub messages_received: IntCounter,
    /// Inbound messages routed to a handler.
    pub messages_dispatched: IntCounter,
    /// Messages dropped anywhere in the pipeline.
    pub messages_dropped: IntCounter,
    /// Blocks appended to the chain, including promoted orphans.
    pub blocks_accepted: IntCounter,
    /// Blocks parked in the orphan pool.
    pub orphans_held: IntCounter,
    pub offenses: IntCounter,
    pub bans: IntCounter,
    pub sends_ok: IntCounter,
    pub sends_failed: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub peer_count: IntGauge,
    pub chain_height: IntGauge,
    pub mempool_size: IntGauge,
    pub orphan_count: IntGauge,
    pub outbox_depth: IntGauge,
}

impl NodeMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| {
            register_int_counter_with_registry!(Opts::new(name, help), registry)
        };
        let messages_received = counter(
            "braid_messages_received_total",
            "Inbound messages decoded by this node",
        )?;
        let messages_dispatched = counter(
            "braid_messages_dispatched_total",
            "Inbound messages routed to a handler",
        )?;
        let messages_dropped = counter(
            "braid_messages_dropped_total",
            "Messages dropped for any reason",
        )?;
        let blocks_accepted = counter(
            "braid_blocks_accepted_total",
            "Blocks appended to the local chain",
        )?;
        let orphans_held = counter(
            "braid_orphans_held_total",
            "Blocks parked while their parent is missing",
        )?;
        let offenses = counter("braid_offenses_total", "Offenses recorded against peers")?;
        let bans = counter("braid_bans_total", "Peers blacklisted")?;
        let sends_ok = counter("braid_sends_ok_total", "Successful outbound sends")?;
        let sends_failed = counter("braid_sends_failed_total", "Failed outbound sends")?;

        let gauge = |name: &str, help: &str| {
            register_int_gauge_with_registry!(Opts::new(name, help), registry)
        };
        let peer_count = gauge("braid_peer_count", "Peers in the directory")?;
        let chain_height = gauge("braid_chain_height", "Height of the chain tip")?;
        let mempool_size = gauge("braid_mempool_size", "Pending transactions")?;
        let orphan_count = gauge("braid_orphan_count", "Blocks waiting for a parent")?;
        let outbox_depth = gauge("braid_outbox_depth", "Messages waiting to be sent")?;

        Ok(Self {
            registry,
            messages_received,
            messages_dispatched,
            messages_dropped,
            blocks_accepted,
            orphans_held,
            offenses,
            bans,
            sends_ok,
            sends_failed,
            peer_count,
            chain_height,
            mempool_size,
            orphan_count,
            outbox_depth,
        })
    }

    /// Render every metric in the text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
