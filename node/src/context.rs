//! Shared state of a running node.
//!
//! Every service sits behind its own lock so the listener, the delivery
//! workers and the periodic tasks can work on different parts concurrently.
//! Locks are short-lived and never held across an `.await`.

use braid_ledger::{BlockStore, OrphanPool, StoreEvent, StoreMode, TransactionPool};
use braid_network::{
    DropReason, DropStats, LinkSimulator, Outbox, PeerDirectory, Reputation, SeenCache,
    SlidingWindow, Transport,
};
use braid_types::{BlockHash, Clock, PeerAddress, PeerFlags, PeerId, Timestamp};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

use crate::config::{NodeConfig, PeerTableSink};
use crate::metrics::NodeMetrics;
use crate::pending::{PendingServes, DEFAULT_MAX_FETCH_ATTEMPTS};
use crate::NodeError;

/// Who this node is and how it behaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdentity {
    pub id: PeerId,
    pub address: PeerAddress,
    pub flags: PeerFlags,
    /// Generates blocks with forged ids.
    pub malicious: bool,
    /// Not part of the configured peer table.
    pub new_node: bool,
    pub fanout: usize,
}

impl NodeIdentity {
    /// Resolve the identity of `id` from the peer table. A node absent from
    /// the table listens on `127.0.0.1` and the port its id parses to.
    pub fn from_config(config: &NodeConfig, id: &PeerId) -> Result<Self, NodeError> {
        if let Some(entry) = config.own_entry(id) {
            return Ok(Self {
                id: id.clone(),
                address: entry.address(),
                flags: entry.flags(),
                malicious: entry.malicious,
                new_node: false,
                fanout: entry.fanout,
            });
        }
        let port = id.as_str().parse::<u16>().map_err(|_| {
            NodeError::Config(format!("peer '{id}' is not in the peer table and has no port"))
        })?;
        Ok(Self {
            id: id.clone(),
            address: PeerAddress::new("127.0.0.1", port),
            flags: PeerFlags::default(),
            malicious: false,
            new_node: true,
            fanout: braid_network::gossip::DEFAULT_FANOUT,
        })
    }

    pub fn is_light(&self) -> bool {
        self.flags.light
    }
}

/// External collaborators of a node. Production uses the system clock, TCP
/// and the config file; tests substitute controllable versions.
#[derive(Clone)]
pub struct NodePorts {
    pub clock: Arc<dyn Clock>,
    pub transport: Arc<dyn Transport>,
    pub peer_table: Arc<dyn PeerTableSink>,
}

pub struct NodeContext {
    pub identity: NodeIdentity,
    pub config: NodeConfig,

    pub directory: Mutex<PeerDirectory>,
    pub outbox: Mutex<Outbox>,
    pub seen: Mutex<SeenCache>,
    pub store: Mutex<BlockStore>,
    pub mempool: Mutex<TransactionPool>,
    pub reputation: Mutex<Reputation>,
    pub send_window: Mutex<SlidingWindow>,
    pub inbound_window: Mutex<SlidingWindow>,
    pub link: Mutex<LinkSimulator>,
    pub pending: Mutex<PendingServes>,
    pub rng: Mutex<StdRng>,

    pub drops: DropStats,
    pub metrics: Arc<NodeMetrics>,

    pub clock: Arc<dyn Clock>,
    pub transport: Arc<dyn Transport>,
    pub peer_table: Arc<dyn PeerTableSink>,

    /// Signalled whenever something is queued for delivery.
    pub outbox_ready: Notify,
    /// Blocks that became available since the pending requests were last served.
    ready_blocks: Arc<Mutex<Vec<BlockHash>>>,
    /// Set once the first block lands on the chain.
    chain_started: Arc<AtomicBool>,
}

impl NodeContext {
    pub fn new(
        identity: NodeIdentity,
        config: NodeConfig,
        ports: NodePorts,
    ) -> Result<Self, NodeError> {
        let now = ports.clock.now();
        let limits = &config.limits;

        let mut directory = PeerDirectory::new(identity.id.clone());
        for (id, peer) in config.bootstrap_peers(&identity.id) {
            directory.add_bootstrap(id.clone(), peer.address(), peer.flags(), now);
        }

        let mode = if identity.is_light() {
            StoreMode::Light
        } else {
            StoreMode::Full
        };
        let mut store = BlockStore::new(mode, OrphanPool::new(limits.orphan_capacity));

        let metrics = Arc::new(NodeMetrics::new()?);
        let ready_blocks = Arc::new(Mutex::new(Vec::new()));
        let chain_started = Arc::new(AtomicBool::new(false));
        {
            let metrics = Arc::clone(&metrics);
            let ready_blocks = Arc::clone(&ready_blocks);
            let chain_started = Arc::clone(&chain_started);
            store.subscribe(Box::new(move |event: &StoreEvent| match event {
                StoreEvent::Accepted { block_id, height }
                | StoreEvent::Promoted { block_id, height } => {
                    metrics.blocks_accepted.inc();
                    metrics.chain_height.set(*height as i64);
                    chain_started.store(true, Ordering::Release);
                    ready_blocks.lock().push(*block_id);
                }
                StoreEvent::Orphaned { .. } => metrics.orphans_held.inc(),
                StoreEvent::Rejected { block_id, reason } => {
                    warn!(block = %block_id, %reason, "block rejected by store");
                }
            }));
        }

        Ok(Self {
            directory: Mutex::new(directory),
            outbox: Mutex::new(Outbox::new(limits.outbox_config())),
            seen: Mutex::new(SeenCache::new(limits.seen_expiry())),
            store: Mutex::new(store),
            mempool: Mutex::new(TransactionPool::new()),
            reputation: Mutex::new(Reputation::new(limits.offense_threshold)),
            send_window: Mutex::new(SlidingWindow::new(
                limits.send_rate_limit,
                limits.send_rate_window(),
            )),
            inbound_window: Mutex::new(SlidingWindow::new(
                limits.inbound_rate_limit,
                limits.inbound_rate_window(),
            )),
            link: Mutex::new(LinkSimulator::new(config.link.params(), now)),
            pending: Mutex::new(PendingServes::new(
                DEFAULT_MAX_FETCH_ATTEMPTS,
                limits.retry_interval(),
            )),
            rng: Mutex::new(StdRng::from_entropy()),
            drops: DropStats::new(),
            metrics,
            clock: ports.clock,
            transport: ports.transport,
            peer_table: ports.peer_table,
            outbox_ready: Notify::new(),
            ready_blocks,
            chain_started,
            identity,
            config,
        })
    }

    pub fn id(&self) -> &PeerId {
        &self.identity.id
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn is_light(&self) -> bool {
        self.identity.is_light()
    }

    pub fn chain_started(&self) -> bool {
        self.chain_started.load(Ordering::Acquire)
    }

    /// Drain the ids of blocks stored since the last call.
    pub(crate) fn take_ready_blocks(&self) -> Vec<BlockHash> {
        std::mem::take(&mut *self.ready_blocks.lock())
    }

    /// Count a dropped message.
    pub fn record_drop(&self, reason: DropReason) {
        self.drops.record(reason);
        self.metrics.messages_dropped.inc();
    }

    /// Refresh the gauges that are not driven by store events.
    pub fn refresh_gauges(&self) {
        self.metrics.peer_count.set(self.directory.lock().len() as i64);
        self.metrics.mempool_size.set(self.mempool.lock().len() as i64);
        self.metrics
            .orphan_count
            .set(self.store.lock().orphan_count() as i64);
        self.metrics
            .outbox_depth
            .set(self.outbox.lock().total_len() as i64);
    }

    /// Forward a peer-table addition to the sink, logging failures.
    pub(crate) fn notify_peer_added(&self, id: &PeerId, address: &PeerAddress, flags: PeerFlags) {
        if let Err(e) = self.peer_table.peer_added(id, address, flags) {
            warn!(peer = %id, error = %e, "failed to record new peer");
        }
    }

    pub(crate) fn notify_peer_removed(&self, id: &PeerId) {
        if let Err(e) = self.peer_table.peer_removed(id) {
            warn!(peer = %id, error = %e, "failed to record peer removal");
        }
    }
}
