//! Read-only view of everything a node exposes for inspection.

use braid_messages::{Block, BlockHeader, Transaction};
use braid_network::PeerView;
use braid_types::PeerId;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::context::NodeContext;

#[derive(Clone, Debug, Serialize)]
pub struct NodeSnapshot {
    pub id: PeerId,
    pub chain: Vec<Block>,
    pub headers: Vec<BlockHeader>,
    pub orphans: Vec<BlockHeader>,
    pub peers: BTreeMap<PeerId, PeerView>,
    pub mempool: Vec<Transaction>,
    /// Extra copies received per message id.
    pub redundancy: BTreeMap<String, u64>,
    pub drops: BTreeMap<&'static str, u64>,
    /// Link-level drops per message type.
    pub link_drops: BTreeMap<&'static str, u64>,
    pub queue_depths: BTreeMap<PeerId, usize>,
    pub link_capacity: u32,
    pub link_tokens: f64,
    pub offenses: BTreeMap<PeerId, u32>,
    pub blacklist: BTreeSet<PeerId>,
}

impl NodeContext {
    pub fn snapshot(&self) -> NodeSnapshot {
        let (chain, headers, orphans) = {
            let store = self.store.lock();
            (
                store.chain().to_vec(),
                store.headers().to_vec(),
                store.orphan_headers(),
            )
        };
        let (link_capacity, link_tokens) = {
            let link = self.link.lock();
            (link.capacity(), link.tokens())
        };
        let (offenses, blacklist) = {
            let reputation = self.reputation.lock();
            (reputation.offenses(), reputation.blacklist())
        };
        NodeSnapshot {
            id: self.id().clone(),
            chain,
            headers,
            orphans,
            peers: self.directory.lock().views(),
            mempool: self.mempool.lock().transactions().to_vec(),
            redundancy: self.seen.lock().redundancy(),
            drops: self.drops.by_reason(),
            link_drops: self.drops.link_by_kind(),
            queue_depths: self.outbox.lock().depths(),
            link_capacity,
            link_tokens,
            offenses,
            blacklist,
        }
    }
}
