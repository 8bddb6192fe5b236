//! Chain synchronisation: the header window exchange, bulk block batches for
//! lagging peers, and the requests a node issues to catch up.

use braid_messages::{
    BlockBatchMsg, BlockHeader, BlockHeadersMsg, GetBlockHeadersMsg, GetLatestBlockMsg,
    GetMempoolMsg, GetPeersMsg, Message,
};
use braid_types::{BlockHash, MessageId, PeerId, Timestamp};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::context::NodeContext;
use crate::NodeError;

/// Heights covered by one GET_BLOCK_HEADERS request.
pub const HEADER_WINDOW: u64 = 100;
/// Most blocks carried by one BLOCK_BATCH.
pub const BLOCK_BATCH_LIMIT: usize = 50;
/// A peer further behind than this is served a BLOCK_BATCH instead of the tip.
pub const LAG_THRESHOLD: u64 = 50;
/// Recent blocks pushed to a joining node along with its first headers.
pub const NEW_NODE_PUSH_DEPTH: u64 = 10;
/// Peers asked for their directory by a joining node.
pub const PEER_LIST_FANOUT: usize = 3;

impl NodeContext {
    // ── Requests ───────────────────────────────────────────────────────

    /// Ask every known peer for the first header window. A node that is new
    /// to the network also asks for a mempool and for peer lists.
    pub fn request_initial_sync(&self) {
        let request = self.headers_request(0, HEADER_WINDOW - 1);
        let sent = self.broadcast(&request, &[]);
        info!(peers = sent, new_node = self.identity.new_node, "requested initial headers");

        if !self.identity.new_node {
            return;
        }
        let first_peers: Vec<PeerId> = self
            .directory
            .lock()
            .peer_ids()
            .into_iter()
            .take(PEER_LIST_FANOUT)
            .collect();
        let mempool_source = {
            let mut rng = self.rng.lock();
            rand::seq::SliceRandom::choose(first_peers.as_slice(), &mut *rng).cloned()
        };
        if let Some(peer) = mempool_source {
            let request = Message::GetMempool(GetMempoolMsg {
                sender_id: self.id().clone(),
                message_id: MessageId::random(),
            });
            let _ = self.enqueue(&peer, request);
        }
        self.request_peer_lists();
    }

    /// Ask up to three random peers for their directory.
    pub fn request_peer_lists(&self) {
        let targets = {
            let directory = self.directory.lock();
            let mut rng = self.rng.lock();
            directory.random_peers(PEER_LIST_FANOUT, &mut *rng)
        };
        let request = Message::GetPeers(GetPeersMsg {
            sender_id: self.id().clone(),
            message_id: MessageId::random(),
        });
        for peer in targets {
            let _ = self.enqueue(&peer, request.clone());
        }
    }

    /// Report the local tip height to a random peer, which answers with its
    /// latest block or a batch when this node lags behind.
    pub fn request_latest_block(&self) -> Option<PeerId> {
        let current_height = self.store.lock().tip_height();
        let request = Message::GetLatestBlock(GetLatestBlockMsg {
            sender_id: self.id().clone(),
            current_height,
            is_new_node: self.identity.new_node,
            message_id: MessageId::random(),
        });
        self.send_to_random(request, &[])
    }

    fn headers_request(&self, start_height: u64, end_height: u64) -> Message {
        Message::GetBlockHeaders(GetBlockHeadersMsg {
            sender_id: self.id().clone(),
            start_height,
            end_height,
            is_new_node: self.identity.new_node,
            message_id: MessageId::random(),
        })
    }

    // ── Handlers ───────────────────────────────────────────────────────

    pub(crate) fn on_get_block_headers(&self, m: GetBlockHeadersMsg) {
        let (headers, push) = {
            let store = self.store.lock();
            let headers = store.headers_in_range(m.start_height, m.end_height);
            let push = (m.is_new_node && m.start_height == 0 && !self.is_light())
                .then(|| store.tip_height())
                .flatten()
                .map(|tip| {
                    let from = if tip >= NEW_NODE_PUSH_DEPTH {
                        tip - NEW_NODE_PUSH_DEPTH + 1
                    } else {
                        0
                    };
                    (store.blocks_from_height(from, BLOCK_BATCH_LIMIT).0, tip)
                });
            (headers, push)
        };

        let end_height = headers
            .iter()
            .map(|h| h.height)
            .max()
            .map_or(m.end_height, |top| top.min(m.end_height));
        debug!(
            peer = %m.sender_id,
            start = m.start_height,
            end = end_height,
            count = headers.len(),
            "serving headers"
        );
        let reply = Message::BlockHeaders(BlockHeadersMsg {
            sender_id: self.id().clone(),
            headers,
            is_full_chain: m.is_new_node,
            start_height: m.start_height,
            end_height,
            message_id: MessageId::random(),
        });
        let _ = self.enqueue(&m.sender_id, reply);

        if let Some((blocks, tip)) = push {
            if blocks.is_empty() {
                return;
            }
            info!(peer = %m.sender_id, count = blocks.len(), "pushing recent blocks to new node");
            let batch = Message::BlockBatch(BlockBatchMsg {
                sender_id: self.id().clone(),
                blocks,
                has_more: false,
                next_height: tip,
                message_id: MessageId::random(),
            });
            let _ = self.enqueue(&m.sender_id, batch);
        }
    }

    pub(crate) fn on_block_headers(&self, m: BlockHeadersMsg, now: Timestamp) -> Result<(), NodeError> {
        if m.headers.is_empty() {
            debug!(peer = %m.sender_id, "empty header window");
            return Ok(());
        }
        if !m.is_full_chain && !self.headers_connect(&m.headers) {
            warn!(peer = %m.sender_id, "discarding headers that do not connect to local chain");
            return Ok(());
        }

        if self.is_light() {
            let mut headers = m.headers;
            headers.sort_by_key(|h| h.height);
            let mut store = self.store.lock();
            for header in headers {
                let id = header.block_id;
                if let Err(e) = store.import_header(header, now) {
                    debug!(header = %id, error = %e, "header not imported");
                }
            }
            return Ok(());
        }

        let missing: Vec<BlockHash> = {
            let store = self.store.lock();
            m.headers
                .iter()
                .map(|h| h.block_id)
                .filter(|id| !store.knows(id))
                .collect()
        };
        if missing.is_empty() {
            return Ok(());
        }
        debug!(peer = %m.sender_id, missing = missing.len(), "requesting blocks for headers");
        self.request_blocks(&m.sender_id, missing);

        if m.is_full_chain && m.end_height != u64::MAX {
            let next_start = m.end_height + 1;
            let request = self.headers_request(next_start, next_start + HEADER_WINDOW - 1);
            let _ = self.enqueue(&m.sender_id, request);
        }
        Ok(())
    }

    /// Whether every header's parent is known locally or within the window.
    fn headers_connect(&self, headers: &[BlockHeader]) -> bool {
        let in_window: HashSet<BlockHash> = headers.iter().map(|h| h.block_id).collect();
        let store = self.store.lock();
        headers.iter().all(|h| match &h.previous_block_id {
            None => true,
            Some(parent) => in_window.contains(parent) || store.knows(parent),
        })
    }

    pub(crate) fn on_block_batch(&self, m: BlockBatchMsg, now: Timestamp) -> Result<(), NodeError> {
        let total = m.blocks.len();
        let mut stored = 0;
        for block in m.blocks {
            match self.store_block(block, now) {
                Ok(Some(_)) => stored += 1,
                Ok(None) => {}
                Err(e) => debug!(error = %e, "batch block not stored"),
            }
        }
        info!(peer = %m.sender_id, stored, total, more = m.has_more, "block batch processed");

        if m.has_more && m.next_height > 0 {
            let request = Message::GetLatestBlock(GetLatestBlockMsg {
                sender_id: self.id().clone(),
                current_height: Some(m.next_height),
                is_new_node: true,
                message_id: MessageId::random(),
            });
            let _ = self.enqueue(&m.sender_id, request);
        }
        Ok(())
    }

    pub(crate) fn on_get_latest_block(&self, m: GetLatestBlockMsg) {
        if self.is_light() {
            return;
        }
        let reply = {
            let store = self.store.lock();
            let Some(tip) = store.tip_height() else {
                debug!(peer = %m.sender_id, "no blocks to serve");
                return;
            };
            // Heights the requester is missing, counting genesis for an empty chain.
            let start = m.current_height.map_or(0, |h| h.saturating_add(1));
            let missing = (tip + 1).saturating_sub(start);
            if missing > LAG_THRESHOLD {
                let (blocks, has_more) = store.blocks_from_height(start, BLOCK_BATCH_LIMIT);
                let next_height = blocks.last().map_or(tip, |b| b.height);
                Message::BlockBatch(BlockBatchMsg {
                    sender_id: self.id().clone(),
                    blocks,
                    has_more,
                    next_height,
                    message_id: MessageId::random(),
                })
            } else {
                match store.latest_block() {
                    Some(block) => Message::Block(block.clone()),
                    None => return,
                }
            }
        };
        let _ = self.enqueue(&m.sender_id, reply);
    }
}
