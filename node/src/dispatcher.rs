//! Inbound path: the gate sequence every message passes and the per-type
//! handlers it is routed to.

use braid_ledger::InsertOutcome;
use braid_messages::{
    Block, GetBlockMsg, GoodbyeMsg, HelloMsg, InvMsg, MempoolDataMsg, Message, NewPeerMsg,
    PeerListing, PeersListMsg, PingMsg, PongMsg, RelayMsg, Transaction,
};
use braid_network::{DropReason, Seen};
use braid_types::{BlockHash, MessageId, PeerAddress, PeerId, Timestamp};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

use crate::context::NodeContext;
use crate::tracing_spans::network_recv_span;
use crate::NodeError;

/// Ids requested per GETBLOCK.
pub const GETBLOCK_BATCH: usize = 20;

/// What the dispatcher did with one inbound message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Passed every gate and was routed to its handler.
    Processed,
    Dropped(DropReason),
}

impl NodeContext {
    /// Decode one wire record and dispatch it.
    pub fn handle_line(&self, line: &[u8]) -> Disposition {
        match braid_protocol::decode(line) {
            Ok(message) => self.receive(message),
            Err(e) => {
                debug!(error = %e, "dropping undecodable record");
                self.record_drop(DropReason::Invalid);
                Disposition::Dropped(DropReason::Invalid)
            }
        }
    }

    /// Run a decoded message through the duplicate, rate and blacklist gates,
    /// then route it by type. Handler failures are logged and contained.
    pub fn receive(&self, message: Message) -> Disposition {
        let now = self.now();
        self.metrics.messages_received.inc();
        let sender = message.sender().clone();
        let kind = message.kind();

        if let Seen::Repeat(count) = self.seen.lock().observe(message.message_id(), now) {
            trace!(peer = %sender, kind = kind.as_str(), count, "duplicate message");
            return self.reject(DropReason::Duplicate);
        }
        if !self.inbound_window.lock().allow(&sender, now) {
            debug!(peer = %sender, kind = kind.as_str(), "inbound rate exceeded");
            return self.reject(DropReason::RateLimited);
        }
        if self.reputation.lock().is_blacklisted(&sender) {
            return self.reject(DropReason::Blacklisted);
        }

        let span = network_recv_span(sender.as_str(), kind.as_str());
        let _entered = span.enter();
        if let Err(e) = self.route(message, now) {
            warn!(peer = %sender, kind = kind.as_str(), error = %e, "handler failed");
        }
        self.metrics.messages_dispatched.inc();
        self.serve_ready_blocks();
        Disposition::Processed
    }

    fn reject(&self, reason: DropReason) -> Disposition {
        self.record_drop(reason);
        Disposition::Dropped(reason)
    }

    fn route(&self, message: Message, now: Timestamp) -> Result<(), NodeError> {
        match message {
            Message::Hello(m) => self.on_hello(m, now),
            Message::Ping(m) => self.on_ping(m, now),
            Message::Pong(m) => self.on_pong(m, now),
            Message::Tx(tx) => self.on_transaction(tx),
            Message::Block(block) => self.on_block(block, now)?,
            Message::Inv(m) => self.on_inventory(m),
            Message::GetBlock(m) => self.on_get_block(m, now),
            Message::GetBlockHeaders(m) => self.on_get_block_headers(m),
            Message::BlockHeaders(m) => self.on_block_headers(m, now)?,
            Message::BlockBatch(m) => self.on_block_batch(m, now)?,
            Message::GetLatestBlock(m) => self.on_get_latest_block(m),
            Message::Relay(m) => self.on_relay(m),
            Message::NewPeer(m) => self.on_new_peer(m, now),
            Message::Goodbye(m) => self.on_goodbye(m),
            Message::GetMempool(m) => self.on_get_mempool(&m.sender_id),
            Message::MempoolData(m) => self.absorb_transactions(&m.sender_id, m.transactions),
            Message::MempoolTransfer(m) => {
                debug!(peer = %m.sender_id, batch = m.batch, of = m.total_batches, "mempool transfer");
                self.absorb_transactions(&m.sender_id, m.transactions)
            }
            Message::GetPeers(m) => self.on_get_peers(&m.sender_id),
            Message::PeersList(m) => self.on_peers_list(m, now),
        }
        Ok(())
    }

    /// Count an offense against `peer`; bans purge its queued traffic.
    pub fn record_offense(&self, peer: &PeerId, what: &'static str) {
        self.metrics.offenses.inc();
        let (banned, offenses) = {
            let mut reputation = self.reputation.lock();
            let banned = reputation.record_offense(peer);
            (banned, reputation.offense_count(peer))
        };
        warn!(peer = %peer, what, offenses, "offense recorded");
        if banned {
            self.metrics.bans.inc();
            let purged = self.outbox.lock().remove_destination(peer);
            warn!(peer = %peer, purged, "peer blacklisted");
        }
    }

    // ── Peers ──────────────────────────────────────────────────────────

    fn on_hello(&self, m: HelloMsg, now: Timestamp) {
        let address = PeerAddress::new(m.ip, m.port);
        let flags = m.flags.peer_flags();
        let is_new = {
            let mut directory = self.directory.lock();
            let is_new = directory.register_or_update(&m.sender_id, address.clone(), flags, now);
            directory.mark_reachable(self.id(), &m.sender_id);
            directory.record_heartbeat(&m.sender_id, now);
            is_new
        };
        if !is_new {
            return;
        }
        info!(peer = %m.sender_id, %address, nat = flags.nat, light = flags.light, "peer joined");
        self.notify_peer_added(&m.sender_id, &address, flags);
        if m.flags.new_node {
            let announcement = Message::NewPeer(NewPeerMsg {
                sender_id: self.id().clone(),
                new_peer_id: m.sender_id.clone(),
                new_peer_ip: address.ip,
                new_peer_port: address.port,
                new_peer_flags: flags,
                message_id: MessageId::random(),
            });
            let sent = self.broadcast(&announcement, &[m.sender_id]);
            debug!(sent, "announced new peer");
        }
    }

    fn on_ping(&self, m: PingMsg, now: Timestamp) {
        self.directory.lock().record_heartbeat(&m.sender_id, now);
        let pong = Message::Pong(PongMsg {
            sender_id: self.id().clone(),
            timestamp: m.timestamp,
            message_id: MessageId::random(),
        });
        let _ = self.enqueue(&m.sender_id, pong);
    }

    fn on_pong(&self, m: PongMsg, now: Timestamp) {
        if let Some(rtt) = self.directory.lock().record_pong(&m.sender_id, m.timestamp, now) {
            trace!(peer = %m.sender_id, rtt_ms = rtt.as_millis() as u64, "pong");
        }
    }

    fn on_new_peer(&self, m: NewPeerMsg, now: Timestamp) {
        let address = PeerAddress::new(m.new_peer_ip, m.new_peer_port);
        let is_new = {
            let mut directory = self.directory.lock();
            let is_new =
                directory.register_or_update(&m.new_peer_id, address.clone(), m.new_peer_flags, now);
            directory.mark_reachable(&m.sender_id, &m.new_peer_id);
            is_new
        };
        if is_new {
            info!(peer = %m.new_peer_id, via = %m.sender_id, "peer announced");
            self.notify_peer_added(&m.new_peer_id, &address, m.new_peer_flags);
        }
    }

    fn on_goodbye(&self, m: GoodbyeMsg) {
        let removed = self.directory.lock().remove(&m.sender_id).is_some();
        self.outbox.lock().remove_destination(&m.sender_id);
        let handed_off = m.pending_transactions.len();
        self.absorb_transactions(&m.sender_id, m.pending_transactions);
        info!(
            peer = %m.sender_id,
            reason = %m.reason,
            handed_off,
            more = m.has_more_transactions,
            "peer left"
        );
        if removed {
            self.notify_peer_removed(&m.sender_id);
        }
    }

    fn on_get_peers(&self, requester: &PeerId) {
        let peers: BTreeMap<PeerId, PeerListing> = {
            let directory = self.directory.lock();
            if !directory.contains(requester) {
                debug!(peer = %requester, "ignoring peer list request from unknown peer");
                return;
            }
            directory
                .iter()
                .filter(|(id, _)| *id != requester)
                .map(|(id, entry)| {
                    let listing = PeerListing {
                        ip: entry.address.ip.clone(),
                        port: entry.address.port,
                        flags: entry.flags,
                    };
                    (id.clone(), listing)
                })
                .collect()
        };
        let reply = Message::PeersList(PeersListMsg {
            sender_id: self.id().clone(),
            peers,
            message_id: MessageId::random(),
        });
        let _ = self.enqueue(requester, reply);
    }

    fn on_peers_list(&self, m: PeersListMsg, now: Timestamp) {
        let mut added = Vec::new();
        {
            let mut directory = self.directory.lock();
            for (id, listing) in m.peers {
                if id == *self.id() {
                    continue;
                }
                if !directory.contains(&id) {
                    let address = PeerAddress::new(listing.ip, listing.port);
                    directory.register_or_update(&id, address.clone(), listing.flags, now);
                    added.push((id.clone(), address, listing.flags));
                }
                directory.mark_reachable(&m.sender_id, &id);
            }
        }
        for (id, address, flags) in added {
            info!(peer = %id, via = %m.sender_id, "peer discovered");
            self.notify_peer_added(&id, &address, flags);
        }
    }

    // ── Relay ──────────────────────────────────────────────────────────

    fn on_relay(&self, m: RelayMsg) {
        if m.target_id == *self.id() {
            trace!(relay = %m.sender_id, "unwrapping relayed message");
            self.receive(*m.payload);
            return;
        }
        let target = m.target_id.clone();
        if let Err(reason) = self.enqueue(&target, Message::Relay(m)) {
            debug!(target = %target, %reason, "could not forward relay");
        }
    }

    // ── Transactions ───────────────────────────────────────────────────

    fn on_transaction(&self, tx: Transaction) {
        if !tx.has_valid_id() {
            self.record_drop(DropReason::Invalid);
            self.record_offense(&tx.from, "transaction id mismatch");
            return;
        }
        if self.is_light() {
            return;
        }
        if !self.mempool.lock().add(tx.clone()) {
            return;
        }
        debug!(tx = %tx.id, from = %tx.from, amount = tx.amount, "transaction pooled");
        let originator = tx.from.clone();
        self.gossip(&Message::Tx(tx), &[originator]);
    }

    /// Pool handed-over transactions, skipping any with a forged id.
    fn absorb_transactions(&self, sender: &PeerId, transactions: Vec<Transaction>) {
        if self.is_light() {
            return;
        }
        let (valid, forged): (Vec<_>, Vec<_>) =
            transactions.into_iter().partition(|tx| tx.has_valid_id());
        if !forged.is_empty() {
            self.record_drop(DropReason::Invalid);
            self.record_offense(sender, "forged transaction in bulk transfer");
        }
        let added = self.mempool.lock().extend(valid);
        if added > 0 {
            debug!(peer = %sender, added, "absorbed transactions");
        }
    }

    fn on_get_mempool(&self, requester: &PeerId) {
        let transactions = self.mempool.lock().transactions().to_vec();
        let reply = Message::MempoolData(MempoolDataMsg {
            sender_id: self.id().clone(),
            transactions,
            message_id: MessageId::random(),
        });
        let _ = self.enqueue(requester, reply);
    }

    // ── Blocks ─────────────────────────────────────────────────────────

    fn on_block(&self, block: Block, now: Timestamp) -> Result<(), NodeError> {
        let id = block.block_id;
        let creator = block.peer_id.clone();
        if let Some(InsertOutcome::Accepted { .. } | InsertOutcome::Orphaned) =
            self.store_block(block, now)?
        {
            let inv = Message::Inv(InvMsg {
                sender_id: self.id().clone(),
                block_ids: vec![id],
                message_id: MessageId::random(),
            });
            self.gossip(&inv, &[creator]);
        }
        Ok(())
    }

    /// Validate and store one block. A forged id is an offense against the
    /// creator and yields `None`.
    pub(crate) fn store_block(
        &self,
        block: Block,
        now: Timestamp,
    ) -> Result<Option<InsertOutcome>, NodeError> {
        if !block.has_valid_id() {
            self.record_drop(DropReason::Invalid);
            self.record_offense(&block.peer_id, "block id mismatch");
            return Ok(None);
        }
        let id = block.block_id;
        let outcome = self.store.lock().insert(block, now)?;
        match &outcome {
            InsertOutcome::Accepted { height, promoted } => {
                debug!(block = %id, height, promoted = promoted.len(), "block accepted");
            }
            InsertOutcome::Orphaned => debug!(block = %id, "block held as orphan"),
            InsertOutcome::Duplicate => trace!(block = %id, "block already known"),
        }
        Ok(Some(outcome))
    }

    fn on_inventory(&self, m: InvMsg) {
        let missing: Vec<BlockHash> = {
            let store = self.store.lock();
            m.block_ids
                .into_iter()
                .filter(|id| !store.knows(id))
                .collect()
        };
        self.request_blocks(&m.sender_id, missing);
    }

    /// Ask `peer` for `ids`, in GETBLOCK batches.
    pub(crate) fn request_blocks(&self, peer: &PeerId, ids: Vec<BlockHash>) {
        for chunk in ids.chunks(GETBLOCK_BATCH) {
            let request = Message::GetBlock(GetBlockMsg {
                sender_id: self.id().clone(),
                requested_ids: chunk.to_vec(),
                message_id: MessageId::random(),
            });
            let _ = self.enqueue(peer, request);
        }
    }

    fn on_get_block(&self, m: GetBlockMsg, now: Timestamp) {
        for id in m.requested_ids {
            let block = self.store.lock().get_block(&id).cloned();
            match block {
                Some(block) => {
                    let _ = self.enqueue(&m.sender_id, Message::Block(block));
                }
                None if self.is_light() => {}
                None => {
                    let first = self.pending.lock().park(id, m.sender_id.clone(), now);
                    if first {
                        self.fetch_for_pending(id, &[m.sender_id.clone()]);
                    }
                }
            }
        }
    }

    /// Ask a random peer other than `exclude` for a block someone is waiting on.
    pub(crate) fn fetch_for_pending(&self, id: BlockHash, exclude: &[PeerId]) {
        let request = Message::GetBlock(GetBlockMsg {
            sender_id: self.id().clone(),
            requested_ids: vec![id],
            message_id: MessageId::random(),
        });
        match self.send_to_random(request, exclude) {
            Some(peer) => debug!(block = %id, from = %peer, "fetching block for waiting peer"),
            None => debug!(block = %id, "no peer to fetch block from"),
        }
    }

    /// Answer parked requests for blocks that have become available.
    fn serve_ready_blocks(&self) {
        for id in self.take_ready_blocks() {
            let requesters = self.pending.lock().take(&id);
            if requesters.is_empty() {
                continue;
            }
            let Some(block) = self.store.lock().get_block(&id).cloned() else {
                continue;
            };
            for requester in requesters {
                let _ = self.enqueue(&requester, Message::Block(block.clone()));
            }
        }
    }
}
