//! One round of each periodic duty. The scheduling loops live in
//! [`crate::tasks`]; keeping the rounds synchronous makes them testable
//! against a controlled clock.

use braid_messages::{HelloFlags, HelloMsg, InvMsg, Message, PingMsg};
use braid_types::{BlockHash, MessageId};
use std::time::Duration;
use tracing::{debug, info};

use crate::context::NodeContext;
use crate::sync::HEADER_WINDOW;

/// What the cleanup round removed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub peers_removed: usize,
    pub seen_expired: usize,
    pub orphans_expired: usize,
    pub fetches_retried: usize,
}

impl NodeContext {
    /// PING every known peer with the current time.
    pub fn heartbeat_round(&self) -> usize {
        let ping = Message::Ping(PingMsg {
            sender_id: self.id().clone(),
            timestamp: self.now(),
            message_id: MessageId::random(),
        });
        self.broadcast(&ping, &[])
    }

    /// Reclassify peers as alive or unreachable.
    pub fn liveness_round(&self) -> usize {
        let policy = self.config.timing.liveness_policy();
        let changed = self.directory.lock().sweep(&policy, self.now());
        changed.len()
    }

    /// Remove stale peers, expire caches and re-issue outstanding fetches.
    pub fn cleanup_round(&self) -> CleanupReport {
        let now = self.now();
        let policy = self.config.timing.liveness_policy();

        let removed = self.directory.lock().prune_unreachable(&policy, now);
        for peer in &removed {
            self.outbox.lock().remove_destination(peer);
            self.notify_peer_removed(peer);
        }

        let seen_expired = self.seen.lock().purge_expired(now);
        let orphans_expired = self
            .store
            .lock()
            .expire_orphans(self.config.limits.orphan_expiry(), now);

        let due = self.pending.lock().due_retries(now);
        for (block_id, waiting) in &due {
            self.fetch_for_pending(*block_id, waiting);
        }

        self.send_window.lock().purge_idle(now);
        self.inbound_window.lock().purge_idle(now);
        self.refresh_gauges();

        let report = CleanupReport {
            peers_removed: removed.len(),
            seen_expired,
            orphans_expired,
            fetches_retried: due.len(),
        };
        debug!(?report, "cleanup round");
        report
    }

    /// Announce this node's address and flags to every known peer. Later
    /// rounds also refresh the peer directory from a few random peers.
    pub fn hello_round(&self, first: bool) -> usize {
        let hello = Message::Hello(HelloMsg {
            sender_id: self.id().clone(),
            ip: self.identity.address.ip.clone(),
            port: self.identity.address.port,
            flags: HelloFlags {
                nat: self.identity.flags.nat,
                light: self.identity.flags.light,
                new_node: first && self.identity.new_node,
            },
            message_id: MessageId::random(),
        });
        let sent = self.broadcast(&hello, &[]);
        if !first {
            self.request_peer_lists();
        }
        sent
    }

    /// Gossip the ids of the most recent blocks.
    pub fn inventory_round(&self) -> usize {
        let block_ids: Vec<BlockHash> = {
            let store = self.store.lock();
            let headers = store.headers();
            let skip = headers.len().saturating_sub(HEADER_WINDOW as usize);
            headers[skip..].iter().map(|h| h.block_id).collect()
        };
        if block_ids.is_empty() {
            return 0;
        }
        let inv = Message::Inv(InvMsg {
            sender_id: self.id().clone(),
            block_ids,
            message_id: MessageId::random(),
        });
        self.gossip(&inv, &[])
    }

    /// Move the link capacity to a new random value. Returns the delay until
    /// the next change.
    pub fn fluctuate_link(&self) -> Duration {
        let mut link = self.link.lock();
        let capacity = link.fluctuate(self.now());
        info!(capacity, "link capacity changed");
        link.next_adjustment()
    }
}
