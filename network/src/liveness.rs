//! Heartbeat bookkeeping, status classification and the stale-peer sweep.

use crate::peer_directory::PeerDirectory;
use braid_types::{PeerId, PeerStatus, Timestamp};
use std::time::Duration;
use tracing::{debug, info};

/// Timeouts driving the liveness monitor.
#[derive(Clone, Copy, Debug)]
pub struct LivenessPolicy {
    /// Silence after which a peer is classified unreachable.
    pub ping_timeout: Duration,
    /// Silence after which a non-bootstrap unreachable peer is removed.
    pub removal_timeout: Duration,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self {
            ping_timeout: Duration::from_secs(10),
            removal_timeout: Duration::from_secs(180),
        }
    }
}

impl PeerDirectory {
    /// A PING arrived from `peer_id`.
    pub fn record_heartbeat(&mut self, peer_id: &PeerId, now: Timestamp) {
        if let Some(entry) = self.get_mut(peer_id) {
            entry.last_seen = Some(now);
        }
    }

    /// A PONG echoing `sent_at` arrived from `peer_id`. Returns the measured RTT.
    pub fn record_pong(
        &mut self,
        peer_id: &PeerId,
        sent_at: Timestamp,
        now: Timestamp,
    ) -> Option<Duration> {
        let entry = self.get_mut(peer_id)?;
        let rtt = sent_at.elapsed_since(now);
        entry.last_seen = Some(now);
        entry.rtt = Some(rtt);
        Some(rtt)
    }

    /// Classify every peer as alive or unreachable.
    ///
    /// Peers never heard from are measured from their registration time.
    /// Returns the ids whose status changed.
    pub fn sweep(&mut self, policy: &LivenessPolicy, now: Timestamp) -> Vec<PeerId> {
        let mut changed = Vec::new();
        for (id, entry) in self.entries_mut() {
            let reference = entry.last_seen.unwrap_or(entry.registered_at);
            let status = if reference.has_expired(policy.ping_timeout, now) {
                PeerStatus::Unreachable
            } else {
                PeerStatus::Alive
            };
            if status != entry.status {
                debug!(peer = %id, ?status, "peer status changed");
                entry.status = status;
                changed.push(id.clone());
            }
        }
        changed
    }

    /// Remove non-bootstrap peers that have stayed unreachable past the
    /// removal timeout. Returns the removed ids.
    pub fn prune_unreachable(&mut self, policy: &LivenessPolicy, now: Timestamp) -> Vec<PeerId> {
        let stale: Vec<PeerId> = self
            .iter()
            .filter(|(_, e)| {
                !e.bootstrap
                    && e.status == PeerStatus::Unreachable
                    && e.last_seen
                        .unwrap_or(e.registered_at)
                        .has_expired(policy.removal_timeout, now)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.remove(id);
            info!(peer = %id, "removed stale peer");
        }
        stale
    }
}
