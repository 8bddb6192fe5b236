//! Peer directory: addresses, capability flags, reachability and liveness.
//!
//! Everything the node knows about another peer lives in one [`PeerEntry`],
//! so removing a peer purges its address, flags, reachability set, liveness
//! timestamp and RTT in a single operation.

use braid_types::{PeerAddress, PeerFlags, PeerId, PeerStatus, Timestamp};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Peer entry
// ---------------------------------------------------------------------------

/// Per-peer metadata tracked by the [`PeerDirectory`].
#[derive(Clone, Debug)]
pub struct PeerEntry {
    pub address: PeerAddress,
    pub flags: PeerFlags,
    /// Peers known to be able to reach this one directly.
    pub reachable_by: HashSet<PeerId>,
    /// Last PING or PONG from this peer, if any.
    pub last_seen: Option<Timestamp>,
    /// When the entry was created. Used to classify peers never heard from.
    pub registered_at: Timestamp,
    /// Most recent round-trip time measured with PING/PONG.
    pub rtt: Option<Duration>,
    pub status: PeerStatus,
    /// Came from the configured peer table; never pruned.
    pub bootstrap: bool,
}

impl PeerEntry {
    fn new(address: PeerAddress, flags: PeerFlags, now: Timestamp) -> Self {
        Self {
            address,
            flags,
            reachable_by: HashSet::new(),
            last_seen: None,
            registered_at: now,
            rtt: None,
            status: PeerStatus::Unknown,
            bootstrap: false,
        }
    }
}

/// Read-only view of a directory entry for snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerView {
    pub id: PeerId,
    pub address: PeerAddress,
    pub flags: PeerFlags,
    pub status: PeerStatus,
    pub rtt_ms: Option<u64>,
    pub reachable_by: Vec<PeerId>,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Central registry of every peer this node knows about.
///
/// The node's own id is never stored; operations naming it are no-ops.
pub struct PeerDirectory {
    self_id: PeerId,
    peers: HashMap<PeerId, PeerEntry>,
}

impl PeerDirectory {
    pub fn new(self_id: PeerId) -> Self {
        Self {
            self_id,
            peers: HashMap::new(),
        }
    }

    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Seed an entry from the configured peer table. Bootstrap peers are
    /// exempt from the removal sweep.
    pub fn add_bootstrap(
        &mut self,
        peer_id: PeerId,
        address: PeerAddress,
        flags: PeerFlags,
        now: Timestamp,
    ) {
        if peer_id == self.self_id {
            return;
        }
        let entry = self
            .peers
            .entry(peer_id)
            .or_insert_with(|| PeerEntry::new(address.clone(), flags, now));
        entry.address = address;
        entry.flags = flags;
        entry.bootstrap = true;
    }

    /// Create or refresh a peer's address and flags.
    ///
    /// Returns `true` if the peer was previously unknown.
    pub fn register_or_update(
        &mut self,
        peer_id: &PeerId,
        address: PeerAddress,
        flags: PeerFlags,
        now: Timestamp,
    ) -> bool {
        if *peer_id == self.self_id {
            return false;
        }
        match self.peers.get_mut(peer_id) {
            Some(entry) => {
                entry.address = address;
                entry.flags = flags;
                false
            }
            None => {
                self.peers
                    .insert(peer_id.clone(), PeerEntry::new(address, flags, now));
                true
            }
        }
    }

    /// Record that `observer` can reach `peer_id` directly.
    pub fn mark_reachable(&mut self, observer: &PeerId, peer_id: &PeerId) {
        if let Some(entry) = self.peers.get_mut(peer_id) {
            entry.reachable_by.insert(observer.clone());
        }
    }

    /// Status of a peer. Unknown ids report [`PeerStatus::Unknown`].
    pub fn status_of(&self, peer_id: &PeerId) -> PeerStatus {
        self.peers
            .get(peer_id)
            .map(|e| e.status)
            .unwrap_or(PeerStatus::Unknown)
    }

    /// Remove a peer and everything recorded about it, including its
    /// membership in other peers' reachability sets.
    pub fn remove(&mut self, peer_id: &PeerId) -> Option<PeerEntry> {
        let removed = self.peers.remove(peer_id)?;
        for entry in self.peers.values_mut() {
            entry.reachable_by.remove(peer_id);
        }
        Some(removed)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&PeerEntry> {
        self.peers.get(peer_id)
    }

    pub(crate) fn get_mut(&mut self, peer_id: &PeerId) -> Option<&mut PeerEntry> {
        self.peers.get_mut(peer_id)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&PeerId, &mut PeerEntry)> {
        self.peers.iter_mut()
    }

    pub fn address_of(&self, peer_id: &PeerId) -> Option<&PeerAddress> {
        self.peers.get(peer_id).map(|e| &e.address)
    }

    pub fn flags_of(&self, peer_id: &PeerId) -> Option<PeerFlags> {
        self.peers.get(peer_id).map(|e| e.flags)
    }

    pub fn rtt_of(&self, peer_id: &PeerId) -> Option<Duration> {
        self.peers.get(peer_id).and_then(|e| e.rtt)
    }

    /// All known peer ids, sorted for stable iteration.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &PeerEntry)> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Up to `count` distinct peers chosen uniformly at random.
    pub fn random_peers<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<PeerId> {
        let ids = self.peer_ids();
        ids.choose_multiple(rng, count).cloned().collect()
    }

    /// Snapshot of every entry, keyed by id.
    pub fn views(&self) -> BTreeMap<PeerId, PeerView> {
        self.peers
            .iter()
            .map(|(id, e)| {
                let mut reachable_by: Vec<PeerId> = e.reachable_by.iter().cloned().collect();
                reachable_by.sort();
                let view = PeerView {
                    id: id.clone(),
                    address: e.address.clone(),
                    flags: e.flags,
                    status: e.status,
                    rtt_ms: e.rtt.map(|d| d.as_millis() as u64),
                    reachable_by,
                };
                (id.clone(), view)
            })
            .collect()
    }
}
