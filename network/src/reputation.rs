//! Offense counting and the permanent blacklist.

use braid_types::PeerId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Default number of offenses a peer may accumulate before it is banned.
pub const DEFAULT_OFFENSE_THRESHOLD: u32 = 3;

/// Offense counts per peer. A peer whose count exceeds the threshold is
/// blacklisted for the lifetime of the process.
pub struct Reputation {
    threshold: u32,
    offenses: HashMap<PeerId, u32>,
    blacklist: HashSet<PeerId>,
}

impl Reputation {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            offenses: HashMap::new(),
            blacklist: HashSet::new(),
        }
    }

    /// Count one offense. Returns `true` if this offense got the peer banned.
    pub fn record_offense(&mut self, peer_id: &PeerId) -> bool {
        let count = self.offenses.entry(peer_id.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        count > self.threshold && self.blacklist.insert(peer_id.clone())
    }

    pub fn is_blacklisted(&self, peer_id: &PeerId) -> bool {
        self.blacklist.contains(peer_id)
    }

    pub fn offense_count(&self, peer_id: &PeerId) -> u32 {
        self.offenses.get(peer_id).copied().unwrap_or(0)
    }

    pub fn offenses(&self) -> BTreeMap<PeerId, u32> {
        self.offenses.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn blacklist(&self) -> BTreeSet<PeerId> {
        self.blacklist.iter().cloned().collect()
    }
}

impl Default for Reputation {
    fn default() -> Self {
        Self::new(DEFAULT_OFFENSE_THRESHOLD)
    }
}
