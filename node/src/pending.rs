//! Block requests this node could not serve yet.
//!
//! A GETBLOCK for an unknown block parks the requester here while the block
//! is fetched from another peer. Once the block is stored the requesters are
//! answered; a request that stays unanswered is re-issued a bounded number of
//! times and then forgotten.

use braid_types::{BlockHash, PeerId, Timestamp};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub const DEFAULT_MAX_FETCH_ATTEMPTS: u32 = 3;

#[derive(Debug)]
struct PendingServe {
    requesters: HashSet<PeerId>,
    attempts: u32,
    last_request: Timestamp,
}

#[derive(Debug)]
pub struct PendingServes {
    entries: HashMap<BlockHash, PendingServe>,
    max_attempts: u32,
    retry_after: Duration,
}

impl PendingServes {
    pub fn new(max_attempts: u32, retry_after: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_attempts,
            retry_after,
        }
    }

    /// Park `requester` on `block_id`. Returns `true` when no fetch for the
    /// block was outstanding, i.e. the caller should start one.
    pub fn park(&mut self, block_id: BlockHash, requester: PeerId, now: Timestamp) -> bool {
        match self.entries.get_mut(&block_id) {
            Some(entry) => {
                entry.requesters.insert(requester);
                false
            }
            None => {
                self.entries.insert(
                    block_id,
                    PendingServe {
                        requesters: HashSet::from([requester]),
                        attempts: 1,
                        last_request: now,
                    },
                );
                true
            }
        }
    }

    /// Remove a block's entry and return who was waiting for it.
    pub fn take(&mut self, block_id: &BlockHash) -> Vec<PeerId> {
        let mut requesters: Vec<PeerId> = self
            .entries
            .remove(block_id)
            .map(|e| e.requesters.into_iter().collect())
            .unwrap_or_default();
        requesters.sort();
        requesters
    }

    /// Blocks whose fetch should be re-issued now, paired with the peers to
    /// avoid asking. Entries out of attempts are discarded.
    pub fn due_retries(&mut self, now: Timestamp) -> Vec<(BlockHash, Vec<PeerId>)> {
        let max_attempts = self.max_attempts;
        let retry_after = self.retry_after;
        self.entries
            .retain(|_, e| !(e.attempts >= max_attempts && e.last_request.has_expired(retry_after, now)));

        let mut due = Vec::new();
        for (block_id, entry) in self.entries.iter_mut() {
            if entry.last_request.has_expired(retry_after, now) {
                entry.attempts += 1;
                entry.last_request = now;
                due.push((*block_id, entry.requesters.iter().cloned().collect()));
            }
        }
        due.sort_by_key(|(id, _)| *id);
        due
    }

    pub fn contains(&self, block_id: &BlockHash) -> bool {
        self.entries.contains_key(block_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> BlockHash {
        BlockHash::new([n; 32])
    }

    #[test]
    fn first_park_starts_a_fetch() {
        let mut pending = PendingServes::new(3, Duration::from_secs(5));
        let now = Timestamp::from_secs(10);
        assert!(pending.park(id(1), PeerId::from("a"), now));
        assert!(!pending.park(id(1), PeerId::from("b"), now));
        assert_eq!(
            pending.take(&id(1)),
            vec![PeerId::from("a"), PeerId::from("b")]
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn retries_are_bounded() {
        let mut pending = PendingServes::new(2, Duration::from_secs(5));
        pending.park(id(1), PeerId::from("a"), Timestamp::from_secs(0));

        assert!(pending.due_retries(Timestamp::from_secs(3)).is_empty());
        let due = pending.due_retries(Timestamp::from_secs(6));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1, vec![PeerId::from("a")]);

        assert!(pending.due_retries(Timestamp::from_secs(12)).is_empty());
        assert!(!pending.contains(&id(1)));
    }
}
