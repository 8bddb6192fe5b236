//! Seen-message cache for network-wide replay suppression.
//!
//! Maps message id to the time it was first seen. A repeat inside the expiry
//! window bumps the redundancy counter for that id instead of being processed.

use braid_types::{MessageId, Timestamp};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

/// Default seen-message expiry: 10 minutes.
pub const DEFAULT_SEEN_EXPIRY: Duration = Duration::from_secs(600);

/// Result of observing a message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seen {
    /// First sighting inside the window; process it.
    First,
    /// Already seen; carries the updated repeat count.
    Repeat(u64),
}

pub struct SeenCache {
    expiry: Duration,
    first_seen: HashMap<MessageId, Timestamp>,
    order: VecDeque<(MessageId, Timestamp)>,
    redundancy: HashMap<MessageId, u64>,
}

impl SeenCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            first_seen: HashMap::new(),
            order: VecDeque::new(),
            redundancy: HashMap::new(),
        }
    }

    /// Record a sighting of `id` at `now`.
    pub fn observe(&mut self, id: &MessageId, now: Timestamp) -> Seen {
        if let Some(seen_at) = self.first_seen.get(id) {
            if !seen_at.has_expired(self.expiry, now) {
                let count = self.redundancy.entry(id.clone()).or_insert(0);
                *count += 1;
                return Seen::Repeat(*count);
            }
        }
        self.first_seen.insert(id.clone(), now);
        self.order.push_back((id.clone(), now));
        Seen::First
    }

    /// Whether `id` has been seen inside the window, without recording anything.
    pub fn contains(&self, id: &MessageId, now: Timestamp) -> bool {
        self.first_seen
            .get(id)
            .is_some_and(|t| !t.has_expired(self.expiry, now))
    }

    /// Forget ids whose window has closed. Returns how many were dropped.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        let mut purged = 0;
        while let Some((id, at)) = self.order.front() {
            if !at.has_expired(self.expiry, now) {
                break;
            }
            // Only remove the map entry if it was not refreshed after expiring.
            if self.first_seen.get(id) == Some(at) {
                self.first_seen.remove(id);
                self.redundancy.remove(id);
                purged += 1;
            }
            self.order.pop_front();
        }
        purged
    }

    pub fn redundancy_of(&self, id: &MessageId) -> u64 {
        self.redundancy.get(id).copied().unwrap_or(0)
    }

    /// Repeat counts by message id.
    pub fn redundancy(&self) -> BTreeMap<String, u64> {
        self.redundancy
            .iter()
            .map(|(id, n)| (id.as_str().to_string(), *n))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_EXPIRY)
    }
}
