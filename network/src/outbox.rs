//! Per-destination priority queues with round-robin draining and retry state.
//!
//! Every destination owns one FIFO per [`Priority`] class. Workers take the
//! next destination from a shared rotation and pop from its highest non-empty
//! class, so one busy peer cannot starve the others. A destination that just
//! failed a send is skipped until its retry state says it is eligible again.

use crate::stats::DropReason;
use braid_messages::{Message, Priority};
use braid_types::{PeerAddress, PeerId, Timestamp};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

/// Limits applied by the [`Outbox`].
#[derive(Clone, Copy, Debug)]
pub struct OutboxConfig {
    /// Maximum queued messages per destination, across all classes.
    pub capacity: usize,
    /// Entries older than this are dropped instead of sent.
    pub ttl: Duration,
    /// Failed sends retried at most this many times.
    pub max_retries: u32,
    /// Delay before a destination that failed is served again.
    pub retry_interval: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            capacity: 50,
            ttl: Duration::from_secs(30),
            max_retries: 3,
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// A message waiting to be sent.
#[derive(Clone, Debug)]
pub struct QueuedMessage {
    pub destination: PeerId,
    pub address: PeerAddress,
    pub message: Message,
    pub priority: Priority,
    pub enqueued_at: Timestamp,
}

/// Failure bookkeeping for one destination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub next_eligible: Timestamp,
}

/// Outcome of taking an entry from the outbox.
#[derive(Debug)]
pub enum Dequeued {
    /// Ready to be sent.
    Ready(QueuedMessage),
    /// Sat in the queue past the TTL; the caller counts and discards it.
    Expired(QueuedMessage),
}

/// What happened to a message whose send failed.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeued one class lower; the destination waits until `next_eligible`.
    Requeued { attempt: u32, next_eligible: Timestamp },
    /// Not requeued.
    Dropped(DropReason),
}

#[derive(Default)]
struct DestinationQueue {
    classes: [VecDeque<QueuedMessage>; 3],
    retry: RetryState,
}

impl DestinationQueue {
    fn len(&self) -> usize {
        self.classes.iter().map(VecDeque::len).sum()
    }

    fn pop_highest(&mut self) -> Option<QueuedMessage> {
        self.classes.iter_mut().find_map(VecDeque::pop_front)
    }
}

pub struct Outbox {
    config: OutboxConfig,
    queues: HashMap<PeerId, DestinationQueue>,
    /// Destinations with queued traffic, in service order.
    rotation: VecDeque<PeerId>,
}

impl Outbox {
    pub fn new(config: OutboxConfig) -> Self {
        Self {
            config,
            queues: HashMap::new(),
            rotation: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Append to the destination's queue for the entry's priority class.
    ///
    /// Fails fast with [`DropReason::QueueFull`] when the destination already
    /// holds `capacity` messages; existing entries are never evicted.
    pub fn push(&mut self, entry: QueuedMessage) -> Result<(), DropReason> {
        let queue = self.queues.entry(entry.destination.clone()).or_default();
        if queue.len() >= self.config.capacity {
            return Err(DropReason::QueueFull);
        }
        let was_idle = queue.len() == 0;
        let destination = entry.destination.clone();
        queue.classes[entry.priority.index()].push_back(entry);
        if was_idle && !self.rotation.contains(&destination) {
            self.rotation.push_back(destination);
        }
        Ok(())
    }

    /// Take the next entry in round-robin order across eligible destinations.
    pub fn pop_next(&mut self, now: Timestamp) -> Option<Dequeued> {
        for _ in 0..self.rotation.len() {
            let destination = self.rotation.pop_front()?;
            let Some(queue) = self.queues.get_mut(&destination) else {
                continue;
            };
            if queue.retry.next_eligible > now {
                self.rotation.push_back(destination);
                continue;
            }
            let Some(entry) = queue.pop_highest() else {
                continue;
            };
            if queue.len() > 0 {
                self.rotation.push_back(destination);
            }
            if entry.enqueued_at.has_expired(self.config.ttl, now) {
                return Some(Dequeued::Expired(entry));
            }
            return Some(Dequeued::Ready(entry));
        }
        None
    }

    /// Record a failed send of `entry`.
    ///
    /// Below the retry limit the entry is requeued one class lower and the
    /// destination is parked for `retry_interval`. Past the limit the entry is
    /// dropped and the destination's retry state is reset.
    pub fn record_failure(&mut self, mut entry: QueuedMessage, now: Timestamp) -> RetryDecision {
        let queue = self.queues.entry(entry.destination.clone()).or_default();
        queue.retry.attempts += 1;
        if queue.retry.attempts > self.config.max_retries {
            queue.retry = RetryState::default();
            return RetryDecision::Dropped(DropReason::RetryExhausted);
        }
        if queue.len() >= self.config.capacity {
            return RetryDecision::Dropped(DropReason::QueueFull);
        }
        let attempt = queue.retry.attempts;
        let next_eligible = now.saturating_add(self.config.retry_interval);
        queue.retry.next_eligible = next_eligible;
        let was_idle = queue.len() == 0;
        let destination = entry.destination.clone();
        entry.priority = entry.priority.demote();
        queue.classes[entry.priority.index()].push_back(entry);
        if was_idle && !self.rotation.contains(&destination) {
            self.rotation.push_back(destination);
        }
        RetryDecision::Requeued {
            attempt,
            next_eligible,
        }
    }

    /// A send to `destination` succeeded; clear its retry state.
    pub fn record_success(&mut self, destination: &PeerId) {
        if let Some(queue) = self.queues.get_mut(destination) {
            queue.retry = RetryState::default();
        }
    }

    pub fn retry_state(&self, destination: &PeerId) -> RetryState {
        self.queues
            .get(destination)
            .map(|q| q.retry)
            .unwrap_or_default()
    }

    /// Discard everything queued for a destination. Returns how many entries
    /// were dropped.
    pub fn remove_destination(&mut self, destination: &PeerId) -> usize {
        self.rotation.retain(|d| d != destination);
        self.queues
            .remove(destination)
            .map(|q| q.len())
            .unwrap_or(0)
    }

    pub fn depth(&self, destination: &PeerId) -> usize {
        self.queues.get(destination).map(|q| q.len()).unwrap_or(0)
    }

    /// Queue depth for every destination with queued traffic.
    pub fn depths(&self) -> BTreeMap<PeerId, usize> {
        self.queues
            .iter()
            .filter(|(_, q)| q.len() > 0)
            .map(|(id, q)| (id.clone(), q.len()))
            .collect()
    }

    pub fn total_len(&self) -> usize {
        self.queues.values().map(DestinationQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }
}
