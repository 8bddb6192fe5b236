//! Sliding-window rate limiter keyed by peer.
//!
//! A timestamp is recorded only when an event is admitted, so a peer that is
//! being throttled does not extend its own penalty.

use braid_types::{PeerId, Timestamp};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    events: HashMap<PeerId, VecDeque<Timestamp>>,
}

impl SlidingWindow {
    /// Admit at most `limit` events per `window` for each key.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: HashMap::new(),
        }
    }

    /// Returns `true` and records the event if the key is under its limit.
    pub fn allow(&mut self, key: &PeerId, now: Timestamp) -> bool {
        let events = self.events.entry(key.clone()).or_default();
        while let Some(front) = events.front() {
            if front.has_expired(self.window, now) {
                events.pop_front();
            } else {
                break;
            }
        }
        if events.len() >= self.limit {
            return false;
        }
        events.push_back(now);
        true
    }

    /// Events currently counted against `key`.
    pub fn in_window(&self, key: &PeerId) -> usize {
        self.events.get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// Drop keys with no events inside the window.
    pub fn purge_idle(&mut self, now: Timestamp) {
        let window = self.window;
        self.events.retain(|_, events| {
            events
                .back()
                .map(|last| !last.has_expired(window, now))
                .unwrap_or(false)
        });
    }
}
