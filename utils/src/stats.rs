//! Named, lock-free counters for drop and redundancy statistics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed set of named counters that can be bumped from any thread.
///
/// The set of names is decided at construction; increments to an unknown
/// name are ignored.
pub struct StatsCounter {
    counters: BTreeMap<&'static str, AtomicU64>,
}

impl StatsCounter {
    pub fn new(names: &[&'static str]) -> Self {
        let counters = names.iter().map(|&n| (n, AtomicU64::new(0))).collect();
        Self { counters }
    }

    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, value: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum over all counters.
    pub fn total(&self) -> u64 {
        self.counters.values().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Point-in-time copy of every counter, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        self.counters
            .iter()
            .map(|(&k, v)| (k, v.load(Ordering::Relaxed)))
            .collect()
    }
}
