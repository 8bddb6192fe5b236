//! Orphan pool: blocks whose parent is not yet on the chain.
//!
//! Entries are keyed by their own id and indexed by the missing parent, so
//! accepting a block drains exactly the orphans that were waiting for it.

use braid_messages::{Block, BlockHeader};
use braid_types::{BlockHash, Timestamp};
use std::collections::HashMap;
use std::time::Duration;

/// Default maximum number of orphans held at once.
pub const DEFAULT_ORPHAN_CAPACITY: usize = 1024;
/// Default age after which an orphan is discarded.
pub const DEFAULT_ORPHAN_EXPIRY: Duration = Duration::from_secs(3600);

/// A block waiting for its parent. Light stores keep the header only.
#[derive(Clone, Debug)]
pub struct OrphanEntry {
    pub header: BlockHeader,
    pub body: Option<Block>,
    pub received_at: Timestamp,
}

pub struct OrphanPool {
    entries: HashMap<BlockHash, OrphanEntry>,
    by_parent: HashMap<BlockHash, Vec<BlockHash>>,
    max_size: usize,
}

impl OrphanPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_parent: HashMap::new(),
            max_size,
        }
    }

    /// Hold an entry until `parent` is accepted.
    ///
    /// Returns `false` if the pool is full or the id is already held.
    pub fn insert(&mut self, parent: BlockHash, entry: OrphanEntry) -> bool {
        if self.entries.len() >= self.max_size {
            return false;
        }
        let id = entry.header.block_id;
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, entry);
        self.by_parent.entry(parent).or_default().push(id);
        true
    }

    pub fn contains(&self, id: &BlockHash) -> bool {
        self.entries.contains_key(id)
    }

    /// Remove and return every orphan waiting for `parent`, oldest first.
    pub fn take_dependents(&mut self, parent: &BlockHash) -> Vec<OrphanEntry> {
        let Some(ids) = self.by_parent.remove(parent) else {
            return Vec::new();
        };
        let mut taken: Vec<OrphanEntry> = ids
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect();
        taken.sort_by_key(|e| e.received_at);
        taken
    }

    /// Remove entries older than `max_age`. Returns how many were removed.
    pub fn clear_expired(&mut self, max_age: Duration, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| !e.received_at.has_expired(max_age, now));
        let entries = &self.entries;
        self.by_parent.retain(|_, ids| {
            ids.retain(|id| entries.contains_key(id));
            !ids.is_empty()
        });
        before - self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Headers of every held orphan.
    pub fn headers(&self) -> Vec<BlockHeader> {
        self.entries.values().map(|e| e.header).collect()
    }
}

impl Default for OrphanPool {
    fn default() -> Self {
        Self::new(DEFAULT_ORPHAN_CAPACITY)
    }
}
