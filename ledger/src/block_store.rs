//! Block store: the accepted chain, its header index and the orphan pool.
//!
//! A block id moves through `unknown -> orphan -> accepted`. Acceptance of
//! any block triggers a cascading scan of the orphan pool, so a chain of
//! orphans is promoted transitively once its root arrives. Light stores run
//! the same state machine but keep headers only.
//!
//! Accepted header heights are always `parent height + 1` (0 for genesis),
//! computed by the store. Block bodies are kept exactly as received.

use crate::error::LedgerError;
use crate::events::{Observer, StoreEvent, StoreObservers};
use crate::orphan::{OrphanEntry, OrphanPool};
use braid_messages::{Block, BlockHeader};
use braid_types::{BlockHash, Timestamp};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// Whether the store keeps block bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    #[default]
    Full,
    /// Headers only.
    Light,
}

/// Result of [`BlockStore::insert`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// On the chain at `height`; `promoted` lists orphans unlocked by it.
    Accepted {
        height: u64,
        promoted: Vec<BlockHeader>,
    },
    /// Held in the orphan pool.
    Orphaned,
    /// Already on the chain or in the orphan pool; nothing changed.
    Duplicate,
}

impl InsertOutcome {
    /// Blocks added to the chain by this insert, including promotions.
    pub fn accepted_count(&self) -> usize {
        match self {
            Self::Accepted { promoted, .. } => 1 + promoted.len(),
            _ => 0,
        }
    }
}

pub struct BlockStore {
    mode: StoreMode,
    /// Full blocks in acceptance order. Empty for light stores.
    chain: Vec<Block>,
    body_index: HashMap<BlockHash, usize>,
    /// Accepted headers in acceptance order.
    headers: Vec<BlockHeader>,
    header_index: HashMap<BlockHash, usize>,
    genesis: Option<BlockHash>,
    orphans: OrphanPool,
    observers: StoreObservers,
}

impl BlockStore {
    pub fn new(mode: StoreMode, orphans: OrphanPool) -> Self {
        Self {
            mode,
            chain: Vec::new(),
            body_index: HashMap::new(),
            headers: Vec::new(),
            header_index: HashMap::new(),
            genesis: None,
            orphans,
            observers: StoreObservers::new(),
        }
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Register an observer for every state transition.
    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.subscribe(observer);
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Offer a full block to the store. Light stores keep only its header.
    pub fn insert(&mut self, block: Block, now: Timestamp) -> Result<InsertOutcome, LedgerError> {
        let header = block.header();
        let body = match self.mode {
            StoreMode::Full => Some(block),
            StoreMode::Light => None,
        };
        self.insert_entry(header, body, now)
    }

    /// Offer a header without a body. Used by light stores during sync.
    pub fn import_header(
        &mut self,
        header: BlockHeader,
        now: Timestamp,
    ) -> Result<InsertOutcome, LedgerError> {
        self.insert_entry(header, None, now)
    }

    fn insert_entry(
        &mut self,
        header: BlockHeader,
        body: Option<Block>,
        now: Timestamp,
    ) -> Result<InsertOutcome, LedgerError> {
        let block_id = header.block_id;
        if self.header_index.contains_key(&block_id) || self.orphans.contains(&block_id) {
            return Ok(InsertOutcome::Duplicate);
        }

        if header.previous_block_id.is_none() && self.genesis.is_some() {
            self.observers.emit(&StoreEvent::Rejected {
                block_id,
                reason: "second genesis".into(),
            });
            return Err(LedgerError::SecondGenesis { block_id });
        }

        let height = match header.previous_block_id {
            None => 0,
            Some(parent) => match self.header_index.get(&parent) {
                Some(&idx) => self.headers[idx].height + 1,
                None => return self.hold_orphan(parent, header, body, now),
            },
        };

        self.append(header, body, height);
        self.observers.emit(&StoreEvent::Accepted { block_id, height });
        info!(block = %block_id, height, "block accepted");
        let promoted = self.promote_orphans(block_id);
        Ok(InsertOutcome::Accepted { height, promoted })
    }

    fn hold_orphan(
        &mut self,
        parent: BlockHash,
        header: BlockHeader,
        body: Option<Block>,
        now: Timestamp,
    ) -> Result<InsertOutcome, LedgerError> {
        let block_id = header.block_id;
        let body = if self.mode == StoreMode::Full { body } else { None };
        let entry = OrphanEntry {
            header,
            body,
            received_at: now,
        };
        if !self.orphans.insert(parent, entry) {
            self.observers.emit(&StoreEvent::Rejected {
                block_id,
                reason: "orphan pool full".into(),
            });
            return Err(LedgerError::OrphanPoolFull {
                block_id,
                capacity: self.orphans.capacity(),
            });
        }
        self.observers.emit(&StoreEvent::Orphaned {
            block_id,
            missing_parent: parent,
        });
        debug!(block = %block_id, parent = %parent, "block held as orphan");
        Ok(InsertOutcome::Orphaned)
    }

    fn append(&mut self, header: BlockHeader, body: Option<Block>, height: u64) {
        let header = BlockHeader { height, ..header };
        if header.previous_block_id.is_none() {
            self.genesis = Some(header.block_id);
        }
        self.header_index.insert(header.block_id, self.headers.len());
        self.headers.push(header);
        if let (StoreMode::Full, Some(block)) = (self.mode, body) {
            self.body_index.insert(header.block_id, self.chain.len());
            self.chain.push(block);
        }
    }

    /// Promote every orphan reachable from `root`, depth first.
    fn promote_orphans(&mut self, root: BlockHash) -> Vec<BlockHeader> {
        let mut promoted = Vec::new();
        let mut pending = vec![root];
        while let Some(parent) = pending.pop() {
            let parent_height = match self.header_index.get(&parent) {
                Some(&idx) => self.headers[idx].height,
                None => continue,
            };
            for orphan in self.orphans.take_dependents(&parent) {
                let block_id = orphan.header.block_id;
                if self.header_index.contains_key(&block_id) {
                    continue;
                }
                let height = parent_height + 1;
                self.append(orphan.header, orphan.body, height);
                self.observers.emit(&StoreEvent::Promoted { block_id, height });
                info!(block = %block_id, height, "orphan promoted");
                promoted.push(BlockHeader {
                    height,
                    ..orphan.header
                });
                pending.push(block_id);
            }
        }
        promoted
    }

    /// Discard orphans older than `max_age`. Returns how many were removed.
    pub fn expire_orphans(&mut self, max_age: Duration, now: Timestamp) -> usize {
        let removed = self.orphans.clear_expired(max_age, now);
        if removed > 0 {
            debug!(removed, "expired orphans");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether `id` is on the accepted chain.
    pub fn contains(&self, id: &BlockHash) -> bool {
        self.header_index.contains_key(id)
    }

    /// Whether `id` is on the chain or waiting in the orphan pool.
    pub fn knows(&self, id: &BlockHash) -> bool {
        self.contains(id) || self.orphans.contains(id)
    }

    pub fn is_orphan(&self, id: &BlockHash) -> bool {
        self.orphans.contains(id)
    }

    pub fn get_block(&self, id: &BlockHash) -> Option<&Block> {
        self.body_index.get(id).map(|&idx| &self.chain[idx])
    }

    pub fn get_header(&self, id: &BlockHash) -> Option<BlockHeader> {
        self.header_index.get(id).map(|&idx| self.headers[idx])
    }

    pub fn has_genesis(&self) -> bool {
        self.genesis.is_some()
    }

    /// Most recently accepted header.
    pub fn latest(&self) -> Option<BlockHeader> {
        self.headers.last().copied()
    }

    /// Most recently accepted full block.
    pub fn latest_block(&self) -> Option<&Block> {
        self.chain.last()
    }

    /// Greatest accepted height, if any block is accepted.
    pub fn tip_height(&self) -> Option<u64> {
        self.headers.iter().map(|h| h.height).max()
    }

    /// Number of accepted blocks (headers for light stores).
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn headers(&self) -> &[BlockHeader] {
        &self.headers
    }

    /// Accepted headers with `start <= height <= end`, in acceptance order.
    pub fn headers_in_range(&self, start: u64, end: u64) -> Vec<BlockHeader> {
        self.headers
            .iter()
            .filter(|h| h.height >= start && h.height <= end)
            .copied()
            .collect()
    }

    /// Up to `limit` full blocks with height at or above `start`, ordered by
    /// height. The flag reports whether more remain beyond the returned set.
    pub fn blocks_from_height(&self, start: u64, limit: usize) -> (Vec<Block>, bool) {
        let mut eligible: Vec<(u64, &Block)> = self
            .headers
            .iter()
            .filter(|h| h.height >= start)
            .filter_map(|h| self.get_block(&h.block_id).map(|b| (h.height, b)))
            .collect();
        eligible.sort_by_key(|(height, _)| *height);
        let has_more = eligible.len() > limit;
        let blocks = eligible
            .into_iter()
            .take(limit)
            .map(|(_, b)| b.clone())
            .collect();
        (blocks, has_more)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    pub fn orphan_headers(&self) -> Vec<BlockHeader> {
        self.orphans.headers()
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new(StoreMode::Full, OrphanPool::default())
    }
}
