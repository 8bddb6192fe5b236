//! Block store state transitions and the observer registry.

use braid_types::BlockHash;

/// A state transition of one block id inside the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    /// Appended to the chain on arrival.
    Accepted { block_id: BlockHash, height: u64 },
    /// Held until its parent arrives.
    Orphaned { block_id: BlockHash, missing_parent: BlockHash },
    /// Moved from the orphan pool to the chain after its parent was accepted.
    Promoted { block_id: BlockHash, height: u64 },
    /// Refused outright.
    Rejected { block_id: BlockHash, reason: String },
}

impl StoreEvent {
    pub fn block_id(&self) -> &BlockHash {
        match self {
            Self::Accepted { block_id, .. }
            | Self::Orphaned { block_id, .. }
            | Self::Promoted { block_id, .. }
            | Self::Rejected { block_id, .. } => block_id,
        }
    }

    /// Whether the block ended up on the chain.
    pub fn is_on_chain(&self) -> bool {
        matches!(self, Self::Accepted { .. } | Self::Promoted { .. })
    }
}

pub type Observer = Box<dyn Fn(&StoreEvent) + Send + Sync>;

/// Synchronous fan-out to registered observers.
///
/// Observers run inline while the store is being mutated, so they must not
/// call back into the store.
#[derive(Default)]
pub struct StoreObservers {
    observers: Vec<Observer>,
}

impl StoreObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    pub fn emit(&self, event: &StoreEvent) {
        for observer in &self.observers {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
