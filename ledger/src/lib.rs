//! Chain state for a braid node.
//!
//! The [`BlockStore`] owns the accepted chain, its header index and the orphan
//! pool, and notifies registered observers of every state transition. The
//! [`TransactionPool`] is the deduplicated set of pending transactions.

pub mod block_store;
pub mod error;
pub mod events;
pub mod mempool;
pub mod orphan;

pub use block_store::{BlockStore, InsertOutcome, StoreMode};
pub use error::LedgerError;
pub use events::{Observer, StoreEvent, StoreObservers};
pub use mempool::TransactionPool;
pub use orphan::{OrphanEntry, OrphanPool, DEFAULT_ORPHAN_CAPACITY, DEFAULT_ORPHAN_EXPIRY};
