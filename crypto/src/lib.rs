//! Content hashing for the braid gossip network.
//!
//! Blocks and transactions are identified by the Blake2b-256 digest of their
//! canonical serialization. Peers recompute the digest on receipt; a mismatch
//! is a protocol offense.

pub mod hash;

pub use hash::{blake2b_256, hash_block, hash_transaction};
