//! Block content id.

hex_hash_type!(
    /// A 32-byte block id: the content hash of every block field except the id.
    BlockHash
);
