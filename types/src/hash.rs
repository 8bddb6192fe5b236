//! Transaction content id.

hex_hash_type!(
    /// A 32-byte transaction id: the hash of type, sender, receiver, amount
    /// and timestamp.
    TxHash
);
