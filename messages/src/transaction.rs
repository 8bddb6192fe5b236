//! Pooled transactions.

use braid_types::{MessageId, PeerId, Timestamp, TxHash};
use serde::{Deserialize, Serialize};

/// A value transfer between two peers. Only deduplicated, never validated
/// against balances.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxHash,
    pub from: PeerId,
    pub to: PeerId,
    pub amount: u64,
    pub timestamp: Timestamp,
    pub message_id: MessageId,
}

#[derive(Serialize)]
struct TransactionContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    from: &'a PeerId,
    to: &'a PeerId,
    amount: u64,
    timestamp: Timestamp,
}

impl Transaction {
    pub fn new(from: PeerId, to: PeerId, amount: u64, timestamp: Timestamp) -> Self {
        let mut tx = Self {
            id: TxHash::ZERO,
            from,
            to,
            amount,
            timestamp,
            message_id: MessageId::random(),
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Recompute the id from type, sender, receiver, amount and timestamp.
    pub fn compute_id(&self) -> TxHash {
        let content = TransactionContent {
            kind: "TX",
            from: &self.from,
            to: &self.to,
            amount: self.amount,
            timestamp: self.timestamp,
        };
        let bytes = serde_json::to_vec(&content).unwrap_or_default();
        braid_crypto::hash_transaction(&bytes)
    }

    pub fn has_valid_id(&self) -> bool {
        self.compute_id() == self.id
    }
}
