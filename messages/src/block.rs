//! Blocks and their header view.

use braid_types::{BlockHash, MessageId, PeerId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::Transaction;

/// A block as gossiped between peers.
///
/// `block_id` is the Blake2b-256 digest of every other field (including the
/// `BLOCK` type tag), serialized in a fixed order. Receivers recompute it with
/// [`Block::compute_id`] before handing the block to the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Creator of the block.
    pub peer_id: PeerId,
    pub timestamp: Timestamp,
    pub block_id: BlockHash,
    /// `None` only for the genesis block.
    pub previous_block_id: Option<BlockHash>,
    pub height: u64,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    pub message_id: MessageId,
}

/// Hashed view of a block: every field except the id.
#[derive(Serialize)]
struct BlockContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    peer_id: &'a PeerId,
    timestamp: Timestamp,
    previous_block_id: Option<&'a BlockHash>,
    height: u64,
    transactions: &'a [Transaction],
    message_id: &'a MessageId,
}

impl Block {
    /// Build a block and stamp it with its content id.
    pub fn new(
        creator: PeerId,
        timestamp: Timestamp,
        previous_block_id: Option<BlockHash>,
        height: u64,
        transactions: Vec<Transaction>,
    ) -> Self {
        let mut block = Self {
            peer_id: creator,
            timestamp,
            block_id: BlockHash::ZERO,
            previous_block_id,
            height,
            transactions,
            message_id: MessageId::random(),
        };
        block.block_id = block.compute_id();
        block
    }

    /// Recompute the content id from the block's fields.
    pub fn compute_id(&self) -> BlockHash {
        let content = BlockContent {
            kind: "BLOCK",
            peer_id: &self.peer_id,
            timestamp: self.timestamp,
            previous_block_id: self.previous_block_id.as_ref(),
            height: self.height,
            transactions: &self.transactions,
            message_id: &self.message_id,
        };
        // Plain data with string keys always serializes.
        let bytes = serde_json::to_vec(&content).unwrap_or_default();
        braid_crypto::hash_block(&bytes)
    }

    /// Whether the declared id matches the content.
    pub fn has_valid_id(&self) -> bool {
        self.compute_id() == self.block_id
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_block_id.is_none()
    }

    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            block_id: self.block_id,
            previous_block_id: self.previous_block_id,
            height: self.height,
        }
    }
}

/// Reduced per-block record kept by light nodes and served during sync.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    pub block_id: BlockHash,
    pub previous_block_id: Option<BlockHash>,
    pub height: u64,
}
