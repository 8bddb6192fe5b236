//! Local block and transaction creation.

use braid_messages::{Block, InvMsg, Message, Transaction};
use braid_types::{BlockHash, MessageId};
use rand::Rng;
use tracing::info;

use crate::context::NodeContext;
use crate::tracing_spans::block_generate_span;
use crate::NodeError;

impl NodeContext {
    /// Seal the whole transaction pool into a block on top of the local tip,
    /// store it and announce it. Light nodes never generate blocks.
    ///
    /// A malicious node stamps the block with a random id instead of its
    /// content hash.
    pub fn generate_block(&self) -> Result<Option<Block>, NodeError> {
        if self.is_light() {
            return Ok(None);
        }
        let now = self.now();
        let (previous, height) = match self.store.lock().latest() {
            Some(tip) => (Some(tip.block_id), tip.height + 1),
            None => (None, 0),
        };
        let _span = block_generate_span(height).entered();

        let transactions = self.mempool.lock().take_all();
        let mut block = Block::new(self.id().clone(), now, previous, height, transactions);
        if self.identity.malicious {
            block.block_id = BlockHash::new(self.rng.lock().gen());
        }
        self.seen.lock().observe(&block.message_id, now);
        self.store.lock().insert(block.clone(), now)?;
        info!(
            block = %block.block_id,
            height,
            txs = block.transactions.len(),
            forged = self.identity.malicious,
            "block created"
        );

        let inv = Message::Inv(InvMsg {
            sender_id: self.id().clone(),
            block_ids: vec![block.block_id],
            message_id: MessageId::random(),
        });
        self.gossip(&inv, &[]);
        Ok(Some(block))
    }

    /// Pay a random amount to a random peer, pool the transaction and gossip
    /// it. Light nodes never generate transactions.
    pub fn generate_transaction(&self) -> Option<Transaction> {
        if self.is_light() {
            return None;
        }
        let now = self.now();
        let (recipient, amount) = {
            let directory = self.directory.lock();
            let mut rng = self.rng.lock();
            let recipient = directory.random_peers(1, &mut *rng).pop()?;
            (recipient, rng.gen_range(1..=100))
        };
        let tx = Transaction::new(self.id().clone(), recipient, amount, now);
        self.submit_transaction(tx.clone());
        Some(tx)
    }

    /// Pool a locally created transaction and gossip it.
    pub fn submit_transaction(&self, tx: Transaction) -> usize {
        let now = self.now();
        self.seen.lock().observe(&tx.message_id, now);
        if !self.mempool.lock().add(tx.clone()) {
            return 0;
        }
        info!(tx = %tx.id, to = %tx.to, amount = tx.amount, "transaction created");
        self.gossip(&Message::Tx(tx), &[])
    }
}
