//! Graceful departure: hand pooled transactions to the network and say
//! goodbye.

use braid_messages::{GoodbyeMsg, MempoolTransferMsg, Message};
use braid_types::MessageId;
use tracing::info;

use crate::context::NodeContext;

/// Transactions carried by GOODBYE and by each MEMPOOL_TRANSFER batch.
pub const HANDOFF_BATCH: usize = 100;
/// Peers receiving the MEMPOOL_TRANSFER batches.
pub const TRANSFER_FANOUT: usize = 3;

impl NodeContext {
    /// Queue GOODBYE for every peer and transfer the rest of the pool to a few
    /// random peers. Returns the number of messages queued.
    pub fn announce_departure(&self, reason: &str) -> usize {
        let transactions = self.mempool.lock().transactions().to_vec();
        let split = transactions.len().min(HANDOFF_BATCH);
        let (carried, remainder) = transactions.split_at(split);

        let goodbye = Message::Goodbye(GoodbyeMsg {
            sender_id: self.id().clone(),
            reason: reason.to_string(),
            pending_transactions: carried.to_vec(),
            has_more_transactions: !remainder.is_empty(),
            message_id: MessageId::random(),
        });
        let mut queued = self.broadcast(&goodbye, &[]);

        if !remainder.is_empty() {
            let recipients = {
                let directory = self.directory.lock();
                let mut rng = self.rng.lock();
                directory.random_peers(TRANSFER_FANOUT, &mut *rng)
            };
            let batches: Vec<&[_]> = remainder.chunks(HANDOFF_BATCH).collect();
            let total_batches = batches.len() as u32;
            for (index, batch) in batches.into_iter().enumerate() {
                let transfer = Message::MempoolTransfer(MempoolTransferMsg {
                    sender_id: self.id().clone(),
                    transactions: batch.to_vec(),
                    batch: index as u32 + 1,
                    total_batches,
                    message_id: MessageId::random(),
                });
                queued += recipients
                    .iter()
                    .filter(|peer| self.enqueue(peer, transfer.clone()).is_ok())
                    .count();
            }
        }
        info!(reason, carried = carried.len(), transferred = remainder.len(), queued, "departing");
        queued
    }
}
