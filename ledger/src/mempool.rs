//! Transaction pool: a deduplicated append set.

use braid_messages::Transaction;
use braid_types::TxHash;
use std::collections::HashSet;

#[derive(Default)]
pub struct TransactionPool {
    transactions: Vec<Transaction>,
    ids: HashSet<TxHash>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction unless its id is already pooled. Returns `true` if added.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if !self.ids.insert(tx.id) {
            return false;
        }
        self.transactions.push(tx);
        true
    }

    /// Add many; returns how many were new.
    pub fn extend(&mut self, txs: impl IntoIterator<Item = Transaction>) -> usize {
        txs.into_iter().map(|tx| self.add(tx)).filter(|added| *added).count()
    }

    pub fn contains(&self, id: &TxHash) -> bool {
        self.ids.contains(id)
    }

    /// Empty the pool, returning its contents in arrival order.
    pub fn take_all(&mut self) -> Vec<Transaction> {
        self.ids.clear();
        std::mem::take(&mut self.transactions)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
