use braid_types::BlockHash;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("second genesis block {block_id} rejected")]
    SecondGenesis { block_id: BlockHash },

    #[error("orphan pool full ({capacity} entries), block {block_id} rejected")]
    OrphanPoolFull { block_id: BlockHash, capacity: usize },
}
