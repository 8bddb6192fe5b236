//! Blake2b-256 content ids.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use braid_types::{BlockHash, TxHash};

type Blake2b256 = Blake2b<U32>;

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    Blake2b256::digest(data).into()
}

/// Id of a block given its canonical bytes.
pub fn hash_block(canonical: &[u8]) -> BlockHash {
    BlockHash::new(blake2b_256(canonical))
}

/// Id of a transaction given its canonical bytes.
pub fn hash_transaction(canonical: &[u8]) -> TxHash {
    TxHash::new(blake2b_256(canonical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_changed_byte_changes_the_id() {
        let a = hash_block(br#"{"height":1}"#);
        let b = hash_block(br#"{"height":2}"#);
        assert_ne!(a, b);
        assert_eq!(a, hash_block(br#"{"height":1}"#));
    }

    #[test]
    fn known_empty_digest() {
        assert_eq!(
            hash_transaction(b"").to_hex(),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
    }
}
