//! Fundamental types for the braid gossip network.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: content hashes, peer identity and capability flags, message ids,
//! timestamps and the clock port.

#[macro_use]
mod macros;

pub mod block;
pub mod error;
pub mod hash;
pub mod message_id;
pub mod peer;
pub mod time;

pub use block::BlockHash;
pub use error::BraidError;
pub use hash::TxHash;
pub use message_id::MessageId;
pub use peer::{PeerAddress, PeerFlags, PeerId, PeerStatus};
pub use time::{Clock, SystemClock, Timestamp};
