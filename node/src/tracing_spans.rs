//! Span constructors for common node operations.
//!
//! Consistent span names and fields make inbound handling and delivery
//! easy to correlate across peers in aggregated logs.

use tracing::{info_span, Span};

/// Handling of a single inbound message.
pub fn network_recv_span(peer: &str, msg_type: &str) -> Span {
    info_span!("network_recv", peer = %peer, msg_type = %msg_type)
}

/// Delivery attempt of one queued message.
pub fn deliver_span(destination: &str, msg_type: &str) -> Span {
    info_span!("deliver", dest = %destination, msg_type = %msg_type)
}

/// Creation of a locally generated block.
pub fn block_generate_span(height: u64) -> Span {
    info_span!("block_generate", height = height)
}
