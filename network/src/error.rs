use braid_types::{PeerAddress, PeerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection to {addr} failed: {reason}")]
    ConnectionFailed { addr: PeerAddress, reason: String },

    #[error("{op} to {addr} timed out")]
    Timeout { op: &'static str, addr: PeerAddress },

    #[error("peer {0} not found")]
    PeerNotFound(PeerId),

    #[error("no relay can reach NAT peer {0}")]
    NoRelay(PeerId),

    #[error("protocol error: {0}")]
    Protocol(#[from] braid_protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
