//! Networking layer for braid nodes.
//!
//! Holds the peer directory and its liveness and reputation bookkeeping, the
//! building blocks of the outbound delivery pipeline (rate windows, priority
//! queues with retry state, relay routing, the simulated link) and the
//! transport port with its TCP implementation.

pub mod dedup;
pub mod error;
pub mod gossip;
pub mod link;
pub mod liveness;
pub mod outbox;
pub mod peer_directory;
pub mod rate_window;
pub mod relay;
pub mod reputation;
pub mod stats;
pub mod throttle;
pub mod transport;

pub use dedup::{Seen, SeenCache};
pub use error::NetworkError;
pub use gossip::select_targets;
pub use link::{LinkParams, LinkSimulator};
pub use liveness::LivenessPolicy;
pub use outbox::{Dequeued, Outbox, OutboxConfig, QueuedMessage, RetryDecision, RetryState};
pub use peer_directory::{PeerDirectory, PeerEntry, PeerView};
pub use rate_window::SlidingWindow;
pub use relay::{resolve_route, select_relay, Route};
pub use reputation::Reputation;
pub use stats::{DropReason, DropStats};
pub use throttle::TokenBucket;
pub use transport::{TcpTransport, Transport};
