//! A braid gossip node.
//!
//! [`NodeContext`] owns every service of a running node: the peer directory,
//! the outbound queues and simulated link, the seen-message cache, the block
//! store and the transaction pool. Inbound records go through
//! [`NodeContext::handle_line`]; [`BraidNode`] wires the context to TCP and
//! runs the background tasks.

pub mod config;
pub mod context;
pub mod departure;
pub mod dispatcher;
pub mod error;
pub mod generator;
pub mod listener;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod outbound;
pub mod pending;
pub mod rounds;
pub mod shutdown;
pub mod snapshot;
pub mod sync;
pub mod tasks;
pub mod tracing_spans;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{NodeConfig, NoopPeerTable, PeerConfig, PeerTableSink, TomlPeerTable};
pub use context::{NodeContext, NodeIdentity, NodePorts};
pub use dispatcher::Disposition;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::BraidNode;
pub use outbound::DeliveryOutcome;
pub use rounds::CleanupReport;
pub use shutdown::ShutdownController;
pub use snapshot::NodeSnapshot;
