//! Builders shared by the unit tests in this crate.

use braid_nullables::{NullClock, NullTransport};
use braid_types::{PeerAddress, PeerFlags, PeerId};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::{LinkConfig, NodeConfig, PeerConfig, PeerTableSink};
use crate::context::{NodeContext, NodeIdentity, NodePorts};
use crate::NodeError;

pub(crate) fn peer(port: u16) -> PeerConfig {
    PeerConfig {
        ip: "127.0.0.1".into(),
        port,
        fanout: 3,
        nat: false,
        light: false,
        malicious: false,
    }
}

/// A config whose link never drops, adds no latency and has ample capacity.
pub(crate) fn test_config(customize: impl FnOnce(&mut NodeConfig)) -> NodeConfig {
    let mut config = NodeConfig {
        link: LinkConfig {
            drop_probability: 0.0,
            latency_min_ms: 0,
            latency_max_ms: 0,
            capacity: 1_000,
            min_capacity: 1,
            max_capacity: 1_000,
            ..LinkConfig::default()
        },
        ..NodeConfig::default()
    };
    customize(&mut config);
    config
}

/// Records peer-table notifications.
#[derive(Default)]
pub(crate) struct RecordingPeerTable {
    pub added: Mutex<Vec<PeerId>>,
    pub removed: Mutex<Vec<PeerId>>,
}

impl PeerTableSink for RecordingPeerTable {
    fn peer_added(&self, id: &PeerId, _: &PeerAddress, _: PeerFlags) -> Result<(), NodeError> {
        self.added.lock().push(id.clone());
        Ok(())
    }

    fn peer_removed(&self, id: &PeerId) -> Result<(), NodeError> {
        self.removed.lock().push(id.clone());
        Ok(())
    }
}

pub(crate) struct Harness {
    pub ctx: Arc<NodeContext>,
    pub clock: Arc<NullClock>,
    pub transport: Arc<NullTransport>,
    pub peer_table: Arc<RecordingPeerTable>,
}

pub(crate) fn harness(id: &str, customize: impl FnOnce(&mut NodeConfig)) -> Harness {
    let config = test_config(customize);
    let id = PeerId::from(id);
    let identity = NodeIdentity::from_config(&config, &id).unwrap();
    let clock = Arc::new(NullClock::from_secs(1_000));
    let transport = Arc::new(NullTransport::new());
    let peer_table = Arc::new(RecordingPeerTable::default());
    let ports = NodePorts {
        clock: clock.clone(),
        transport: transport.clone(),
        peer_table: peer_table.clone(),
    };
    let ctx = Arc::new(NodeContext::new(identity, config, ports).unwrap());
    Harness {
        ctx,
        clock,
        transport,
        peer_table,
    }
}

pub(crate) fn test_context(id: &str, customize: impl FnOnce(&mut NodeConfig)) -> NodeContext {
    let config = test_config(customize);
    let id = PeerId::from(id);
    let identity = NodeIdentity::from_config(&config, &id).unwrap();
    let ports = NodePorts {
        clock: Arc::new(NullClock::from_secs(1_000)),
        transport: Arc::new(NullTransport::new()),
        peer_table: Arc::new(RecordingPeerTable::default()),
    };
    NodeContext::new(identity, config, ports).unwrap()
}
