//! Nullable transport: record messages without sending them.

use async_trait::async_trait;
use braid_messages::{Message, MessageKind};
use braid_network::{NetworkError, Transport};
use braid_types::PeerAddress;
use parking_lot::Mutex;
use std::collections::HashSet;

/// A transport that records every send instead of opening connections.
///
/// Sends to addresses marked with [`NullTransport::fail_for`] return a
/// connection error and are not recorded.
#[derive(Default)]
pub struct NullTransport {
    sent: Mutex<Vec<(PeerAddress, Message)>>,
    failing: Mutex<HashSet<PeerAddress>>,
}

impl NullTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future send to `address` fail.
    pub fn fail_for(&self, address: PeerAddress) {
        self.failing.lock().insert(address);
    }

    /// Let sends to `address` succeed again.
    pub fn heal(&self, address: &PeerAddress) {
        self.failing.lock().remove(address);
    }

    /// Every recorded send, oldest first.
    pub fn sent(&self) -> Vec<(PeerAddress, Message)> {
        self.sent.lock().clone()
    }

    /// Messages recorded for one address.
    pub fn sent_to(&self, address: &PeerAddress) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Recorded messages of one type.
    pub fn sent_of(&self, kind: MessageKind) -> Vec<(PeerAddress, Message)> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, m)| m.kind() == kind)
            .cloned()
            .collect()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<(PeerAddress, Message)> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Clear all state.
    pub fn reset(&self) {
        self.sent.lock().clear();
        self.failing.lock().clear();
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn send(&self, address: &PeerAddress, message: &Message) -> Result<(), NetworkError> {
        if self.failing.lock().contains(address) {
            return Err(NetworkError::ConnectionFailed {
                addr: address.clone(),
                reason: "null transport configured to fail".into(),
            });
        }
        self.sent.lock().push((address.clone(), message.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_messages::PingMsg;
    use braid_types::{MessageId, PeerId, Timestamp};

    fn ping() -> Message {
        Message::Ping(PingMsg {
            sender_id: PeerId::from("a"),
            timestamp: Timestamp::EPOCH,
            message_id: MessageId::random(),
        })
    }

    #[tokio::test]
    async fn records_and_fails_on_demand() {
        let transport = NullTransport::new();
        let ok = PeerAddress::new("127.0.0.1", 1);
        let bad = PeerAddress::new("127.0.0.1", 2);
        transport.fail_for(bad.clone());

        assert!(transport.send(&ok, &ping()).await.is_ok());
        assert!(transport.send(&bad, &ping()).await.is_err());
        assert_eq!(transport.sent_to(&ok).len(), 1);
        assert!(transport.sent_to(&bad).is_empty());
        assert_eq!(transport.sent_of(MessageKind::Ping).len(), 1);

        transport.heal(&bad);
        assert!(transport.send(&bad, &ping()).await.is_ok());
        assert_eq!(transport.take().len(), 2);
        assert!(transport.sent().is_empty());
    }
}
