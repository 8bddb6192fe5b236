//! Outbound path: admission into the per-destination queues, gossip fan-out
//! and delivery of queued messages over the simulated link.

use braid_messages::Message;
use braid_network::{
    resolve_route, select_targets, Dequeued, DropReason, QueuedMessage, RetryDecision,
};
use braid_types::{PeerId, Timestamp};
use tracing::{debug, trace, Instrument};

use crate::context::NodeContext;
use crate::tracing_spans::deliver_span;

/// What a single delivery step did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Nothing was eligible for delivery.
    Idle,
    Sent,
    /// The head entry outlived its TTL and was discarded.
    Expired,
    /// The send failed and the entry was requeued at a lower priority.
    Retrying,
    Dropped(DropReason),
}

impl NodeContext {
    /// Queue `message` for `destination`.
    ///
    /// Rejected when the destination is blacklisted or unknown, when it has
    /// used up its send window, or when its queue is full.
    pub fn enqueue(&self, destination: &PeerId, message: Message) -> Result<(), DropReason> {
        let now = self.now();
        let result = self.admit_outbound(destination, message, now);
        match result {
            Ok(()) => self.outbox_ready.notify_one(),
            Err(reason) => {
                trace!(dest = %destination, %reason, "outbound message rejected");
                self.record_drop(reason);
            }
        }
        result
    }

    fn admit_outbound(
        &self,
        destination: &PeerId,
        message: Message,
        now: Timestamp,
    ) -> Result<(), DropReason> {
        if self.reputation.lock().is_blacklisted(destination) {
            return Err(DropReason::Blacklisted);
        }
        let address = self
            .directory
            .lock()
            .address_of(destination)
            .cloned()
            .ok_or(DropReason::NoRoute)?;
        if !self.send_window.lock().allow(destination, now) {
            return Err(DropReason::RateLimited);
        }
        let priority = message.priority();
        self.outbox.lock().push(QueuedMessage {
            destination: destination.clone(),
            address,
            message,
            priority,
            enqueued_at: now,
        })
    }

    /// Gossip `message` to a fan-out sample of peers, skipping `exclude`.
    /// Returns how many copies were queued.
    pub fn gossip(&self, message: &Message, exclude: &[PeerId]) -> usize {
        let targets = {
            let directory = self.directory.lock();
            let mut rng = self.rng.lock();
            select_targets(
                &directory,
                message.kind(),
                self.identity.fanout,
                exclude,
                &mut *rng,
            )
        };
        targets
            .iter()
            .filter(|target| self.enqueue(target, message.clone()).is_ok())
            .count()
    }

    /// Queue `message` for every known peer not in `exclude`.
    pub fn broadcast(&self, message: &Message, exclude: &[PeerId]) -> usize {
        let peers = self.directory.lock().peer_ids();
        peers
            .iter()
            .filter(|peer| !exclude.contains(peer))
            .filter(|peer| self.enqueue(peer, message.clone()).is_ok())
            .count()
    }

    /// Queue `message` for one random peer, if any is known.
    pub fn send_to_random(&self, message: Message, exclude: &[PeerId]) -> Option<PeerId> {
        let target = {
            let directory = self.directory.lock();
            let mut rng = self.rng.lock();
            let candidates: Vec<PeerId> = directory
                .peer_ids()
                .into_iter()
                .filter(|id| !exclude.contains(id))
                .collect();
            rand::seq::SliceRandom::choose(candidates.as_slice(), &mut *rng).cloned()
        }?;
        self.enqueue(&target, message).ok().map(|_| target)
    }

    /// Take the next eligible entry from the outbox and try to deliver it.
    pub async fn deliver_next(&self) -> DeliveryOutcome {
        let now = self.now();
        let dequeued = self.outbox.lock().pop_next(now);
        let entry = match dequeued {
            None => return DeliveryOutcome::Idle,
            Some(Dequeued::Expired(entry)) => {
                debug!(dest = %entry.destination, kind = entry.message.kind().as_str(), "queued message expired");
                self.record_drop(DropReason::Expired);
                return DeliveryOutcome::Expired;
            }
            Some(Dequeued::Ready(entry)) => entry,
        };
        let span = deliver_span(entry.destination.as_str(), entry.message.kind().as_str());
        self.deliver(entry, now).instrument(span).await
    }

    async fn deliver(&self, entry: QueuedMessage, now: Timestamp) -> DeliveryOutcome {
        if self.reputation.lock().is_blacklisted(&entry.destination) {
            self.record_drop(DropReason::Blacklisted);
            return DeliveryOutcome::Dropped(DropReason::Blacklisted);
        }

        let route = {
            let directory = self.directory.lock();
            let mut rng = self.rng.lock();
            resolve_route(&directory, &entry.destination, &entry.message, &mut *rng)
        };
        let route = match route {
            Ok(route) => route,
            Err(reason) => {
                self.record_drop(reason);
                return DeliveryOutcome::Dropped(reason);
            }
        };

        let admitted = self.link.lock().admit(now);
        let latency = match admitted {
            Ok(latency) => latency,
            Err(reason) => {
                self.drops.record_link(reason, route.message.kind());
                self.metrics.messages_dropped.inc();
                return self.retry(entry, now);
            }
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match self.transport.send(&route.address, &route.message).await {
            Ok(()) => {
                trace!(via = %route.via, relayed = route.is_relayed(), "sent");
                self.outbox.lock().record_success(&entry.destination);
                self.metrics.sends_ok.inc();
                DeliveryOutcome::Sent
            }
            Err(e) => {
                debug!(via = %route.via, error = %e, "send failed");
                self.metrics.sends_failed.inc();
                self.retry(entry, self.now())
            }
        }
    }

    fn retry(&self, entry: QueuedMessage, now: Timestamp) -> DeliveryOutcome {
        let decision = self.outbox.lock().record_failure(entry, now);
        match decision {
            RetryDecision::Requeued { attempt, .. } => {
                trace!(attempt, "requeued for retry");
                DeliveryOutcome::Retrying
            }
            RetryDecision::Dropped(reason) => {
                self.record_drop(reason);
                DeliveryOutcome::Dropped(reason)
            }
        }
    }

    /// Deliver until nothing is eligible. Returns the number of steps taken.
    pub async fn drain_outbox(&self) -> usize {
        let mut steps = 0;
        while self.deliver_next().await != DeliveryOutcome::Idle {
            steps += 1;
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, peer};
    use braid_messages::{MessageKind, PingMsg};
    use braid_types::MessageId;

    fn ping() -> Message {
        Message::Ping(PingMsg {
            sender_id: PeerId::from("5000"),
            timestamp: Timestamp::from_secs(1),
            message_id: MessageId::random(),
        })
    }

    #[test]
    fn unknown_destination_has_no_route() {
        let h = harness("5000", |_| {});
        assert_eq!(
            h.ctx.enqueue(&PeerId::from("9999"), ping()),
            Err(DropReason::NoRoute)
        );
        assert_eq!(h.ctx.drops.count(DropReason::NoRoute), 1);
    }

    #[test]
    fn broadcast_skips_excluded_peers() {
        let h = harness("5000", |c| {
            for port in [5001, 5002, 5003] {
                c.peers.insert(PeerId::from(port.to_string()), peer(port));
            }
        });
        assert_eq!(h.ctx.broadcast(&ping(), &[PeerId::from("5002")]), 2);
        assert_eq!(h.ctx.outbox.lock().depth(&PeerId::from("5002")), 0);
    }

    #[test]
    fn random_send_honours_exclusions() {
        let h = harness("5000", |c| {
            c.peers.insert(PeerId::from("5001"), peer(5001));
        });
        assert_eq!(h.ctx.send_to_random(ping(), &[PeerId::from("5001")]), None);
        assert_eq!(h.ctx.send_to_random(ping(), &[]), Some(PeerId::from("5001")));
    }

    #[tokio::test]
    async fn link_loss_counts_against_the_kind_and_retries() {
        let h = harness("5000", |c| {
            c.peers.insert(PeerId::from("5001"), peer(5001));
            c.link.drop_probability = 1.0;
        });
        h.ctx.enqueue(&PeerId::from("5001"), ping()).unwrap();

        assert_eq!(h.ctx.deliver_next().await, DeliveryOutcome::Retrying);
        assert_eq!(h.ctx.drops.link_count(MessageKind::Ping), 1);
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.ctx.outbox.lock().depth(&PeerId::from("5001")), 1);
    }

    #[tokio::test]
    async fn blacklisted_destination_is_dropped_at_delivery() {
        let h = harness("5000", |c| {
            c.peers.insert(PeerId::from("5001"), peer(5001));
        });
        h.ctx.enqueue(&PeerId::from("5001"), ping()).unwrap();
        for _ in 0..4 {
            h.ctx.record_offense(&PeerId::from("5001"), "test");
        }
        // The ban already cleared the queue.
        assert_eq!(h.ctx.deliver_next().await, DeliveryOutcome::Idle);
        assert!(h.transport.sent().is_empty());
    }
}
