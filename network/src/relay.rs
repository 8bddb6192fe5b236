//! Relay selection and route resolution for NAT-restricted destinations.

use crate::peer_directory::PeerDirectory;
use crate::stats::DropReason;
use braid_messages::{Message, RelayMsg};
use braid_types::{MessageId, PeerAddress, PeerId};
use rand::seq::SliceRandom;
use rand::Rng;

/// Where a message physically goes.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    /// The peer the bytes are sent to: the destination itself or a relay.
    pub via: PeerId,
    pub address: PeerAddress,
    /// The message as sent; a RELAY envelope when `via` is a relay.
    pub message: Message,
}

impl Route {
    pub fn is_relayed(&self) -> bool {
        matches!(self.message, Message::Relay(_))
    }
}

/// Choose a relay for `target` among peers known to reach it.
///
/// NAT-restricted candidates are skipped. The candidate with the lowest
/// measured RTT wins; with no RTT data at all, one is chosen at random.
pub fn select_relay<R: Rng + ?Sized>(
    directory: &PeerDirectory,
    target: &PeerId,
    rng: &mut R,
) -> Option<PeerId> {
    let entry = directory.get(target)?;
    let mut candidates: Vec<&PeerId> = entry
        .reachable_by
        .iter()
        .filter(|id| *id != target)
        .filter(|id| directory.flags_of(id).is_some_and(|f| !f.nat))
        .collect();
    candidates.sort();

    let fastest = candidates
        .iter()
        .filter_map(|id| directory.rtt_of(id).map(|rtt| (rtt, *id)))
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
    match fastest {
        Some((_, id)) => Some(id.clone()),
        None => candidates.choose(rng).map(|id| (*id).clone()),
    }
}

/// Decide how `message` reaches `destination`.
///
/// Non-NAT destinations are sent directly. A RELAY envelope that is already
/// addressed to `destination` is the last hop and also goes directly. Any
/// other message for a NAT destination is wrapped in a fresh envelope and
/// sent to the chosen relay.
pub fn resolve_route<R: Rng + ?Sized>(
    directory: &PeerDirectory,
    destination: &PeerId,
    message: &Message,
    rng: &mut R,
) -> Result<Route, DropReason> {
    let entry = directory.get(destination).ok_or(DropReason::NoRoute)?;
    let last_hop = matches!(message, Message::Relay(r) if r.target_id == *destination);
    if !entry.flags.nat || last_hop {
        return Ok(Route {
            via: destination.clone(),
            address: entry.address.clone(),
            message: message.clone(),
        });
    }

    let relay = select_relay(directory, destination, rng).ok_or(DropReason::NoRoute)?;
    let address = directory
        .address_of(&relay)
        .cloned()
        .ok_or(DropReason::NoRoute)?;
    let envelope = Message::Relay(RelayMsg {
        sender_id: directory.self_id().clone(),
        target_id: destination.clone(),
        payload: Box::new(message.clone()),
        message_id: MessageId::random(),
    });
    Ok(Route {
        via: relay,
        address,
        message: envelope,
    })
}
