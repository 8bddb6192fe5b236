//! Fan-out target selection.

use crate::peer_directory::PeerDirectory;
use braid_messages::MessageKind;
use braid_types::{PeerId, PeerStatus};
use rand::seq::SliceRandom;
use rand::Rng;

/// Default number of peers a message is gossiped to.
pub const DEFAULT_FANOUT: usize = 3;

/// Pick the recipients of a gossiped message.
///
/// Candidates are all known peers not classified unreachable and not listed in
/// `exclude`; transactions additionally skip light nodes. When there are no more candidates than
/// `fanout`, all of them are returned, otherwise a uniform sample of `fanout`.
pub fn select_targets<R: Rng + ?Sized>(
    directory: &PeerDirectory,
    kind: MessageKind,
    fanout: usize,
    exclude: &[PeerId],
    rng: &mut R,
) -> Vec<PeerId> {
    let mut candidates: Vec<PeerId> = directory
        .iter()
        .filter(|(id, _)| *id != directory.self_id() && !exclude.contains(id))
        .filter(|(_, e)| e.status != PeerStatus::Unreachable)
        .filter(|(_, e)| kind != MessageKind::Tx || !e.flags.light)
        .map(|(id, _)| id.clone())
        .collect();
    candidates.sort();
    if candidates.len() <= fanout {
        return candidates;
    }
    candidates.choose_multiple(rng, fanout).cloned().collect()
}
