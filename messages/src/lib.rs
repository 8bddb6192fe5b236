//! Wire message types for braid node-to-node gossip.
//!
//! Every record on the wire is a flat JSON object tagged by `type`. The
//! [`Message`] enum has one variant per type so the dispatcher can match
//! exhaustively; records that fail to decode into it are structurally invalid.

pub mod block;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use transaction::Transaction;

use braid_types::{BlockHash, MessageId, PeerFlags, PeerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level wire message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// Periodic self-announcement carrying address and capability flags.
    Hello(HelloMsg),
    Ping(PingMsg),
    Pong(PongMsg),
    Tx(Transaction),
    Block(Block),
    /// Inventory announcement of block ids.
    Inv(InvMsg),
    #[serde(rename = "GETBLOCK")]
    GetBlock(GetBlockMsg),
    GetBlockHeaders(GetBlockHeadersMsg),
    BlockHeaders(BlockHeadersMsg),
    BlockBatch(BlockBatchMsg),
    GetLatestBlock(GetLatestBlockMsg),
    /// Envelope used to reach a NAT-restricted peer through an intermediary.
    Relay(RelayMsg),
    NewPeer(NewPeerMsg),
    Goodbye(GoodbyeMsg),
    GetMempool(GetMempoolMsg),
    MempoolData(MempoolDataMsg),
    MempoolTransfer(MempoolTransferMsg),
    GetPeers(GetPeersMsg),
    PeersList(PeersListMsg),
}

/// Flags carried by a HELLO.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloFlags {
    #[serde(default)]
    pub nat: bool,
    #[serde(default)]
    pub light: bool,
    /// Set on the first announcement of a node that was not in the bootstrap table.
    #[serde(default)]
    pub new_node: bool,
}

impl HelloFlags {
    pub fn peer_flags(&self) -> PeerFlags {
        PeerFlags {
            nat: self.nat,
            light: self.light,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HelloMsg {
    pub sender_id: PeerId,
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub flags: HelloFlags,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PingMsg {
    pub sender_id: PeerId,
    /// Send time on the pinger's clock.
    pub timestamp: Timestamp,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PongMsg {
    pub sender_id: PeerId,
    /// The PING timestamp echoed back unchanged.
    pub timestamp: Timestamp,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvMsg {
    pub sender_id: PeerId,
    pub block_ids: Vec<BlockHash>,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetBlockMsg {
    pub sender_id: PeerId,
    pub requested_ids: Vec<BlockHash>,
    pub message_id: MessageId,
}

fn unbounded_height() -> u64 {
    u64::MAX
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetBlockHeadersMsg {
    pub sender_id: PeerId,
    #[serde(default)]
    pub start_height: u64,
    /// Inclusive upper bound; absent means "up to the tip".
    #[serde(default = "unbounded_height")]
    pub end_height: u64,
    #[serde(default)]
    pub is_new_node: bool,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHeadersMsg {
    pub sender_id: PeerId,
    pub headers: Vec<BlockHeader>,
    /// The headers answer a new node's bootstrap request.
    #[serde(default)]
    pub is_full_chain: bool,
    pub start_height: u64,
    pub end_height: u64,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockBatchMsg {
    pub sender_id: PeerId,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_height: u64,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetLatestBlockMsg {
    pub sender_id: PeerId,
    /// Height of the requester's tip; `None` while it has no blocks.
    #[serde(default)]
    pub current_height: Option<u64>,
    #[serde(default)]
    pub is_new_node: bool,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayMsg {
    pub sender_id: PeerId,
    pub target_id: PeerId,
    pub payload: Box<Message>,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewPeerMsg {
    pub sender_id: PeerId,
    pub new_peer_id: PeerId,
    pub new_peer_ip: String,
    pub new_peer_port: u16,
    #[serde(default)]
    pub new_peer_flags: PeerFlags,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoodbyeMsg {
    pub sender_id: PeerId,
    pub reason: String,
    #[serde(default)]
    pub pending_transactions: Vec<Transaction>,
    #[serde(default)]
    pub has_more_transactions: bool,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetMempoolMsg {
    pub sender_id: PeerId,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MempoolDataMsg {
    pub sender_id: PeerId,
    pub transactions: Vec<Transaction>,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MempoolTransferMsg {
    pub sender_id: PeerId,
    pub transactions: Vec<Transaction>,
    /// 1-based batch index.
    pub batch: u32,
    pub total_batches: u32,
    pub message_id: MessageId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GetPeersMsg {
    pub sender_id: PeerId,
    pub message_id: MessageId,
}

/// One entry of a PEERS_LIST.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerListing {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub flags: PeerFlags,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeersListMsg {
    pub sender_id: PeerId,
    pub peers: BTreeMap<PeerId, PeerListing>,
    pub message_id: MessageId,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Field-less discriminant of [`Message`], used for priority classification
/// and per-type statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Hello,
    Ping,
    Pong,
    Tx,
    Block,
    Inv,
    GetBlock,
    GetBlockHeaders,
    BlockHeaders,
    BlockBatch,
    GetLatestBlock,
    Relay,
    NewPeer,
    Goodbye,
    GetMempool,
    MempoolData,
    MempoolTransfer,
    GetPeers,
    PeersList,
}

impl MessageKind {
    pub const ALL: [MessageKind; 19] = [
        Self::Hello,
        Self::Ping,
        Self::Pong,
        Self::Tx,
        Self::Block,
        Self::Inv,
        Self::GetBlock,
        Self::GetBlockHeaders,
        Self::BlockHeaders,
        Self::BlockBatch,
        Self::GetLatestBlock,
        Self::Relay,
        Self::NewPeer,
        Self::Goodbye,
        Self::GetMempool,
        Self::MempoolData,
        Self::MempoolTransfer,
        Self::GetPeers,
        Self::PeersList,
    ];

    /// Wire name of the type tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Tx => "TX",
            Self::Block => "BLOCK",
            Self::Inv => "INV",
            Self::GetBlock => "GETBLOCK",
            Self::GetBlockHeaders => "GET_BLOCK_HEADERS",
            Self::BlockHeaders => "BLOCK_HEADERS",
            Self::BlockBatch => "BLOCK_BATCH",
            Self::GetLatestBlock => "GET_LATEST_BLOCK",
            Self::Relay => "RELAY",
            Self::NewPeer => "NEW_PEER",
            Self::Goodbye => "GOODBYE",
            Self::GetMempool => "GET_MEMPOOL",
            Self::MempoolData => "MEMPOOL_DATA",
            Self::MempoolTransfer => "MEMPOOL_TRANSFER",
            Self::GetPeers => "GET_PEERS",
            Self::PeersList => "PEERS_LIST",
        }
    }

    /// Outbound queue class for this type.
    pub fn priority(self) -> Priority {
        match self {
            Self::Ping
            | Self::Pong
            | Self::Block
            | Self::Inv
            | Self::GetBlock
            | Self::GetBlockHeaders
            | Self::BlockHeaders
            | Self::BlockBatch
            | Self::GetLatestBlock => Priority::High,
            Self::Relay => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Outbound priority class. Lower discriminant drains first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Heartbeat and chain-critical traffic.
    High = 0,
    /// Transactions and announcements.
    Medium = 1,
    /// Relay-forwarded traffic.
    Low = 2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    /// One class lower, saturating at [`Priority::Low`].
    pub fn demote(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Hello(_) => MessageKind::Hello,
            Self::Ping(_) => MessageKind::Ping,
            Self::Pong(_) => MessageKind::Pong,
            Self::Tx(_) => MessageKind::Tx,
            Self::Block(_) => MessageKind::Block,
            Self::Inv(_) => MessageKind::Inv,
            Self::GetBlock(_) => MessageKind::GetBlock,
            Self::GetBlockHeaders(_) => MessageKind::GetBlockHeaders,
            Self::BlockHeaders(_) => MessageKind::BlockHeaders,
            Self::BlockBatch(_) => MessageKind::BlockBatch,
            Self::GetLatestBlock(_) => MessageKind::GetLatestBlock,
            Self::Relay(_) => MessageKind::Relay,
            Self::NewPeer(_) => MessageKind::NewPeer,
            Self::Goodbye(_) => MessageKind::Goodbye,
            Self::GetMempool(_) => MessageKind::GetMempool,
            Self::MempoolData(_) => MessageKind::MempoolData,
            Self::MempoolTransfer(_) => MessageKind::MempoolTransfer,
            Self::GetPeers(_) => MessageKind::GetPeers,
            Self::PeersList(_) => MessageKind::PeersList,
        }
    }

    pub fn priority(&self) -> Priority {
        self.kind().priority()
    }

    /// The peer this message claims to come from: `peer_id` for blocks,
    /// `from` for transactions, `sender_id` otherwise.
    pub fn sender(&self) -> &PeerId {
        match self {
            Self::Hello(m) => &m.sender_id,
            Self::Ping(m) => &m.sender_id,
            Self::Pong(m) => &m.sender_id,
            Self::Tx(tx) => &tx.from,
            Self::Block(b) => &b.peer_id,
            Self::Inv(m) => &m.sender_id,
            Self::GetBlock(m) => &m.sender_id,
            Self::GetBlockHeaders(m) => &m.sender_id,
            Self::BlockHeaders(m) => &m.sender_id,
            Self::BlockBatch(m) => &m.sender_id,
            Self::GetLatestBlock(m) => &m.sender_id,
            Self::Relay(m) => &m.sender_id,
            Self::NewPeer(m) => &m.sender_id,
            Self::Goodbye(m) => &m.sender_id,
            Self::GetMempool(m) => &m.sender_id,
            Self::MempoolData(m) => &m.sender_id,
            Self::MempoolTransfer(m) => &m.sender_id,
            Self::GetPeers(m) => &m.sender_id,
            Self::PeersList(m) => &m.sender_id,
        }
    }

    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::Hello(m) => &m.message_id,
            Self::Ping(m) => &m.message_id,
            Self::Pong(m) => &m.message_id,
            Self::Tx(tx) => &tx.message_id,
            Self::Block(b) => &b.message_id,
            Self::Inv(m) => &m.message_id,
            Self::GetBlock(m) => &m.message_id,
            Self::GetBlockHeaders(m) => &m.message_id,
            Self::BlockHeaders(m) => &m.message_id,
            Self::BlockBatch(m) => &m.message_id,
            Self::GetLatestBlock(m) => &m.message_id,
            Self::Relay(m) => &m.message_id,
            Self::NewPeer(m) => &m.message_id,
            Self::Goodbye(m) => &m.message_id,
            Self::GetMempool(m) => &m.message_id,
            Self::MempoolData(m) => &m.message_id,
            Self::MempoolTransfer(m) => &m.message_id,
            Self::GetPeers(m) => &m.message_id,
            Self::PeersList(m) => &m.message_id,
        }
    }
}
