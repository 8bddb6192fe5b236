//! Integration tests exercising whole nodes: inbound gates, handlers, the
//! outbound pipeline and sync, wired together the way `BraidNode` wires
//! them, with a controllable clock and a recording transport.

use braid_messages::{
    Block, BlockHeadersMsg, GetBlockHeadersMsg, GetBlockMsg, GetLatestBlockMsg, GoodbyeMsg,
    HelloFlags, HelloMsg, Message, MessageKind, PeerListing, PeersListMsg, PingMsg, RelayMsg,
    Transaction,
};
use braid_network::DropReason;
use braid_node::config::LinkConfig;
use braid_node::{
    BraidNode, DeliveryOutcome, Disposition, NodeConfig, NodeContext, NodeIdentity, NodePorts,
    NoopPeerTable, PeerConfig,
};
use braid_nullables::{NullClock, NullTransport};
use braid_types::{BlockHash, MessageId, PeerAddress, PeerFlags, PeerId, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct TestNode {
    ctx: Arc<NodeContext>,
    clock: Arc<NullClock>,
    transport: Arc<NullTransport>,
}

impl TestNode {
    fn address(&self) -> PeerAddress {
        self.ctx.identity.address.clone()
    }

    /// Deliver everything queued and return what hit the wire.
    async fn flush(&self) -> Vec<(PeerAddress, Message)> {
        self.ctx.drain_outbox().await;
        self.transport.take()
    }
}

fn peer_entry(port: u16) -> PeerConfig {
    PeerConfig {
        ip: "127.0.0.1".into(),
        port,
        fanout: 3,
        nat: false,
        light: false,
        malicious: false,
    }
}

fn addr(port: u16) -> PeerAddress {
    PeerAddress::new("127.0.0.1", port)
}

fn pid(port: u16) -> PeerId {
    PeerId::from(port.to_string())
}

/// A peer table holding `ports`; each entry can be adjusted.
fn network(ports: &[u16]) -> BTreeMap<PeerId, PeerConfig> {
    ports.iter().map(|p| (pid(*p), peer_entry(*p))).collect()
}

fn deterministic_config(peers: BTreeMap<PeerId, PeerConfig>) -> NodeConfig {
    NodeConfig {
        peers,
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
    }
}

fn node_with(id: u16, config: NodeConfig) -> TestNode {
    let identity = NodeIdentity::from_config(&config, &pid(id)).unwrap();
    let clock = Arc::new(NullClock::from_secs(10_000));
    let transport = Arc::new(NullTransport::new());
    let ports = NodePorts {
        clock: clock.clone(),
        transport: transport.clone(),
        peer_table: Arc::new(NoopPeerTable),
    };
    let ctx = Arc::new(NodeContext::new(identity, config, ports).unwrap());
    TestNode {
        ctx,
        clock,
        transport,
    }
}

fn node(id: u16, ports: &[u16]) -> TestNode {
    node_with(id, deterministic_config(network(ports)))
}

fn ts(secs: u64) -> Timestamp {
    Timestamp::from_secs(secs)
}

fn genesis(creator: u16) -> Block {
    Block::new(pid(creator), ts(1), None, 0, vec![])
}

fn child(parent: &Block, creator: u16) -> Block {
    Block::new(
        pid(creator),
        ts(parent.height + 2),
        Some(parent.block_id),
        parent.height + 1,
        vec![],
    )
}

/// A genesis followed by `len - 1` descendants.
fn chain(len: usize, creator: u16) -> Vec<Block> {
    let mut blocks = vec![genesis(creator)];
    while blocks.len() < len {
        let next = child(blocks.last().unwrap(), creator);
        blocks.push(next);
    }
    blocks
}

fn forged(mut block: Block) -> Block {
    block.block_id = BlockHash::new([0xAB; 32]);
    block
}

fn ping_from(sender: u16) -> Message {
    Message::Ping(PingMsg {
        sender_id: pid(sender),
        timestamp: ts(5),
        message_id: MessageId::random(),
    })
}

fn load_chain(node: &TestNode, blocks: &[Block]) {
    let mut store = node.ctx.store.lock();
    for block in blocks {
        store.insert(block.clone(), ts(1)).unwrap();
    }
}

fn of_kind(sent: &[(PeerAddress, Message)], kind: MessageKind) -> Vec<(PeerAddress, Message)> {
    sent.iter().filter(|(_, m)| m.kind() == kind).cloned().collect()
}

// ---------------------------------------------------------------------------
// Content integrity and offenses
// ---------------------------------------------------------------------------

#[test]
fn valid_block_is_accepted_with_matching_id() {
    let n = node(5000, &[5000, 5001]);
    let block = genesis(5001);
    assert_eq!(n.ctx.receive(Message::Block(block.clone())), Disposition::Processed);

    let store = n.ctx.store.lock();
    let stored = store.get_block(&block.block_id).unwrap();
    assert_eq!(stored.compute_id(), stored.block_id);
}

#[test]
fn forged_block_is_rejected_with_one_offense() {
    let n = node(5000, &[5000, 5001]);
    let block = forged(genesis(5001));
    n.ctx.receive(Message::Block(block.clone()));

    assert!(!n.ctx.store.lock().knows(&block.block_id));
    assert_eq!(n.ctx.reputation.lock().offense_count(&pid(5001)), 1);
    assert_eq!(n.ctx.drops.count(DropReason::Invalid), 1);
}

#[test]
fn forged_transaction_is_an_offense_against_its_sender() {
    let n = node(5000, &[5000, 5001, 5002]);
    let mut tx = Transaction::new(pid(5001), pid(5002), 10, ts(3));
    tx.amount = 99;
    n.ctx.receive(Message::Tx(tx));

    assert!(n.ctx.mempool.lock().is_empty());
    assert_eq!(n.ctx.reputation.lock().offense_count(&pid(5001)), 1);
}

#[tokio::test]
async fn fourth_offense_blacklists_both_directions() {
    let n = node(5000, &[5000, 5001]);
    for i in 0..4u64 {
        let mut block = Block::new(pid(5001), ts(i), None, 0, vec![]);
        block.block_id = BlockHash::new([i as u8 + 1; 32]);
        n.ctx.receive(Message::Block(block));
    }
    assert!(n.ctx.reputation.lock().is_blacklisted(&pid(5001)));
    assert_eq!(n.ctx.metrics.bans.get(), 1);

    assert_eq!(
        n.ctx.receive(ping_from(5001)),
        Disposition::Dropped(DropReason::Blacklisted)
    );
    assert_eq!(
        n.ctx.enqueue(&pid(5001), ping_from(5000)),
        Err(DropReason::Blacklisted)
    );
    assert!(n.flush().await.is_empty());
}

#[test]
fn three_offenses_do_not_ban() {
    let n = node(5000, &[5000, 5001]);
    for i in 0..3u8 {
        let mut block = Block::new(pid(5001), ts(i as u64), None, 0, vec![]);
        block.block_id = BlockHash::new([i + 1; 32]);
        n.ctx.receive(Message::Block(block));
    }
    assert!(!n.ctx.reputation.lock().is_blacklisted(&pid(5001)));
    assert_eq!(n.ctx.receive(ping_from(5001)), Disposition::Processed);
}

// ---------------------------------------------------------------------------
// Inbound gates
// ---------------------------------------------------------------------------

#[test]
fn redelivered_message_is_processed_once() {
    let n = node(5000, &[5000, 5001, 5002]);
    let tx = Transaction::new(pid(5001), pid(5002), 10, ts(3));
    let id = tx.message_id.clone();

    assert_eq!(n.ctx.receive(Message::Tx(tx.clone())), Disposition::Processed);
    assert_eq!(
        n.ctx.receive(Message::Tx(tx.clone())),
        Disposition::Dropped(DropReason::Duplicate)
    );
    assert_eq!(
        n.ctx.receive(Message::Tx(tx)),
        Disposition::Dropped(DropReason::Duplicate)
    );

    assert_eq!(n.ctx.mempool.lock().len(), 1);
    assert_eq!(n.ctx.seen.lock().redundancy_of(&id), 2);
}

#[test]
fn undecodable_line_is_counted_invalid() {
    let n = node(5000, &[5000, 5001]);
    assert_eq!(
        n.ctx.handle_line(br#"{"type":"NOT_A_TYPE"}"#),
        Disposition::Dropped(DropReason::Invalid)
    );
    assert_eq!(
        n.ctx.handle_line(b"not json"),
        Disposition::Dropped(DropReason::Invalid)
    );
    assert_eq!(n.ctx.drops.count(DropReason::Invalid), 2);
    assert_eq!(n.ctx.directory.lock().len(), 1);
}

#[test]
fn inbound_rate_limit_is_not_an_offense() {
    let n = node(5000, &[5000, 5001]);
    for _ in 0..10 {
        assert_eq!(n.ctx.receive(ping_from(5001)), Disposition::Processed);
    }
    assert_eq!(
        n.ctx.receive(ping_from(5001)),
        Disposition::Dropped(DropReason::RateLimited)
    );
    assert_eq!(n.ctx.reputation.lock().offense_count(&pid(5001)), 0);

    n.clock.advance(Duration::from_secs(11));
    assert_eq!(n.ctx.receive(ping_from(5001)), Disposition::Processed);
}

// ---------------------------------------------------------------------------
// Block store through the dispatcher
// ---------------------------------------------------------------------------

#[test]
fn only_one_genesis_is_ever_accepted() {
    let n = node(5000, &[5000, 5001, 5002]);
    let first = genesis(5001);
    let second = Block::new(pid(5002), ts(7), None, 0, vec![]);

    n.ctx.receive(Message::Block(first.clone()));
    n.ctx.receive(Message::Block(second.clone()));

    let store = n.ctx.store.lock();
    assert_eq!(store.len(), 1);
    assert!(store.contains(&first.block_id));
    assert!(!store.knows(&second.block_id));
}

#[test]
fn orphan_is_promoted_when_its_parent_arrives() {
    let n = node(5000, &[5000, 5001]);
    let blocks = chain(3, 5001);
    load_chain(&n, &blocks[..1]);

    // X arrives before its parent P.
    let parent = &blocks[1];
    let orphan = &blocks[2];
    n.ctx.receive(Message::Block(orphan.clone()));
    assert!(n.ctx.store.lock().is_orphan(&orphan.block_id));
    let before = n.ctx.store.lock().len();

    n.clock.advance(Duration::from_secs(5));
    n.ctx.receive(Message::Block(parent.clone()));

    let store = n.ctx.store.lock();
    assert_eq!(store.len(), before + 2);
    let parent_height = store.get_header(&parent.block_id).unwrap().height;
    assert_eq!(parent_height, 1);
    assert_eq!(
        store.get_header(&orphan.block_id).unwrap().height,
        parent_height + 1
    );
    assert_eq!(store.orphan_count(), 0);
}

#[test]
fn promotion_cascades_through_an_orphan_chain() {
    let n = node(5000, &[5000, 5001, 5002, 5003]);
    let blocks = chain(5, 5001);
    load_chain(&n, &blocks[..1]);
    // Heights 4, 3 and 2 wait on height 1, which arrives last.
    {
        let mut store = n.ctx.store.lock();
        for block in blocks[2..].iter().rev() {
            store.insert(block.clone(), ts(2)).unwrap();
        }
        assert_eq!(store.orphan_count(), 3);
    }
    n.ctx.receive(Message::Block(blocks[1].clone()));

    let store = n.ctx.store.lock();
    assert_eq!(store.len(), 5);
    assert_eq!(store.tip_height(), Some(4));
    assert!(n.ctx.chain_started());
}

#[tokio::test]
async fn accepted_block_is_announced_by_inventory() {
    let n = node(5000, &[5000, 5001, 5002]);
    let block = genesis(5001);
    n.ctx.receive(Message::Block(block.clone()));

    let sent = n.flush().await;
    let invs = of_kind(&sent, MessageKind::Inv);
    assert_eq!(invs.len(), 1, "only 5002 is neither self nor the creator");
    assert_eq!(invs[0].0, addr(5002));
    match &invs[0].1 {
        Message::Inv(inv) => assert_eq!(inv.block_ids, vec![block.block_id]),
        other => panic!("expected INV, got {other:?}"),
    }
}

#[tokio::test]
async fn inventory_requests_only_unknown_blocks() {
    let n = node(5000, &[5000, 5001]);
    let blocks = chain(2, 5001);
    load_chain(&n, &blocks[..1]);

    n.ctx.receive(Message::Inv(braid_messages::InvMsg {
        sender_id: pid(5001),
        block_ids: vec![blocks[0].block_id, blocks[1].block_id],
        message_id: MessageId::random(),
    }));

    let sent = n.flush().await;
    let requests = of_kind(&sent, MessageKind::GetBlock);
    assert_eq!(requests.len(), 1);
    match &requests[0].1 {
        Message::GetBlock(m) => assert_eq!(m.requested_ids, vec![blocks[1].block_id]),
        other => panic!("expected GETBLOCK, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_block_request_is_parked_and_served_later() {
    let n = node(5000, &[5000, 5001, 5002]);
    let block = genesis(5002);

    n.ctx.receive(Message::GetBlock(GetBlockMsg {
        sender_id: pid(5001),
        requested_ids: vec![block.block_id],
        message_id: MessageId::random(),
    }));
    let sent = n.flush().await;
    let fetches = of_kind(&sent, MessageKind::GetBlock);
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].0, addr(5002), "fetched from someone other than the requester");

    n.ctx.receive(Message::Block(block.clone()));
    let sent = n.flush().await;
    let served: Vec<_> = of_kind(&sent, MessageKind::Block)
        .into_iter()
        .filter(|(a, _)| *a == addr(5001))
        .collect();
    assert_eq!(served.len(), 1);
    assert!(!n.ctx.pending.lock().contains(&block.block_id));
}

// ---------------------------------------------------------------------------
// Outbound pipeline
// ---------------------------------------------------------------------------

#[test]
fn queue_capacity_fails_fast() {
    let mut config = deterministic_config(network(&[5000, 5001]));
    config.limits.send_rate_limit = 1_000;
    let n = node_with(5000, config);

    for _ in 0..50 {
        assert!(n.ctx.enqueue(&pid(5001), ping_from(5000)).is_ok());
    }
    assert_eq!(
        n.ctx.enqueue(&pid(5001), ping_from(5000)),
        Err(DropReason::QueueFull)
    );
    assert_eq!(n.ctx.outbox.lock().depth(&pid(5001)), 50);
    assert_eq!(n.ctx.drops.count(DropReason::QueueFull), 1);
}

#[tokio::test]
async fn send_rate_window_admits_ten_of_fifteen() {
    let n = node(5000, &[5000, 5001]);
    let results: Vec<_> = (0..15)
        .map(|_| n.ctx.enqueue(&pid(5001), ping_from(5000)))
        .collect();

    assert!(results[..10].iter().all(|r| r.is_ok()));
    assert!(results[10..]
        .iter()
        .all(|r| *r == Err(DropReason::RateLimited)));
    assert_eq!(n.ctx.drops.count(DropReason::RateLimited), 5);

    let sent = n.flush().await;
    assert_eq!(sent.len(), 10);
    assert!(sent.iter().all(|(a, _)| *a == addr(5001)));
}

#[tokio::test]
async fn transaction_gossip_never_targets_light_peers() {
    let mut peers = network(&[5000, 5001, 5002, 5003, 5004]);
    for light in [5001, 5003] {
        peers.get_mut(&pid(light)).unwrap().light = true;
    }
    let n = node_with(5000, deterministic_config(peers));

    for amount in 1..=5 {
        n.ctx
            .submit_transaction(Transaction::new(pid(5000), pid(5002), amount, ts(amount)));
    }
    let sent = n.flush().await;
    let txs = of_kind(&sent, MessageKind::Tx);
    assert_eq!(txs.len(), 10, "two full peers, five transactions");
    assert!(txs
        .iter()
        .all(|(a, _)| *a != addr(5001) && *a != addr(5003)));
}

#[tokio::test]
async fn failed_sends_are_retried_then_dropped() {
    let n = node(5000, &[5000, 5001]);
    n.transport.fail_for(addr(5001));
    n.ctx.enqueue(&pid(5001), ping_from(5000)).unwrap();

    for attempt in 1..=3 {
        assert_eq!(n.ctx.deliver_next().await, DeliveryOutcome::Retrying);
        assert_eq!(n.ctx.outbox.lock().retry_state(&pid(5001)).attempts, attempt);
        // Parked until the retry interval passes.
        assert_eq!(n.ctx.deliver_next().await, DeliveryOutcome::Idle);
        n.clock.advance(Duration::from_secs(5));
    }
    assert_eq!(
        n.ctx.deliver_next().await,
        DeliveryOutcome::Dropped(DropReason::RetryExhausted)
    );
    assert_eq!(n.ctx.outbox.lock().retry_state(&pid(5001)).attempts, 0);
    assert_eq!(n.ctx.drops.count(DropReason::RetryExhausted), 1);
}

#[tokio::test]
async fn stale_queue_entries_expire() {
    let n = node(5000, &[5000, 5001]);
    n.ctx.enqueue(&pid(5001), ping_from(5000)).unwrap();
    n.clock.advance(Duration::from_secs(31));
    assert_eq!(n.ctx.deliver_next().await, DeliveryOutcome::Expired);
    assert!(n.transport.sent().is_empty());
}

// ---------------------------------------------------------------------------
// NAT relay
// ---------------------------------------------------------------------------

fn nat_listing(port: u16) -> PeerListing {
    PeerListing {
        ip: "127.0.0.1".into(),
        port,
        flags: PeerFlags {
            nat: true,
            light: false,
        },
    }
}

#[tokio::test]
async fn nat_destination_is_reached_through_a_relay() {
    let n = node(5000, &[5000, 5001]);
    n.ctx.receive(Message::PeersList(PeersListMsg {
        sender_id: pid(5001),
        peers: BTreeMap::from([(pid(5009), nat_listing(5009))]),
        message_id: MessageId::random(),
    }));
    n.transport.take();

    n.ctx.enqueue(&pid(5009), ping_from(5000)).unwrap();
    let sent = n.flush().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, addr(5001));
    match &sent[0].1 {
        Message::Relay(relay) => {
            assert_eq!(relay.target_id, pid(5009));
            assert_eq!(relay.payload.kind(), MessageKind::Ping);
        }
        other => panic!("expected RELAY, got {other:?}"),
    }
}

#[tokio::test]
async fn nat_destination_without_relay_has_no_route() {
    let mut peers = network(&[5000, 5009]);
    peers.get_mut(&pid(5009)).unwrap().nat = true;
    let n = node_with(5000, deterministic_config(peers));

    n.ctx.enqueue(&pid(5009), ping_from(5000)).unwrap();
    assert_eq!(
        n.ctx.deliver_next().await,
        DeliveryOutcome::Dropped(DropReason::NoRoute)
    );
}

#[tokio::test]
async fn relay_forwards_envelope_to_its_target() {
    let mut peers = network(&[5001, 5000, 5009]);
    peers.get_mut(&pid(5009)).unwrap().nat = true;
    let relay_node = node_with(5001, deterministic_config(peers));

    let envelope = RelayMsg {
        sender_id: pid(5000),
        target_id: pid(5009),
        payload: Box::new(ping_from(5000)),
        message_id: MessageId::random(),
    };
    relay_node.ctx.receive(Message::Relay(envelope.clone()));

    let sent = relay_node.flush().await;
    assert_eq!(sent, vec![(addr(5009), Message::Relay(envelope))]);
}

#[test]
fn relay_addressed_to_self_is_unwrapped() {
    let n = node(5009, &[5009, 5001, 5002]);
    let tx = Transaction::new(pid(5002), pid(5009), 4, ts(2));
    n.ctx.receive(Message::Relay(RelayMsg {
        sender_id: pid(5001),
        target_id: pid(5009),
        payload: Box::new(Message::Tx(tx.clone())),
        message_id: MessageId::random(),
    }));
    assert!(n.ctx.mempool.lock().contains(&tx.id));
}

// ---------------------------------------------------------------------------
// End-to-end propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transaction_propagates_once_per_node() {
    let ports = [5000, 5001, 5002];
    let a = node(5000, &ports);
    let b = node(5001, &ports);

    let tx = Transaction::new(pid(5000), pid(5001), 10, ts(50));
    assert_eq!(a.ctx.submit_transaction(tx.clone()), 2);
    assert_eq!(a.ctx.submit_transaction(tx.clone()), 0);
    assert_eq!(a.ctx.mempool.lock().len(), 1);

    let to_b: Vec<Message> = a
        .flush()
        .await
        .into_iter()
        .filter(|(address, _)| *address == b.address())
        .map(|(_, m)| m)
        .collect();
    assert_eq!(to_b.len(), 1);

    // B pools it once and re-gossips to everyone except the originator.
    b.ctx.receive(to_b[0].clone());
    assert_eq!(b.ctx.mempool.lock().len(), 1);
    let regossip = of_kind(&b.flush().await, MessageKind::Tx);
    assert_eq!(regossip.len(), 1);
    assert_eq!(regossip[0].0, addr(5002));

    // A second copy is only counted.
    assert_eq!(
        b.ctx.receive(to_b[0].clone()),
        Disposition::Dropped(DropReason::Duplicate)
    );
    assert_eq!(b.ctx.mempool.lock().len(), 1);
    assert_eq!(b.ctx.seen.lock().redundancy_of(&tx.message_id), 1);
}

// ---------------------------------------------------------------------------
// Peer discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hello_from_new_node_is_announced_to_the_rest() {
    let n = node(5000, &[5000, 5001, 5002]);
    n.ctx.receive(Message::Hello(HelloMsg {
        sender_id: pid(5007),
        ip: "127.0.0.1".into(),
        port: 5007,
        flags: HelloFlags {
            nat: false,
            light: true,
            new_node: true,
        },
        message_id: MessageId::random(),
    }));

    {
        let directory = n.ctx.directory.lock();
        let entry = directory.get(&pid(5007)).unwrap();
        assert!(entry.flags.light);
        assert!(entry.reachable_by.contains(&pid(5000)));
    }
    let sent = n.flush().await;
    let announcements = of_kind(&sent, MessageKind::NewPeer);
    let mut recipients: Vec<_> = announcements.iter().map(|(a, _)| a.port).collect();
    recipients.sort();
    assert_eq!(recipients, vec![5001, 5002]);
}

#[tokio::test]
async fn peer_list_excludes_the_requester() {
    let n = node(5000, &[5000, 5001, 5002]);
    n.ctx.receive(Message::GetPeers(braid_messages::GetPeersMsg {
        sender_id: pid(5001),
        message_id: MessageId::random(),
    }));
    let sent = n.flush().await;
    match &sent[..] {
        [(to, Message::PeersList(list))] => {
            assert_eq!(*to, addr(5001));
            assert_eq!(list.peers.keys().cloned().collect::<Vec<_>>(), vec![pid(5002)]);
        }
        other => panic!("expected one PEERS_LIST, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_list_request_from_stranger_is_ignored() {
    let n = node(5000, &[5000, 5001]);
    n.ctx.receive(Message::GetPeers(braid_messages::GetPeersMsg {
        sender_id: pid(6000),
        message_id: MessageId::random(),
    }));
    assert!(n.flush().await.is_empty());
}

#[test]
fn goodbye_removes_peer_and_absorbs_transactions() {
    let n = node(5000, &[5000, 5001, 5002]);
    let handed = vec![
        Transaction::new(pid(5001), pid(5002), 1, ts(1)),
        Transaction::new(pid(5001), pid(5000), 2, ts(2)),
    ];
    n.ctx.enqueue(&pid(5001), ping_from(5000)).unwrap();
    n.ctx.receive(Message::Goodbye(GoodbyeMsg {
        sender_id: pid(5001),
        reason: "shutdown".into(),
        pending_transactions: handed,
        has_more_transactions: false,
        message_id: MessageId::random(),
    }));

    assert!(!n.ctx.directory.lock().contains(&pid(5001)));
    assert_eq!(n.ctx.outbox.lock().depth(&pid(5001)), 0);
    assert_eq!(n.ctx.mempool.lock().len(), 2);
}

#[tokio::test]
async fn departure_hands_off_the_pool() {
    let n = node(5000, &[5000, 5001, 5002]);
    {
        let mut pool = n.ctx.mempool.lock();
        for amount in 0..150 {
            pool.add(Transaction::new(pid(5000), pid(5001), amount, ts(amount)));
        }
    }
    n.ctx.announce_departure("test");
    let sent = n.flush().await;

    let goodbyes = of_kind(&sent, MessageKind::Goodbye);
    assert_eq!(goodbyes.len(), 2);
    match &goodbyes[0].1 {
        Message::Goodbye(m) => {
            assert_eq!(m.pending_transactions.len(), 100);
            assert!(m.has_more_transactions);
        }
        other => panic!("expected GOODBYE, got {other:?}"),
    }
    let transfers = of_kind(&sent, MessageKind::MempoolTransfer);
    assert_eq!(transfers.len(), 2);
    match &transfers[0].1 {
        Message::MempoolTransfer(m) => {
            assert_eq!(m.transactions.len(), 50);
            assert_eq!((m.batch, m.total_batches), (1, 1));
        }
        other => panic!("expected MEMPOOL_TRANSFER, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_node_header_request_gets_headers_and_recent_blocks() {
    let n = node(5000, &[5000, 5001]);
    load_chain(&n, &chain(16, 5000));

    n.ctx.receive(Message::GetBlockHeaders(GetBlockHeadersMsg {
        sender_id: pid(5001),
        start_height: 0,
        end_height: 99,
        is_new_node: true,
        message_id: MessageId::random(),
    }));
    let sent = n.flush().await;

    match &of_kind(&sent, MessageKind::BlockHeaders)[0].1 {
        Message::BlockHeaders(m) => {
            assert_eq!(m.headers.len(), 16);
            assert!(m.is_full_chain);
            assert_eq!(m.end_height, 15);
        }
        other => panic!("expected BLOCK_HEADERS, got {other:?}"),
    }
    match &of_kind(&sent, MessageKind::BlockBatch)[0].1 {
        Message::BlockBatch(m) => {
            let heights: Vec<u64> = m.blocks.iter().map(|b| b.height).collect();
            assert_eq!(heights, (6..=15).collect::<Vec<_>>());
            assert!(!m.has_more);
        }
        other => panic!("expected BLOCK_BATCH, got {other:?}"),
    }
}

#[tokio::test]
async fn full_node_pulls_blocks_for_unknown_headers() {
    let n = node(5000, &[5000, 5001]);
    let blocks = chain(25, 5001);
    let headers = blocks.iter().map(Block::header).collect();

    n.ctx.receive(Message::BlockHeaders(BlockHeadersMsg {
        sender_id: pid(5001),
        headers,
        is_full_chain: true,
        start_height: 0,
        end_height: 24,
        message_id: MessageId::random(),
    }));
    let sent = n.flush().await;

    let requests = of_kind(&sent, MessageKind::GetBlock);
    let sizes: Vec<usize> = requests
        .iter()
        .map(|(_, m)| match m {
            Message::GetBlock(g) => g.requested_ids.len(),
            _ => 0,
        })
        .collect();
    assert_eq!(sizes, vec![20, 5]);
    match &of_kind(&sent, MessageKind::GetBlockHeaders)[0].1 {
        Message::GetBlockHeaders(m) => assert_eq!((m.start_height, m.end_height), (25, 124)),
        other => panic!("expected GET_BLOCK_HEADERS, got {other:?}"),
    }
}

#[test]
fn light_node_stores_headers_only() {
    let mut peers = network(&[5000, 5001]);
    peers.get_mut(&pid(5000)).unwrap().light = true;
    let n = node_with(5000, deterministic_config(peers));
    let blocks = chain(4, 5001);
    let mut headers: Vec<_> = blocks.iter().map(Block::header).collect();
    headers.reverse();

    n.ctx.receive(Message::BlockHeaders(BlockHeadersMsg {
        sender_id: pid(5001),
        headers,
        is_full_chain: true,
        start_height: 0,
        end_height: 3,
        message_id: MessageId::random(),
    }));

    let store = n.ctx.store.lock();
    assert_eq!(store.headers().len(), 4);
    assert!(store.chain().is_empty());
}

#[tokio::test]
async fn lagging_peer_is_served_a_batch() {
    let n = node(5000, &[5000, 5001]);
    load_chain(&n, &chain(120, 5000));

    n.ctx.receive(Message::GetLatestBlock(GetLatestBlockMsg {
        sender_id: pid(5001),
        current_height: Some(10),
        is_new_node: false,
        message_id: MessageId::random(),
    }));
    let sent = n.flush().await;
    match &sent[..] {
        [(_, Message::BlockBatch(m))] => {
            assert_eq!(m.blocks.len(), 50);
            assert_eq!(m.blocks[0].height, 11);
            assert!(m.has_more);
            assert_eq!(m.next_height, 60);
        }
        other => panic!("expected one BLOCK_BATCH, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_peer_batch_starts_at_genesis() {
    let n = node(5000, &[5000, 5001]);
    let blocks = chain(60, 5000);
    load_chain(&n, &blocks);

    n.ctx.receive(Message::GetLatestBlock(GetLatestBlockMsg {
        sender_id: pid(5001),
        current_height: None,
        is_new_node: true,
        message_id: MessageId::random(),
    }));
    let sent = n.flush().await;
    match &sent[..] {
        [(_, Message::BlockBatch(m))] => {
            assert_eq!(m.blocks[0].block_id, blocks[0].block_id);
            assert_eq!(m.blocks.len(), 50);
            assert!(m.has_more);
            assert_eq!(m.next_height, 49);
        }
        other => panic!("expected one BLOCK_BATCH, got {other:?}"),
    }
}

#[tokio::test]
async fn close_peer_is_served_the_tip() {
    let n = node(5000, &[5000, 5001]);
    let blocks = chain(20, 5000);
    load_chain(&n, &blocks);

    n.ctx.receive(Message::GetLatestBlock(GetLatestBlockMsg {
        sender_id: pid(5001),
        current_height: Some(15),
        is_new_node: false,
        message_id: MessageId::random(),
    }));
    let sent = n.flush().await;
    assert_eq!(sent, vec![(addr(5001), Message::Block(blocks[19].clone()))]);
}

#[tokio::test]
async fn batch_with_more_triggers_follow_up() {
    let n = node(5000, &[5000, 5001]);
    let blocks = chain(3, 5001);

    n.ctx.receive(Message::BlockBatch(braid_messages::BlockBatchMsg {
        sender_id: pid(5001),
        blocks: blocks.clone(),
        has_more: true,
        next_height: 2,
        message_id: MessageId::random(),
    }));
    assert_eq!(n.ctx.store.lock().len(), 3);

    let sent = n.flush().await;
    match &sent[..] {
        [(_, Message::GetLatestBlock(m))] => {
            assert_eq!(m.current_height, Some(2));
            assert!(m.is_new_node);
        }
        other => panic!("expected one GET_LATEST_BLOCK, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Generation, cleanup and snapshots
// ---------------------------------------------------------------------------

#[tokio::test]
async fn generated_block_seals_the_pool() {
    let n = node(5000, &[5000, 5001]);
    n.ctx
        .submit_transaction(Transaction::new(pid(5000), pid(5001), 7, ts(1)));
    let block = n.ctx.generate_block().unwrap().unwrap();

    assert!(block.is_genesis());
    assert_eq!(block.transactions.len(), 1);
    assert!(block.has_valid_id());
    assert!(n.ctx.mempool.lock().is_empty());

    let next = n.ctx.generate_block().unwrap().unwrap();
    assert_eq!(next.previous_block_id, Some(block.block_id));
    assert_eq!(next.height, 1);
}

#[test]
fn malicious_node_forges_block_ids() {
    let mut peers = network(&[5000, 5001]);
    peers.get_mut(&pid(5000)).unwrap().malicious = true;
    let n = node_with(5000, deterministic_config(peers));
    let block = n.ctx.generate_block().unwrap().unwrap();
    assert!(!block.has_valid_id());

    let victim = node(5001, &[5000, 5001]);
    victim.ctx.receive(Message::Block(block));
    assert_eq!(victim.ctx.reputation.lock().offense_count(&pid(5000)), 1);
}

#[test]
fn silent_discovered_peer_is_pruned_but_bootstrap_is_kept() {
    let n = node(5000, &[5000, 5001]);
    n.ctx.receive(Message::NewPeer(braid_messages::NewPeerMsg {
        sender_id: pid(5001),
        new_peer_id: pid(5005),
        new_peer_ip: "127.0.0.1".into(),
        new_peer_port: 5005,
        new_peer_flags: PeerFlags::default(),
        message_id: MessageId::random(),
    }));
    assert!(n.ctx.directory.lock().contains(&pid(5005)));

    n.clock.advance(Duration::from_secs(200));
    n.ctx.liveness_round();
    let report = n.ctx.cleanup_round();

    assert_eq!(report.peers_removed, 1);
    let directory = n.ctx.directory.lock();
    assert!(!directory.contains(&pid(5005)));
    assert!(directory.contains(&pid(5001)));
}

#[test]
fn snapshot_serializes_to_json() {
    let n = node(5000, &[5000, 5001]);
    load_chain(&n, &chain(2, 5000));
    n.ctx.receive(ping_from(5001));

    let snapshot = n.ctx.snapshot();
    assert_eq!(snapshot.chain.len(), 2);
    assert_eq!(snapshot.peers.len(), 1);
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["id"], "5000");
    assert_eq!(json["queue_depths"]["5001"], 1);
}

// ---------------------------------------------------------------------------
// Real sockets
// ---------------------------------------------------------------------------

#[tokio::test]
async fn node_accepts_records_over_tcp() {
    let mut config = deterministic_config(BTreeMap::new());
    config.peers.insert(pid(0), peer_entry(0));
    let identity = NodeIdentity::from_config(&config, &pid(0)).unwrap();
    let mut braid = BraidNode::new(config, identity).unwrap();
    let local = braid.start().await.unwrap();

    let transport = braid_network::TcpTransport::default();
    let hello = Message::Hello(HelloMsg {
        sender_id: pid(6001),
        ip: "127.0.0.1".into(),
        port: 6001,
        flags: HelloFlags::default(),
        message_id: MessageId::random(),
    });
    braid_network::Transport::send(&transport, &addr(local.port()), &hello)
        .await
        .unwrap();

    let mut joined = false;
    for _ in 0..100 {
        if braid.context().directory.lock().contains(&pid(6001)) {
            joined = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    braid.stop(Duration::from_millis(100)).await;
    assert!(joined);
}
