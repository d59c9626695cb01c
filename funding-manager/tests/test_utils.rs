use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, Transaction};
use secp256k1::{PublicKey, SecretKey};

use funding_manager::config::{FundingConfig, RoutingPolicy, MAX_FUNDING_AMOUNT, MIN_CHAN_FUNDING_SIZE};
use funding_manager::error::Error;
use funding_manager::manager::FundingManager;
use funding_manager::{ChannelId, OpenChannelRequest, OpenStatusUpdate};
use funding_messages::{FeatureVector, FundingMessage};
use mocks::memory_storage_provider::MemoryStorage;
use mocks::mock_acceptor::MockAcceptor;
use mocks::mock_chain::{MockChainNotifier, MockFeeEstimator};
use mocks::mock_channel_db::MockChannelDatabase;
use mocks::mock_events::MockEventNotifier;
use mocks::mock_gossip::MockGossip;
use mocks::mock_peer::MockPeerMessenger;
use mocks::mock_signer::MockSigner;
use mocks::mock_time::MockTime;
use mocks::mock_wallet::MockWallet;

pub type TestManager = FundingManager<
    Arc<MockWallet>,
    Arc<MockChainNotifier>,
    Arc<MemoryStorage>,
    Arc<MockChannelDatabase>,
    Arc<MockPeerMessenger>,
    Arc<MockGossip>,
    Arc<MockAcceptor>,
    Arc<MockSigner>,
    Arc<MockEventNotifier>,
    Arc<MockTime>,
    Arc<MockFeeEstimator>,
>;

pub struct TestNode {
    pub manager: TestManager,
    pub config: FundingConfig,
    pub seed: u8,
    pub node_id: PublicKey,
    pub wallet: Arc<MockWallet>,
    pub chain: Arc<MockChainNotifier>,
    pub store: Arc<MemoryStorage>,
    pub channel_db: Arc<MockChannelDatabase>,
    pub peers: Arc<MockPeerMessenger>,
    pub gossip: Arc<MockGossip>,
    pub acceptor: Arc<MockAcceptor>,
    pub signer: Arc<MockSigner>,
    pub events: Arc<MockEventNotifier>,
}

pub fn test_config(id_key: PublicKey) -> FundingConfig {
    FundingConfig {
        chain_hash: BlockHash::all_zeros(),
        id_key,
        min_chan_size: MIN_CHAN_FUNDING_SIZE,
        max_chan_size: MAX_FUNDING_AMOUNT,
        max_pending_channels: 1,
        reject_push: false,
        max_local_csv_delay: 10_000,
        reservation_timeout: 600,
        zombie_sweep_interval: 60,
        default_min_htlc_in: 1000,
        default_dust_limit: 573,
        default_routing_policy: RoutingPolicy {
            time_lock_delta: 40,
            min_htlc_out: 1000,
            base_fee: 1000,
            fee_rate: 1,
        },
        enable_upfront_shutdown: false,
        rebroadcast_on_start: true,
    }
}

pub fn create_node(seed: u8, chain: &Arc<MockChainNotifier>) -> TestNode {
    create_node_with(seed, chain, |_| {})
}

pub fn create_node_with<F>(seed: u8, chain: &Arc<MockChainNotifier>, tweak: F) -> TestNode
where
    F: FnOnce(&mut FundingConfig),
{
    mocks::mock_time::set_time(1_600_000_000);

    let node_secret = SecretKey::from_slice(&[seed; 32]).expect("valid secret key");
    let signer = Arc::new(MockSigner::new(node_secret));
    let node_id = signer.node_id();

    let mut config = test_config(node_id);
    tweak(&mut config);

    let channel_db = Arc::new(MockChannelDatabase::new());
    let wallet = Arc::new(MockWallet::new(chain.clone(), channel_db.clone(), seed));
    let store = Arc::new(MemoryStorage::new());
    let peers = Arc::new(MockPeerMessenger::new());
    let gossip = Arc::new(MockGossip::new());
    let acceptor = Arc::new(MockAcceptor::new());
    let events = Arc::new(MockEventNotifier::new());

    let manager = new_manager(
        &config, &wallet, chain, &store, &channel_db, &peers, &gossip, &acceptor, &signer,
        &events, seed,
    );

    TestNode {
        manager,
        config,
        seed,
        node_id,
        wallet,
        chain: chain.clone(),
        store,
        channel_db,
        peers,
        gossip,
        acceptor,
        signer,
        events,
    }
}

#[allow(clippy::too_many_arguments)]
fn new_manager(
    config: &FundingConfig,
    wallet: &Arc<MockWallet>,
    chain: &Arc<MockChainNotifier>,
    store: &Arc<MemoryStorage>,
    channel_db: &Arc<MockChannelDatabase>,
    peers: &Arc<MockPeerMessenger>,
    gossip: &Arc<MockGossip>,
    acceptor: &Arc<MockAcceptor>,
    signer: &Arc<MockSigner>,
    events: &Arc<MockEventNotifier>,
    seed: u8,
) -> TestManager {
    FundingManager::new(
        config.clone(),
        wallet.clone(),
        chain.clone(),
        store.clone(),
        channel_db.clone(),
        peers.clone(),
        gossip.clone(),
        acceptor.clone(),
        signer.clone(),
        events.clone(),
        Arc::new(MockTime {}),
        Arc::new(MockFeeEstimator { sat_per_kw: 253 }),
        [seed; 32],
    )
    .expect("Error creating funding manager")
}

/// Replaces the node's manager with a fresh instance over the same
/// collaborators and runs its startup recovery, simulating a process
/// restart.
pub fn restart_node(node: &mut TestNode) {
    node.manager = new_manager(
        &node.config,
        &node.wallet,
        &node.chain,
        &node.store,
        &node.channel_db,
        &node.peers,
        &node.gossip,
        &node.acceptor,
        &node.signer,
        &node.events,
        node.seed,
    );
    node.manager.start().expect("Error starting funding manager");
}

/// Makes both nodes see each other online, advertising the given feature
/// vector on both ends.
pub fn connect_with_features(a: &TestNode, b: &TestNode, features: FeatureVector) {
    a.peers.set_online(b.node_id, true);
    b.peers.set_online(a.node_id, true);
    a.peers.set_features(b.node_id, features, features);
    b.peers.set_features(a.node_id, features, features);
}

pub fn connect(a: &TestNode, b: &TestNode) {
    connect_with_features(a, b, FeatureVector::empty());
}

pub fn open_channel_request(
    peer_id: PublicKey,
    local_amount: u64,
) -> (
    OpenChannelRequest,
    Receiver<OpenStatusUpdate>,
    Receiver<Error>,
) {
    let (updates, updates_rx) = channel();
    let (errors, errors_rx) = channel();
    let request = OpenChannelRequest {
        peer_id,
        local_amount,
        push_msat: 0,
        min_htlc_in: 0,
        remote_csv_delay: 0,
        max_value_in_flight: 0,
        max_htlcs: 0,
        max_local_csv: 0,
        min_confs: 1,
        private: false,
        subtract_fees: false,
        funding_fee_per_kw: 0,
        shutdown_script: None,
        pending_channel_id: None,
        updates,
        errors,
    };
    (request, updates_rx, errors_rx)
}

/// Routes every outstanding message between the two nodes until both
/// outboxes are empty.
pub fn run_message_exchange(a: &mut TestNode, b: &mut TestNode) {
    loop {
        let from_a = a.peers.take_messages();
        let from_b = b.peers.take_messages();
        if from_a.is_empty() && from_b.is_empty() {
            break;
        }
        for (target, msg) in from_a {
            assert_eq!(target, b.node_id);
            b.manager
                .on_funding_message(&a.node_id, &msg)
                .expect("Error processing message");
        }
        for (target, msg) in from_b {
            assert_eq!(target, a.node_id);
            a.manager
                .on_funding_message(&b.node_id, &msg)
                .expect("Error processing message");
        }
    }
}

/// Runs the full four message handshake for a channel funded by `a`,
/// returning the temporary channel id, the caller sinks and the broadcast
/// funding transaction.
pub fn complete_handshake(
    a: &mut TestNode,
    b: &mut TestNode,
    local_amount: u64,
) -> (
    ChannelId,
    Receiver<OpenStatusUpdate>,
    Receiver<Error>,
    Transaction,
) {
    let (request, updates_rx, errors_rx) = open_channel_request(b.node_id, local_amount);
    let temp_chan_id = a
        .manager
        .open_channel(request)
        .expect("Error opening channel");
    run_message_exchange(a, b);

    let published = a.wallet.published_transactions();
    assert_eq!(published.len(), 1, "expected the funding tx to be broadcast");

    (temp_chan_id, updates_rx, errors_rx, published[0].0.clone())
}

/// Drains the node's outbox and returns the error frames it sent.
pub fn sent_error_messages(node: &TestNode) -> Vec<(PublicKey, ChannelId, String)> {
    node.peers
        .take_messages()
        .into_iter()
        .filter_map(|(target, msg)| match msg {
            FundingMessage::Error(e) => Some((target, e.channel_id, e.data)),
            _ => None,
        })
        .collect()
}
