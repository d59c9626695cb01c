//! #FundingManager, orchestrator between the wallet's channel reservation
//! workflow and the wire protocol's funding messages.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::mpsc::Sender;

use bitcoin::OutPoint;
use lightning::chain::chaininterface::{ConfirmationTarget, FeeEstimator};
use log::{debug, error, info, warn};
use secp256k1::{All, PublicKey, Secp256k1};

use funding_messages::{
    channel_id_from_outpoint, AcceptChannel, ErrorMessage, FundingCreated, FundingLocked,
    FundingMessage, FundingSigned, OpenChannel, ShortChannelId, FF_ANNOUNCE_CHANNEL,
};

use crate::announcement;
use crate::config::{FundingConfig, ANNOUNCEMENT_MIN_CONFS, MAX_WAIT_NUM_BLOCKS_FUNDING_CONF};
use crate::error::Error;
use crate::handshake;
use crate::opening::ChannelOpeningState;
use crate::reservation::{ReservationContext, ReservationRegistry, TempChanIdSource};
use crate::{
    ChainNotifier, ChannelAcceptor, ChannelCloseSummary, ChannelConstraints, ChannelDatabase,
    ChannelEventNotifier, ChannelId, CloseReason, CommitmentType, FundedChannel, GossipError,
    GossipSender, MessageSigner, OpenChannelRequest, OpenStatusUpdate, PeerMessenger,
    PendingChannelSummary, PsbtState, Storage, Time, Wallet,
};

/// The label attached to the funding transaction in the wallet.
const CHANNEL_OPEN_LABEL: &str = "openchannel";

/// A channel past the handshake, being driven from funding broadcast to
/// full announcement.
struct OpeningFlow {
    channel: FundedChannel,
    updates: Option<Sender<OpenStatusUpdate>>,
    errors: Option<Sender<Error>>,
    /// A `FundingLocked` received from the peer before our own confirmation
    /// handling finished, replayed once `MarkedOpen` has been written.
    stashed_funding_locked: Option<FundingLocked>,
}

enum FlowStatus {
    InProgress,
    Finished,
}

enum StepResult {
    Advanced,
    Blocked,
    Announced,
}

enum ConfStatus {
    Confirmed,
    Waiting,
}

fn hex_str(value: &[u8]) -> String {
    let mut res = String::with_capacity(2 * value.len());
    for v in value {
        res.push_str(&format!("{:02x}", v));
    }
    res
}

/// Orchestrates the funding workflow of channels, either kicked off locally
/// through [`FundingManager::open_channel`] or remotely through the wire
/// messages passed to [`FundingManager::on_funding_message`]. Anything
/// depending on chain or clock progress is driven by
/// [`FundingManager::periodic_check`].
pub struct FundingManager<W: Deref, C: Deref, S: Deref, D: Deref, P: Deref, G: Deref, A: Deref, M: Deref, E: Deref, T: Deref, F: Deref>
where
    W::Target: Wallet,
    C::Target: ChainNotifier,
    S::Target: Storage,
    D::Target: ChannelDatabase,
    P::Target: PeerMessenger,
    G::Target: GossipSender,
    A::Target: ChannelAcceptor,
    M::Target: MessageSigner,
    E::Target: ChannelEventNotifier,
    T::Target: Time,
    F::Target: FeeEstimator,
{
    config: FundingConfig,
    wallet: W,
    chain: C,
    store: S,
    channel_db: D,
    peers: P,
    gossip: G,
    acceptor: A,
    signer: M,
    events: E,
    time: T,
    fee_estimator: F,
    secp: Secp256k1<All>,
    registry: ReservationRegistry,
    chan_id_source: TempChanIdSource,
    opening_flows: HashMap<ChannelId, OpeningFlow>,
    new_channel_barriers: HashSet<ChannelId>,
    psbt_parked: HashSet<(PublicKey, ChannelId)>,
    pending_peer_errors: Vec<(PublicKey, ChannelId, String)>,
    last_update_timestamps: HashMap<u64, u32>,
    last_zombie_sweep: u64,
    shutting_down: bool,
}

impl<W: Deref, C: Deref, S: Deref, D: Deref, P: Deref, G: Deref, A: Deref, M: Deref, E: Deref, T: Deref, F: Deref>
    FundingManager<W, C, S, D, P, G, A, M, E, T, F>
where
    W::Target: Wallet,
    C::Target: ChainNotifier,
    S::Target: Storage,
    D::Target: ChannelDatabase,
    P::Target: PeerMessenger,
    G::Target: GossipSender,
    A::Target: ChannelAcceptor,
    M::Target: MessageSigner,
    E::Target: ChannelEventNotifier,
    T::Target: Time,
    F::Target: FeeEstimator,
{
    /// Create a new FundingManager struct. The `temp_chan_id_seed` keys the
    /// stream cipher generating temporary channel ids and must be
    /// cryptographically random.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: FundingConfig,
        wallet: W,
        chain: C,
        store: S,
        channel_db: D,
        peers: P,
        gossip: G,
        acceptor: A,
        signer: M,
        events: E,
        time: T,
        fee_estimator: F,
        temp_chan_id_seed: [u8; 32],
    ) -> Result<Self, Error> {
        Ok(FundingManager {
            config,
            wallet,
            chain,
            store,
            channel_db,
            peers,
            gossip,
            acceptor,
            signer,
            events,
            time,
            fee_estimator,
            secp: Secp256k1::new(),
            registry: ReservationRegistry::new(),
            chan_id_source: TempChanIdSource::new(temp_chan_id_seed),
            opening_flows: HashMap::new(),
            new_channel_barriers: HashSet::new(),
            psbt_parked: HashSet::new(),
            pending_peer_errors: Vec::new(),
            last_update_timestamps: HashMap::new(),
            last_zombie_sweep: 0,
            shutting_down: false,
        })
    }

    /// Loads the channels that were waiting for their funding transaction
    /// to confirm or still progressing through the opening state machine
    /// when the manager last went down, and re-arms their flows.
    /// Re-publishes the funding transaction of pending channels we
    /// initiated, which is a no-op for transactions the network already
    /// knows.
    pub fn start(&mut self) -> Result<(), Error> {
        let all_channels = self.channel_db.fetch_all_channels()?;

        for channel in all_channels {
            let channel_id = channel.channel_id();

            if channel.is_pending {
                debug!(
                    "Loading pending ChannelPoint({}), creating chan barrier",
                    channel.funding_outpoint
                );
                self.new_channel_barriers.insert(channel_id);

                if self.config.rebroadcast_on_start && channel.is_initiator {
                    if let Some(funding_tx) = &channel.funding_tx {
                        debug!(
                            "Rebroadcasting funding tx for ChannelPoint({})",
                            channel.funding_outpoint
                        );
                        if let Err(e) =
                            self.wallet.publish_transaction(funding_tx, CHANNEL_OPEN_LABEL)
                        {
                            error!(
                                "Unable to rebroadcast funding tx for ChannelPoint({}): {}",
                                channel.funding_outpoint, e
                            );
                        }
                    }
                }
            } else if self.store.get_opening_state(&channel.funding_outpoint)?.is_none() {
                // Already announced to the network.
                continue;
            }

            self.opening_flows.insert(
                channel_id,
                OpeningFlow {
                    channel,
                    updates: None,
                    errors: None,
                    stashed_funding_locked: None,
                },
            );
        }

        Ok(())
    }

    /// Signals the manager to refuse further work. In-flight reservations
    /// are not cancelled; pending channels resume from the channel database
    /// on next startup.
    pub fn stop(&mut self) {
        info!("Funding manager shutting down");
        self.shutting_down = true;
    }

    /// Function called to pass a funding message received from the given
    /// peer to the manager.
    pub fn on_funding_message(
        &mut self,
        peer_id: &PublicKey,
        msg: &FundingMessage,
    ) -> Result<(), Error> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        match msg {
            FundingMessage::Open(m) => self.on_open_channel(peer_id, m),
            FundingMessage::Accept(m) => self.on_accept_channel(peer_id, m),
            FundingMessage::Created(m) => self.on_funding_created(peer_id, m),
            FundingMessage::Signed(m) => self.on_funding_signed(peer_id, m),
            FundingMessage::FundingLocked(m) => self.on_funding_locked(peer_id, m),
            FundingMessage::Error(m) => self.on_error_message(peer_id, m),
            _ => Err(Error::InvalidState(format!(
                "unexpected message type {}",
                msg.type_id()
            ))),
        }
    }

    /// Initiates a single funder workflow with the given peer, returning
    /// the temporary channel id tracking it. Progress is streamed on the
    /// request's update sink.
    pub fn open_channel(&mut self, request: OpenChannelRequest) -> Result<ChannelId, Error> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        let peer_id = request.peer_id;
        let local_features = self.peers.local_features(&peer_id);
        let remote_features = self.peers.remote_features(&peer_id);
        let commitment_type =
            handshake::negotiate_commitment_type(&local_features, &remote_features);

        let conf_target = match commitment_type {
            CommitmentType::Anchors => ConfirmationTarget::AnchorChannelFee,
            _ => ConfirmationTarget::NonAnchorChannelFee,
        };
        let commit_fee_per_kw = self.fee_estimator.get_est_sat_per_1000_weight(conf_target);

        let channel_flags = if request.private {
            0
        } else {
            FF_ANNOUNCE_CHANNEL
        };

        let temp_chan_id = match request.pending_channel_id {
            Some(id) => {
                if self.registry.contains(&peer_id, &id) {
                    return Err(Error::InvalidState(format!(
                        "pending channel id {} already present",
                        hex_str(&id)
                    )));
                }
                id
            }
            None => self.chan_id_source.next_id(),
        };

        let shutdown_script = handshake::upfront_shutdown_script(
            self.config.enable_upfront_shutdown,
            &remote_features,
            request.shutdown_script.clone(),
            || self.wallet.new_shutdown_script(),
        )?;

        let init_request = crate::InitFundingRequest {
            chain_hash: self.config.chain_hash,
            temporary_channel_id: temp_chan_id,
            peer_id,
            local_amount: request.local_amount,
            remote_amount: 0,
            commit_fee_per_kw,
            funding_fee_per_kw: request.funding_fee_per_kw,
            push_msat: request.push_msat,
            channel_flags,
            min_confs: request.min_confs,
            subtract_fees: request.subtract_fees,
            commitment_type,
        };
        let mut reservation = self.wallet.init_channel_reservation(&init_request)?;
        reservation.set_our_upfront_shutdown(shutdown_script);

        // The final capacity is only known once the wallet has reserved the
        // funds, it may change when fees are subtracted from the funding
        // amount.
        let capacity = reservation.capacity();

        let remote_csv_delay = if request.remote_csv_delay != 0 {
            request.remote_csv_delay
        } else {
            self.config.required_remote_delay(capacity)
        };
        let remote_min_htlc = if request.min_htlc_in != 0 {
            request.min_htlc_in
        } else {
            self.config.default_min_htlc_in
        };
        let remote_max_value = if request.max_value_in_flight != 0 {
            request.max_value_in_flight
        } else {
            self.config.required_remote_max_value(capacity)
        };
        let remote_max_htlcs = if request.max_htlcs != 0 {
            request.max_htlcs
        } else {
            self.config.required_remote_max_htlcs(capacity)
        };
        let max_local_csv = if request.max_local_csv != 0 {
            request.max_local_csv
        } else {
            self.config.max_local_csv_delay
        };

        let our_contribution = reservation.our_contribution();
        let chan_reserve = self
            .config
            .required_remote_chan_reserve(capacity, our_contribution.dust_limit);

        let context = ReservationContext {
            reservation,
            peer_id,
            capacity,
            remote_csv_delay,
            remote_min_htlc,
            remote_max_value,
            remote_max_htlcs,
            max_local_csv,
            last_updated: Some(self.time.unix_time_now()),
            updates: Some(request.updates),
            errors: Some(request.errors),
        };
        self.registry.insert(peer_id, temp_chan_id, context);

        info!(
            "Starting funding workflow with {} for pending_id({}), committype={:?}",
            peer_id,
            hex_str(&temp_chan_id),
            commitment_type
        );

        let funding_open = OpenChannel {
            chain_hash: self.config.chain_hash,
            temporary_channel_id: temp_chan_id,
            funding_amount: capacity,
            push_amount: request.push_msat,
            dust_limit: our_contribution.dust_limit,
            max_value_in_flight: remote_max_value,
            channel_reserve: chan_reserve,
            htlc_minimum: remote_min_htlc,
            fee_per_kw: commit_fee_per_kw,
            csv_delay: remote_csv_delay,
            max_accepted_htlcs: remote_max_htlcs,
            funding_pubkey: our_contribution.basepoints.funding_pubkey,
            revocation_point: our_contribution.basepoints.revocation,
            payment_point: our_contribution.basepoints.payment,
            delayed_payment_point: our_contribution.basepoints.delayed_payment,
            htlc_point: our_contribution.basepoints.htlc,
            first_commitment_point: our_contribution.first_commitment_point,
            channel_flags,
            upfront_shutdown_script: our_contribution.upfront_shutdown,
        };

        if let Err(e) = self
            .peers
            .send_message(&peer_id, true, FundingMessage::Open(funding_open))
        {
            error!("unable to send funding request message: {}", e);
            // The funding flow never started, cancel the reservation rather
            // than relying on the zombie sweep.
            if let Some(mut context) = self.registry.remove(&peer_id, &temp_chan_id) {
                if let Err(cancel_err) = context.reservation.cancel() {
                    error!("unable to cancel reservation: {}", cancel_err);
                }
            }
            return Err(e);
        }

        Ok(temp_chan_id)
    }

    /// Returns a description of all channels currently waiting for their
    /// funding transaction to confirm.
    pub fn pending_channels(&self) -> Result<Vec<PendingChannelSummary>, Error> {
        let pending = self.channel_db.fetch_pending_channels()?;
        Ok(pending
            .into_iter()
            .map(|channel| PendingChannelSummary {
                identity_pubkey: channel.peer_id,
                funding_outpoint: channel.funding_outpoint,
                capacity: channel.capacity,
                local_balance: channel.local_balance,
                remote_balance: channel.remote_balance,
            })
            .collect())
    }

    /// Whether a funding workflow with the given temporary channel id is in
    /// progress with the given peer.
    pub fn is_pending_channel(&self, temp_chan_id: &ChannelId, peer_id: &PublicKey) -> bool {
        self.registry.contains(peer_id, temp_chan_id)
    }

    /// Whether HTLC traffic on the given channel must still be held back
    /// because the funding flow has not completed the `FundingLocked`
    /// exchange.
    pub fn has_channel_barrier(&self, channel_id: &ChannelId) -> bool {
        self.new_channel_barriers.contains(channel_id)
    }

    /// Cancels all active reservations associated with the given peer,
    /// releasing any coins locked for them. Called on peer disconnect;
    /// channels whose funding transaction has been broadcast are unaffected.
    pub fn cancel_peer_reservations(&mut self, peer_id: &PublicKey) {
        debug!("Cancelling all reservations for peer {}", peer_id);

        let reservations = self.registry.take_peer(peer_id);
        if reservations.is_empty() {
            debug!("No active reservations for node: {}", peer_id);
            return;
        }

        for (temp_chan_id, mut context) in reservations {
            if let Err(e) = context.reservation.cancel() {
                error!(
                    "unable to cancel reservation for node={}: {}",
                    context.peer_id, e
                );
            }
            context.notify_error(Error::PeerDisconnected);
            self.psbt_parked.remove(&(*peer_id, temp_chan_id));
        }
    }

    /// Function to call periodically to move every time and chain dependent
    /// part of the funding workflows forward: resuming parked PSBT flows,
    /// polling funding confirmations, advancing the opening state machine,
    /// delivering deferred errors and pruning zombie reservations.
    pub fn periodic_check(&mut self) -> Result<(), Error> {
        if self.shutting_down {
            return Err(Error::ShuttingDown);
        }

        self.check_psbt_flows();
        self.advance_opening_flows();
        self.deliver_pending_peer_errors();
        self.sweep_zombie_reservations();

        Ok(())
    }

    fn on_open_channel(&mut self, peer_id: &PublicKey, msg: &OpenChannel) -> Result<(), Error> {
        let temp_chan_id = msg.temporary_channel_id;
        let amount = msg.funding_amount;

        // Count the reservations and pending channels with this peer,
        // exempting the ones the operator explicitly expects: canned shim
        // reservations, and pending channels with a thaw height, which were
        // also created through a shim.
        let mut num_pending = self.registry.count_nonshim(peer_id);
        let channels = match self.channel_db.fetch_open_channels(peer_id) {
            Ok(channels) => channels,
            Err(e) => {
                self.fail_funding_flow(peer_id, &temp_chan_id, e);
                return Ok(());
            }
        };
        num_pending += channels
            .iter()
            .filter(|c| c.is_pending && c.thaw_height == 0)
            .count();

        if num_pending >= self.config.max_pending_channels {
            self.fail_funding_flow(peer_id, &temp_chan_id, Error::MaxPendingChannels);
            return Ok(());
        }

        // We cannot properly validate the confirmation of the funding
        // transaction while not fully synced to the network.
        match self.wallet.is_synced() {
            Ok(true) => {}
            Ok(false) => {
                self.fail_funding_flow(peer_id, &temp_chan_id, Error::ChainNotSynced);
                return Ok(());
            }
            Err(e) => {
                error!("unable to query wallet: {}", e);
                self.fail_funding_flow(peer_id, &temp_chan_id, Error::ChainNotSynced);
                return Ok(());
            }
        }

        if amount > self.config.max_chan_size {
            self.fail_funding_flow(
                peer_id,
                &temp_chan_id,
                Error::ChanTooLarge {
                    amount,
                    max: self.config.max_chan_size,
                },
            );
            return Ok(());
        }

        if amount < self.config.min_chan_size {
            self.fail_funding_flow(
                peer_id,
                &temp_chan_id,
                Error::ChanTooSmall {
                    amount,
                    min: self.config.min_chan_size,
                },
            );
            return Ok(());
        }

        if self.config.reject_push && msg.push_amount > 0 {
            self.fail_funding_flow(peer_id, &temp_chan_id, Error::NonZeroPushRejected);
            return Ok(());
        }

        if !self.acceptor.accept(peer_id, msg) {
            self.fail_funding_flow(peer_id, &temp_chan_id, Error::AcceptorRejected);
            return Ok(());
        }

        info!(
            "Received funding request (amt={}, push={}, delay={}, pending_id={}) from peer({})",
            amount,
            msg.push_amount,
            msg.csv_delay,
            hex_str(&temp_chan_id),
            peer_id
        );

        // As the responder we commit no funds of our own to the channel.
        let local_features = self.peers.local_features(peer_id);
        let remote_features = self.peers.remote_features(peer_id);
        let commitment_type =
            handshake::negotiate_commitment_type(&local_features, &remote_features);

        let init_request = crate::InitFundingRequest {
            chain_hash: msg.chain_hash,
            temporary_channel_id: temp_chan_id,
            peer_id: *peer_id,
            local_amount: 0,
            remote_amount: amount,
            commit_fee_per_kw: msg.fee_per_kw,
            funding_fee_per_kw: 0,
            push_msat: msg.push_amount,
            channel_flags: msg.channel_flags,
            min_confs: 1,
            subtract_fees: false,
            commitment_type,
        };
        let mut reservation = match self.wallet.init_channel_reservation(&init_request) {
            Ok(reservation) => reservation,
            Err(e) => {
                error!("Unable to initialize reservation: {}", e);
                self.fail_funding_flow(peer_id, &temp_chan_id, e);
                return Ok(());
            }
        };

        // As the responder we get to pick the confirmation depth, scaled by
        // the funds at stake.
        let num_confs = self.config.num_required_confs(amount, msg.push_amount);
        reservation.set_num_confs_required(num_confs);

        let constraints = ChannelConstraints {
            dust_limit: msg.dust_limit,
            channel_reserve: msg.channel_reserve,
            max_value_in_flight: msg.max_value_in_flight,
            htlc_minimum: msg.htlc_minimum,
            max_accepted_htlcs: msg.max_accepted_htlcs,
            csv_delay: msg.csv_delay,
        };
        let commit_result = handshake::validate_constraints(
            &constraints,
            amount,
            self.config.max_local_csv_delay,
        )
        .and_then(|_| reservation.commit_constraints(&constraints, self.config.max_local_csv_delay));
        if let Err(e) = commit_result {
            warn!("Unacceptable channel constraints: {}", e);
            if let Err(cancel_err) = reservation.cancel() {
                error!("unable to cancel reservation: {}", cancel_err);
            }
            self.fail_funding_flow(peer_id, &temp_chan_id, e);
            return Ok(());
        }

        // A fresh wallet script is committed when default shutdown scripts
        // are enabled; no user script exists since this open was not
        // initiated locally.
        let shutdown_script = match handshake::upfront_shutdown_script(
            self.config.enable_upfront_shutdown,
            &remote_features,
            None,
            || self.wallet.new_shutdown_script(),
        ) {
            Ok(script) => script,
            Err(e) => {
                if let Err(cancel_err) = reservation.cancel() {
                    error!("unable to cancel reservation: {}", cancel_err);
                }
                self.fail_funding_flow(peer_id, &temp_chan_id, e);
                return Ok(());
            }
        };
        reservation.set_our_upfront_shutdown(shutdown_script);

        info!(
            "Requiring {} confirmations for pendingChan({}): amt={}, push_amt={}, committype={:?}",
            num_confs,
            hex_str(&temp_chan_id),
            amount,
            msg.push_amount,
            commitment_type
        );

        // Generate our required constraints for the remote party and
        // process its contribution.
        let remote_csv_delay = self.config.required_remote_delay(amount);
        let chan_reserve = self.config.required_remote_chan_reserve(amount, msg.dust_limit);
        let remote_max_value = self.config.required_remote_max_value(amount);
        let remote_max_htlcs = self.config.required_remote_max_htlcs(amount);
        let remote_min_htlc = self.config.default_min_htlc_in;

        let required = ChannelConstraints {
            dust_limit: 0,
            channel_reserve: chan_reserve,
            max_value_in_flight: remote_max_value,
            htlc_minimum: remote_min_htlc,
            max_accepted_htlcs: remote_max_htlcs,
            csv_delay: remote_csv_delay,
        };
        let remote_contribution = handshake::remote_contribution_from_open(msg, required);
        if let Err(e) = reservation.process_single_contribution(remote_contribution) {
            error!("unable to add contribution to reservation: {}", e);
            if let Err(cancel_err) = reservation.cancel() {
                error!("unable to cancel reservation: {}", cancel_err);
            }
            self.fail_funding_flow(peer_id, &temp_chan_id, e);
            return Ok(());
        }

        let our_contribution = reservation.our_contribution();

        let context = ReservationContext {
            reservation,
            peer_id: *peer_id,
            capacity: amount,
            remote_csv_delay,
            remote_min_htlc,
            remote_max_value,
            remote_max_htlcs,
            max_local_csv: self.config.max_local_csv_delay,
            last_updated: Some(self.time.unix_time_now()),
            updates: None,
            errors: None,
        };
        self.registry.insert(*peer_id, temp_chan_id, context);

        info!("Sending fundingResp for pending_id({})", hex_str(&temp_chan_id));

        let funding_accept = AcceptChannel {
            temporary_channel_id: temp_chan_id,
            dust_limit: our_contribution.dust_limit,
            max_value_in_flight: remote_max_value,
            channel_reserve: chan_reserve,
            htlc_minimum: remote_min_htlc,
            min_accept_depth: num_confs as u32,
            csv_delay: remote_csv_delay,
            max_accepted_htlcs: remote_max_htlcs,
            funding_pubkey: our_contribution.basepoints.funding_pubkey,
            revocation_point: our_contribution.basepoints.revocation,
            payment_point: our_contribution.basepoints.payment,
            delayed_payment_point: our_contribution.basepoints.delayed_payment,
            htlc_point: our_contribution.basepoints.htlc,
            first_commitment_point: our_contribution.first_commitment_point,
            upfront_shutdown_script: our_contribution.upfront_shutdown,
        };

        if let Err(e) = self
            .peers
            .send_message(peer_id, true, FundingMessage::Accept(funding_accept))
        {
            error!("unable to send funding response to peer: {}", e);
            self.fail_funding_flow(peer_id, &temp_chan_id, e);
            return Ok(());
        }

        let now = self.time.unix_time_now();
        if let Some(context) = self.registry.get_mut(peer_id, &temp_chan_id) {
            context.update_timestamp(now);
        }

        Ok(())
    }

    fn on_accept_channel(&mut self, peer_id: &PublicKey, msg: &AcceptChannel) -> Result<(), Error> {
        let temp_chan_id = msg.temporary_channel_id;
        let now = self.time.unix_time_now();

        let (capacity, max_local_csv, remote_csv_delay, remote_min_htlc, remote_max_value, remote_max_htlcs) =
            match self.registry.get(peer_id, &temp_chan_id) {
                Some(context) => (
                    context.capacity,
                    context.max_local_csv,
                    context.remote_csv_delay,
                    context.remote_min_htlc,
                    context.remote_max_value,
                    context.remote_max_htlcs,
                ),
                None => {
                    warn!(
                        "Can't find reservation (peer_id:{}, chan_id:{})",
                        peer_id,
                        hex_str(&temp_chan_id)
                    );
                    return Ok(());
                }
            };

        info!("Recv'd fundingResponse for pending_id({})", hex_str(&temp_chan_id));

        // The requested depth must be dispatchable by the chain notifier.
        let max_confs = self.chain.max_supported_confs();
        if msg.min_accept_depth > max_confs {
            let err = Error::NumConfsTooLarge {
                required: msg.min_accept_depth,
                max: max_confs,
            };
            warn!("Unacceptable channel constraints: {}", err);
            self.fail_funding_flow(peer_id, &temp_chan_id, err);
            return Ok(());
        }

        let constraints = ChannelConstraints {
            dust_limit: msg.dust_limit,
            channel_reserve: msg.channel_reserve,
            max_value_in_flight: msg.max_value_in_flight,
            htlc_minimum: msg.htlc_minimum,
            max_accepted_htlcs: msg.max_accepted_htlcs,
            csv_delay: msg.csv_delay,
        };
        if let Err(e) = handshake::validate_constraints(&constraints, capacity, max_local_csv) {
            warn!("Unacceptable channel constraints: {}", e);
            self.fail_funding_flow(peer_id, &temp_chan_id, e);
            return Ok(());
        }

        // They accepted our required constraints, regenerate them here to
        // commit them to the reservation, using the dust limit they picked.
        let required = ChannelConstraints {
            dust_limit: 0,
            channel_reserve: self
                .config
                .required_remote_chan_reserve(capacity, msg.dust_limit),
            max_value_in_flight: remote_max_value,
            htlc_minimum: remote_min_htlc,
            max_accepted_htlcs: remote_max_htlcs,
            csv_delay: remote_csv_delay,
        };
        let remote_contribution = handshake::remote_contribution_from_accept(msg, required);

        info!(
            "pendingChan({}): remote party proposes num_confs={}, csv_delay={}",
            hex_str(&temp_chan_id),
            msg.min_accept_depth,
            msg.csv_delay
        );

        let step = {
            let context = match self.registry.get_mut(peer_id, &temp_chan_id) {
                Some(context) => context,
                None => return Ok(()),
            };
            context
                .reservation
                .set_num_confs_required(msg.min_accept_depth as u16);
            match context
                .reservation
                .commit_constraints(&constraints, max_local_csv)
                .and_then(|_| context.reservation.process_contribution(remote_contribution))
            {
                Ok(()) => {
                    context.update_timestamp(now);
                    Ok(false)
                }
                Err(Error::PsbtFundingRequired) => {
                    // The wallet halted the funding process after
                    // negotiating the multisig keys; the user now has
                    // everything needed to construct the PSBT.
                    match context.reservation.psbt_state() {
                        PsbtState::AwaitingFunding {
                            funding_address,
                            funding_amount,
                            psbt,
                        } => {
                            context.notify_update(OpenStatusUpdate::PsbtFund {
                                funding_address,
                                funding_amount,
                                psbt,
                            });
                            // Shield the parked reservation from the
                            // zombie sweep.
                            context.lock();
                            Ok(true)
                        }
                        _ => Err(Error::InvalidState(
                            "reservation did not provide funding parameters for the PSBT flow"
                                .to_string(),
                        )),
                    }
                }
                Err(e) => Err(e),
            }
        };

        match step {
            Err(e) => {
                error!("Unable to process contribution from {}: {}", peer_id, e);
                self.fail_funding_flow(peer_id, &temp_chan_id, e);
                Ok(())
            }
            Ok(true) => {
                self.psbt_parked.insert((*peer_id, temp_chan_id));
                info!(
                    "pending_id({}): waiting for signed PSBT",
                    hex_str(&temp_chan_id)
                );
                Ok(())
            }
            Ok(false) => self.continue_funding_accept(peer_id, &temp_chan_id),
        }
    }

    /// Continues the funding flow once our contribution is finalized, the
    /// channel output is known and the funding transaction is signed.
    fn continue_funding_accept(
        &mut self,
        peer_id: &PublicKey,
        temp_chan_id: &ChannelId,
    ) -> Result<(), Error> {
        let step = {
            let context = match self.registry.get(peer_id, temp_chan_id) {
                Some(context) => context,
                None => return Ok(()),
            };
            context.reservation.funding_outpoint().and_then(|outpoint| {
                context
                    .reservation
                    .our_signatures()
                    .map(|sig| (outpoint, sig))
            })
        };
        let (funding_outpoint, commit_sig) = match step {
            Ok(v) => v,
            Err(e) => {
                error!("Unable to obtain funding outpoint and signature: {}", e);
                self.fail_funding_flow(peer_id, temp_chan_id, e);
                return Ok(());
            }
        };

        // The next message advancing the flow will reference the channel by
        // its permanent id, set up the crossref and the barrier holding
        // back HTLC traffic until the channel is fully open.
        let channel_id = channel_id_from_outpoint(&funding_outpoint);
        debug!("Creating chan barrier for ChanID({})", hex_str(&channel_id));
        self.new_channel_barriers.insert(channel_id);
        self.registry.register_signed(channel_id, *temp_chan_id);

        info!(
            "Generated ChannelPoint({}) for pending_id({})",
            funding_outpoint,
            hex_str(temp_chan_id)
        );

        let funding_created = FundingCreated {
            temporary_channel_id: *temp_chan_id,
            funding_outpoint,
            commit_sig,
        };
        if let Err(e) = self
            .peers
            .send_message(peer_id, true, FundingMessage::Created(funding_created))
        {
            error!("Unable to send funding complete message: {}", e);
            self.fail_funding_flow(peer_id, temp_chan_id, e);
            return Ok(());
        }

        let now = self.time.unix_time_now();
        if let Some(context) = self.registry.get_mut(peer_id, temp_chan_id) {
            context.update_timestamp(now);
        }

        Ok(())
    }

    fn on_funding_created(
        &mut self,
        peer_id: &PublicKey,
        msg: &FundingCreated,
    ) -> Result<(), Error> {
        let temp_chan_id = msg.temporary_channel_id;

        if self.registry.get(peer_id, &temp_chan_id).is_none() {
            warn!(
                "can't find reservation (peer_id:{}, chan_id:{})",
                peer_id,
                hex_str(&temp_chan_id)
            );
            return Ok(());
        }

        let funding_outpoint = msg.funding_outpoint;
        info!(
            "completing pending_id({}) with ChannelPoint({})",
            hex_str(&temp_chan_id),
            funding_outpoint
        );

        // Validate the initiator's commitment signature and produce our own
        // over its commitment. This also records the channel as pending in
        // the channel database.
        let step = {
            let context = match self.registry.get_mut(peer_id, &temp_chan_id) {
                Some(context) => context,
                None => return Ok(()),
            };
            context
                .reservation
                .complete_reservation_single(&funding_outpoint, &msg.commit_sig)
                .and_then(|channel| {
                    context
                        .reservation
                        .our_signatures()
                        .map(|sig| (channel, sig))
                })
        };
        let (channel, commit_sig) = match step {
            Ok(v) => v,
            Err(e) => {
                error!("unable to complete single reservation: {}", e);
                self.fail_funding_flow(peer_id, &temp_chan_id, e);
                return Ok(());
            }
        };

        // The channel is now pending in the database and can be removed
        // from the set of active reservations.
        self.registry.remove(peer_id, &temp_chan_id);

        let channel_id = channel.channel_id();
        debug!("Creating chan barrier for ChanID({})", hex_str(&channel_id));
        self.new_channel_barriers.insert(channel_id);

        info!(
            "sending FundingSigned for pending_id({}) over ChannelPoint({})",
            hex_str(&temp_chan_id),
            funding_outpoint
        );

        let funding_signed = FundingSigned {
            channel_id,
            commit_sig,
        };
        if let Err(e) = self
            .peers
            .send_message(peer_id, true, FundingMessage::Signed(funding_signed))
        {
            error!("unable to send FundingSigned message: {}", e);
            self.fail_funding_flow(peer_id, &temp_chan_id, e);
            self.delete_from_database(&channel);
            self.new_channel_barriers.remove(&channel_id);
            return Ok(());
        }

        self.events.notify_pending_open(&funding_outpoint, &channel);

        // Our job as the responder is now complete; the channel is
        // remembered across restarts through the database and we wait for
        // the funding transaction to confirm, or forget the channel after
        // the configured number of blocks without a confirmation.
        self.opening_flows.insert(
            channel_id,
            OpeningFlow {
                channel,
                updates: None,
                errors: None,
                stashed_funding_locked: None,
            },
        );

        Ok(())
    }

    fn on_funding_signed(&mut self, peer_id: &PublicKey, msg: &FundingSigned) -> Result<(), Error> {
        // The message references the flow by its permanent channel id, look
        // up the temporary id through the crossref.
        let channel_id = msg.channel_id;
        let temp_chan_id = match self.registry.take_signed(&channel_id) {
            Some(temp_chan_id) => temp_chan_id,
            None => {
                let err = Error::InvalidState(format!(
                    "unable to find signed reservation for chan_id={}",
                    hex_str(&channel_id)
                ));
                warn!("{}", err);
                self.fail_funding_flow(peer_id, &channel_id, err);
                return Ok(());
            }
        };

        let step = {
            let context = match self.registry.get_mut(peer_id, &temp_chan_id) {
                Some(context) => context,
                None => {
                    warn!(
                        "Unable to find reservation (peer_id:{}, chan_id:{})",
                        peer_id,
                        hex_str(&temp_chan_id)
                    );
                    return Ok(());
                }
            };
            context.reservation.complete_reservation(&msg.commit_sig)
        };
        let channel = match step {
            Ok(channel) => channel,
            Err(e) => {
                error!("Unable to complete reservation sign complete: {}", e);
                self.fail_funding_flow(peer_id, &temp_chan_id, e);
                return Ok(());
            }
        };

        // The channel is now marked pending in the database, delete the
        // reservation but keep the caller sinks for the remaining stages.
        let mut context = match self.registry.remove(peer_id, &temp_chan_id) {
            Some(context) => context,
            None => return Ok(()),
        };

        // Broadcast the finalized funding transaction to the network. A
        // broadcast failure is not fatal: the transaction may have reached
        // the network regardless, so the channel is watched either way and
        // the broadcast retried on startup.
        if let Some(funding_tx) = &channel.funding_tx {
            info!(
                "Broadcasting funding tx for ChannelPoint({})",
                channel.funding_outpoint
            );
            if let Err(e) = self.wallet.publish_transaction(funding_tx, CHANNEL_OPEN_LABEL) {
                error!(
                    "Unable to broadcast funding tx for ChannelPoint({}): {}",
                    channel.funding_outpoint, e
                );
            }
        }

        info!(
            "Finalizing pending_id({}) over ChannelPoint({}), waiting for channel open on-chain",
            hex_str(&temp_chan_id),
            channel.funding_outpoint
        );

        context.notify_update(OpenStatusUpdate::ChanPending {
            txid: channel.funding_outpoint.txid,
            output_index: channel.funding_outpoint.vout,
        });
        self.events
            .notify_pending_open(&channel.funding_outpoint, &channel);

        self.opening_flows.insert(
            channel_id,
            OpeningFlow {
                channel,
                updates: context.updates.take(),
                errors: context.errors.take(),
                stashed_funding_locked: None,
            },
        );

        Ok(())
    }

    fn on_funding_locked(&mut self, peer_id: &PublicKey, msg: &FundingLocked) -> Result<(), Error> {
        debug!(
            "Received FundingLocked for ChannelID({}) from peer {}",
            hex_str(&msg.channel_id),
            peer_id
        );

        // Hold the message back until our own confirmation handling has
        // observed the funding transaction and written the opening state,
        // we may otherwise miss information required to route on the
        // channel.
        if let Some(flow) = self.opening_flows.get_mut(&msg.channel_id) {
            if flow.channel.is_pending {
                flow.stashed_funding_locked = Some(msg.clone());
                return Ok(());
            }
        }

        self.process_funding_locked(peer_id, msg)
    }

    fn process_funding_locked(
        &mut self,
        peer_id: &PublicKey,
        msg: &FundingLocked,
    ) -> Result<(), Error> {
        // Go to the database rather than the reservation map, we may have
        // restarted mid flow.
        let channel = match self.channel_db.find_channel(&msg.channel_id) {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                error!(
                    "Unable to locate ChannelID({}), cannot complete funding",
                    hex_str(&msg.channel_id)
                );
                return Ok(());
            }
            Err(e) => {
                error!("Unable to query channel database: {}", e);
                return Ok(());
            }
        };

        if channel.remote_next_revocation.is_some() {
            info!(
                "Received duplicate FundingLocked for ChannelID({}), ignoring.",
                hex_str(&msg.channel_id)
            );
            return Ok(());
        }

        // The next commitment point is needed to create any further
        // commitment state for the remote party.
        if let Err(e) = self
            .channel_db
            .insert_next_revocation(&msg.channel_id, msg.next_per_commitment_point)
        {
            error!("unable to insert next commitment point: {}", e);
            return Ok(());
        }
        if let Some(flow) = self.opening_flows.get_mut(&msg.channel_id) {
            flow.channel.remote_next_revocation = Some(msg.next_per_commitment_point);
        }

        // The channel barrier is lifted even if the peer machinery refuses
        // the channel, commitment related modifications may now proceed.
        if self.new_channel_barriers.remove(&msg.channel_id) {
            debug!("Closing chan barrier for ChanID({})", hex_str(&msg.channel_id));
        }

        if let Err(e) = self.peers.add_new_channel(peer_id, &channel) {
            error!(
                "Unable to add new channel {} with peer {}: {}",
                channel.funding_outpoint, peer_id, e
            );
        }

        Ok(())
    }

    fn on_error_message(&mut self, peer_id: &PublicKey, msg: &ErrorMessage) -> Result<(), Error> {
        // Attempt to retrieve and cancel the funding workflow this error is
        // tied to; an unknown id means the error was unwarranted.
        let context = match self.cancel_reservation_ctx(peer_id, &msg.channel_id, true) {
            Some(context) => context,
            None => {
                warn!(
                    "Received error for non-existent funding flow: {}",
                    msg.data
                );
                return Ok(());
            }
        };

        error!("received funding error from {}: {}", peer_id, msg.data);

        // In a PSBT flow the remote likely timed out waiting for us, give
        // the caller an error saying so.
        let funding_err = if context.reservation.is_psbt() {
            Error::RemoteCanceled(msg.data.clone())
        } else {
            Error::PeerError(msg.data.clone())
        };
        context.notify_error(funding_err);

        Ok(())
    }

    /// Fails the active funding flow with the target peer: the wallet
    /// reservation is cancelled, the registry entry removed, the local
    /// caller notified and an error frame sent to the peer.
    fn fail_funding_flow(&mut self, peer_id: &PublicKey, temp_chan_id: &ChannelId, err: Error) {
        debug!(
            "Failing funding flow for pending_id={}: {}",
            hex_str(temp_chan_id),
            err
        );

        let data = err.peer_error_data();

        if let Some(context) = self.cancel_reservation_ctx(peer_id, temp_chan_id, false) {
            context.notify_error(err);
        }

        let error_msg = ErrorMessage {
            channel_id: *temp_chan_id,
            data,
        };
        debug!("Sending funding error to peer ({}): {:?}", peer_id, error_msg);
        if let Err(e) = self
            .peers
            .send_message(peer_id, false, FundingMessage::Error(error_msg))
        {
            error!("unable to send error message to peer {}", e);
        }
    }

    /// Does all needed work to securely cancel a reservation: marks PSBT
    /// reservations as remotely canceled where applicable, cancels the
    /// wallet reservation and removes the registry entry.
    fn cancel_reservation_ctx(
        &mut self,
        peer_id: &PublicKey,
        temp_chan_id: &ChannelId,
        by_remote: bool,
    ) -> Option<ReservationContext> {
        info!(
            "Cancelling funding reservation for node_key={}, chan_id={}",
            peer_id,
            hex_str(temp_chan_id)
        );

        let mut context = self.registry.remove(peer_id, temp_chan_id)?;

        if by_remote && context.reservation.is_psbt() {
            context.reservation.mark_remote_canceled();
        }

        if let Err(e) = context.reservation.cancel() {
            error!("unable to cancel reservation: {}", e);
        }

        self.psbt_parked.remove(&(*peer_id, *temp_chan_id));

        Some(context)
    }

    /// Removes the pending channel record of a flow that failed after the
    /// channel had already been written to the database.
    fn delete_from_database(&mut self, channel: &FundedChannel) {
        let close_info = ChannelCloseSummary {
            funding_outpoint: channel.funding_outpoint,
            peer_id: channel.peer_id,
            capacity: channel.capacity,
            settled_balance: channel.local_balance,
            close_reason: CloseReason::FundingCanceled,
        };
        if let Err(e) = self.channel_db.close_channel(&close_info) {
            error!(
                "Failed closing channel {}: {}",
                channel.funding_outpoint, e
            );
        }
    }

    /// Resolves reservations parked on external PSBT funding: continues the
    /// flow once the signed PSBT has been verified, fails it when the user
    /// or the remote gave up.
    fn check_psbt_flows(&mut self) {
        let parked: Vec<(PublicKey, ChannelId)> = self.psbt_parked.iter().cloned().collect();
        for (peer_id, temp_chan_id) in parked {
            let state = match self.registry.get(&peer_id, &temp_chan_id) {
                Some(context) => context.reservation.psbt_state(),
                None => {
                    self.psbt_parked.remove(&(peer_id, temp_chan_id));
                    continue;
                }
            };

            match state {
                PsbtState::AwaitingFunding { .. } => {}
                PsbtState::Ready => {
                    self.psbt_parked.remove(&(peer_id, temp_chan_id));
                    let now = self.time.unix_time_now();
                    let process = {
                        let context = match self.registry.get_mut(&peer_id, &temp_chan_id) {
                            Some(context) => context,
                            None => continue,
                        };
                        let process = context.reservation.process_psbt();
                        if process.is_ok() {
                            context.update_timestamp(now);
                        }
                        process
                    };
                    match process {
                        Ok(()) => {
                            if let Err(e) = self.continue_funding_accept(&peer_id, &temp_chan_id) {
                                error!("error continuing PSBT flow: {}", e);
                            }
                        }
                        Err(e) => {
                            error!("error continuing PSBT flow: {}", e);
                            self.fail_funding_flow(&peer_id, &temp_chan_id, e);
                        }
                    }
                }
                PsbtState::UserCanceled => {
                    self.psbt_parked.remove(&(peer_id, temp_chan_id));
                    error!(
                        "aborting PSBT flow for pending_chan_id={}",
                        hex_str(&temp_chan_id)
                    );
                    self.fail_funding_flow(&peer_id, &temp_chan_id, Error::UserCanceled);
                }
                PsbtState::RemoteCanceled => {
                    // The peer is gone, no further error frame is owed to
                    // it.
                    self.psbt_parked.remove(&(peer_id, temp_chan_id));
                    info!(
                        "Remote canceled, aborting PSBT flow for pending_chan_id={}",
                        hex_str(&temp_chan_id)
                    );
                    if let Some(context) =
                        self.cancel_reservation_ctx(&peer_id, &temp_chan_id, true)
                    {
                        context.notify_error(Error::RemoteCanceled(
                            "funding flow canceled by remote".to_string(),
                        ));
                    }
                }
                PsbtState::NotRequired => {
                    self.psbt_parked.remove(&(peer_id, temp_chan_id));
                }
            }
        }
    }

    /// Advances every channel past the handshake through the opening state
    /// machine, then replays `FundingLocked` messages that were held back
    /// until the local confirmation handling completed.
    fn advance_opening_flows(&mut self) {
        let channel_ids: Vec<ChannelId> = self.opening_flows.keys().copied().collect();
        for channel_id in channel_ids {
            let mut flow = match self.opening_flows.remove(&channel_id) {
                Some(flow) => flow,
                None => continue,
            };
            match self.advance_opening_flow(&mut flow) {
                Ok(FlowStatus::InProgress) => {
                    self.opening_flows.insert(channel_id, flow);
                }
                Ok(FlowStatus::Finished) => {}
                Err(e) => {
                    error!(
                        "Unable to advance state of ChannelPoint({}): {}",
                        flow.channel.funding_outpoint, e
                    );
                    self.opening_flows.insert(channel_id, flow);
                }
            }
        }

        let mut replays: Vec<(PublicKey, FundingLocked)> = Vec::new();
        for flow in self.opening_flows.values_mut() {
            if !flow.channel.is_pending {
                if let Some(msg) = flow.stashed_funding_locked.take() {
                    replays.push((flow.channel.peer_id, msg));
                }
            }
        }
        for (peer_id, msg) in replays {
            if let Err(e) = self.process_funding_locked(&peer_id, &msg) {
                error!("unable to process deferred FundingLocked: {}", e);
            }
        }
    }

    fn advance_opening_flow(&mut self, flow: &mut OpeningFlow) -> Result<FlowStatus, Error> {
        if flow.channel.is_pending {
            match self.check_funding_confirmation(flow)? {
                ConfStatus::Confirmed => {}
                ConfStatus::Waiting => {
                    // We have no funds at stake as the responder and time
                    // the channel out after the configured block deadline.
                    if !flow.channel.is_initiator {
                        let best_height = self.chain.best_height()?;
                        let max_height = flow.channel.funding_broadcast_height
                            + MAX_WAIT_NUM_BLOCKS_FUNDING_CONF;
                        if best_height >= max_height {
                            self.timeout_pending_channel(flow)?;
                            return Ok(FlowStatus::Finished);
                        }
                    }
                    return Ok(FlowStatus::InProgress);
                }
            }
        }

        loop {
            let (state, short_chan_id) =
                match self.store.get_opening_state(&flow.channel.funding_outpoint)? {
                    Some(v) => v,
                    None => {
                        // Not in the opening database, meaning the channel
                        // was successfully announced to the network.
                        debug!(
                            "ChannelPoint({}) not found in opening database, assuming already \
                             announced to the network",
                            flow.channel.funding_outpoint
                        );
                        return Ok(FlowStatus::Finished);
                    }
                };

            debug!(
                "Channel({}) with ShortChanID {} has opening state {}",
                hex_str(&flow.channel.channel_id()),
                short_chan_id,
                state
            );

            match self.state_step(flow, state, short_chan_id)? {
                StepResult::Advanced => continue,
                StepResult::Blocked => return Ok(FlowStatus::InProgress),
                StepResult::Announced => return Ok(FlowStatus::Finished),
            }
        }
    }

    /// Polls the chain for the funding confirmation and, once the required
    /// depth is reached, validates the funding transaction and records the
    /// channel as open. The opening state is written before the channel
    /// database is updated so that a failed write can be recovered from.
    fn check_funding_confirmation(&mut self, flow: &mut OpeningFlow) -> Result<ConfStatus, Error> {
        let funding_outpoint = flow.channel.funding_outpoint;
        let funding_script = flow.channel.funding_script();
        let confirmation = self.chain.tx_confirmation_info(
            &funding_outpoint.txid,
            &funding_script,
            flow.channel.funding_broadcast_height,
        )?;

        let confirmation = match confirmation {
            Some(confirmation)
                if confirmation.confirmations >= flow.channel.num_confs_required as u32 =>
            {
                confirmation
            }
            _ => return Ok(ConfStatus::Waiting),
        };

        // The wallet must fully verify the confirmed funding transaction
        // before the channel is used.
        self.wallet.validate_channel(&flow.channel, &confirmation.tx)?;

        let short_chan_id = ShortChannelId {
            block_height: confirmation.block_height,
            tx_index: confirmation.tx_index,
            output_index: funding_outpoint.vout as u16,
        };
        let channel_id = flow.channel.channel_id();

        info!(
            "ChannelPoint({}) is now fully confirmed! (short_chan_id={})",
            funding_outpoint, short_chan_id
        );

        self.store.save_opening_state(
            &funding_outpoint,
            ChannelOpeningState::MarkedOpen,
            short_chan_id,
        )?;

        self.channel_db.mark_channel_open(&channel_id, short_chan_id)?;
        flow.channel.is_pending = false;
        flow.channel.short_channel_id = Some(short_chan_id);

        self.events.notify_open(&funding_outpoint);

        // An active link may still carry an outdated short channel id,
        // instruct interested subsystems to reload it from disk.
        if let Err(e) = self.events.report_short_channel_id(&funding_outpoint) {
            error!("unable to report short chan id: {}", e);
        }

        // Our wallet published the funding transaction, tag it with the
        // short channel id now that it is known.
        if flow.channel.is_initiator && flow.channel.funding_tx.is_some() {
            let label = format!(
                "{}:shortchanid-{}",
                CHANNEL_OPEN_LABEL,
                short_chan_id.to_u64()
            );
            if let Err(e) = self
                .wallet
                .update_transaction_label(&funding_outpoint.txid, &label)
            {
                error!("unable to update label: {}", e);
            }
        }

        Ok(ConfStatus::Confirmed)
    }

    /// Closes a channel whose funding transaction did not confirm within
    /// the block deadline. The peer is notified on a best effort basis once
    /// it comes back online.
    fn timeout_pending_channel(&mut self, flow: &mut OpeningFlow) -> Result<(), Error> {
        warn!(
            "Waited for {} blocks without seeing funding transaction confirmed, cancelling.",
            MAX_WAIT_NUM_BLOCKS_FUNDING_CONF
        );

        let close_info = ChannelCloseSummary {
            funding_outpoint: flow.channel.funding_outpoint,
            peer_id: flow.channel.peer_id,
            capacity: flow.channel.capacity,
            settled_balance: flow.channel.local_balance,
            close_reason: CloseReason::FundingCanceled,
        };
        self.channel_db.close_channel(&close_info)?;

        if let Some(errors) = &flow.errors {
            let _ = errors.send(Error::ConfirmationTimeout);
        }

        let timeout_err = format!(
            "timeout waiting for funding tx ({}) to confirm",
            flow.channel.funding_outpoint
        );
        self.pending_peer_errors.push((
            flow.channel.peer_id,
            flow.channel.temporary_channel_id,
            timeout_err,
        ));

        self.new_channel_barriers.remove(&flow.channel.channel_id());

        Ok(())
    }

    /// Advances a confirmed channel one step in the opening state machine.
    /// The new state has been written to the store when a step reports
    /// [`StepResult::Advanced`].
    fn state_step(
        &mut self,
        flow: &mut OpeningFlow,
        state: ChannelOpeningState,
        short_chan_id: ShortChannelId,
    ) -> Result<StepResult, Error> {
        let funding_outpoint = flow.channel.funding_outpoint;
        let channel_id = flow.channel.channel_id();

        match state {
            // The funding transaction is confirmed but FundingLocked has
            // not reached the peer. The message is mandatory at this point,
            // keep retrying across reconnects until it is delivered.
            ChannelOpeningState::MarkedOpen => {
                let peer_id = flow.channel.peer_id;
                if !self.peers.is_online(&peer_id) {
                    debug!(
                        "Peer({}) offline, deferring FundingLocked for ChannelID({})",
                        peer_id,
                        hex_str(&channel_id)
                    );
                    return Ok(StepResult::Blocked);
                }

                let funding_locked = FundingLocked {
                    channel_id,
                    next_per_commitment_point: flow.channel.next_revocation_point(&self.secp),
                };
                info!(
                    "Peer({}) is online, sending FundingLocked for ChannelID({})",
                    peer_id,
                    hex_str(&channel_id)
                );
                if let Err(e) = self.peers.send_message(
                    &peer_id,
                    true,
                    FundingMessage::FundingLocked(funding_locked),
                ) {
                    warn!(
                        "Unable to send FundingLocked to peer {}: {}. Will retry when online",
                        peer_id, e
                    );
                    return Ok(StepResult::Blocked);
                }

                self.store.save_opening_state(
                    &funding_outpoint,
                    ChannelOpeningState::LockedSent,
                    short_chan_id,
                )?;
                debug!(
                    "Channel({}) with ShortChanID {}: successfully sent FundingLocked",
                    hex_str(&channel_id),
                    short_chan_id
                );
                Ok(StepResult::Advanced)
            }

            // FundingLocked was sent but the channel is not part of the
            // router graph yet.
            ChannelOpeningState::LockedSent => {
                self.add_to_router_graph(flow, short_chan_id)?;

                self.store.save_opening_state(
                    &funding_outpoint,
                    ChannelOpeningState::AddedToRouterGraph,
                    short_chan_id,
                )?;
                debug!(
                    "Channel({}) with ShortChanID {}: successfully added to router graph",
                    hex_str(&channel_id),
                    short_chan_id
                );

                // Give the caller a final update notifying them that the
                // channel is now open.
                if let Some(updates) = &flow.updates {
                    let _ = updates.send(OpenStatusUpdate::ChanOpen {
                        channel_point: funding_outpoint,
                    });
                }
                Ok(StepResult::Advanced)
            }

            // The channel is in the router graph but has not been announced
            // to the network. Once that is done the record is deleted, the
            // gossip layer persists queued announcements on its own.
            ChannelOpeningState::AddedToRouterGraph => {
                if !self.announce_after_confs(flow, short_chan_id)? {
                    return Ok(StepResult::Blocked);
                }

                self.store.delete_opening_state(&funding_outpoint)?;
                debug!(
                    "Channel({}) with ShortChanID {}: successfully announced",
                    hex_str(&channel_id),
                    short_chan_id
                );
                Ok(StepResult::Announced)
            }
        }
    }

    /// Sends a ChannelAnnouncement and a ChannelUpdate to the gossiper so
    /// the channel is added to the router's internal graph. These messages
    /// are not broadcast to the greater network, the proofs required for
    /// that are created and sent once the announcement depth is reached.
    fn add_to_router_graph(
        &mut self,
        flow: &mut OpeningFlow,
        short_chan_id: ShortChannelId,
    ) -> Result<(), Error> {
        let channel_id = flow.channel.channel_id();

        // The minimum HTLC we forward towards the peer was originally
        // dictated by it, but not necessarily as low as our own policy
        // wants to go.
        let fwd_min_htlc = flow
            .channel
            .local_constraints
            .htlc_minimum
            .max(self.config.default_routing_policy.min_htlc_out);

        // The maximum must stay within both the channel capacity and the
        // in-flight limit set by the peer.
        let capacity_msat = flow.channel.capacity * 1000;
        let fwd_max_htlc = flow
            .channel
            .local_constraints
            .max_value_in_flight
            .min(capacity_msat);

        let timestamp = self.next_update_timestamp(short_chan_id);
        let ann = announcement::new_chan_announcement(
            &self.signer,
            self.config.chain_hash,
            self.config.id_key,
            flow.channel.peer_id,
            flow.channel.local_basepoints.funding_pubkey,
            flow.channel.remote_basepoints.funding_pubkey,
            short_chan_id,
            channel_id,
            fwd_min_htlc,
            fwd_max_htlc,
            &self.config.default_routing_policy,
            timestamp,
        )?;

        self.send_to_gossip(
            FundingMessage::ChannelAnnouncement(ann.chan_ann),
            Some(flow.channel.capacity),
            Some(flow.channel.funding_outpoint),
        )?;
        self.send_to_gossip(FundingMessage::ChannelUpdate(ann.chan_update), None, None)?;

        Ok(())
    }

    /// Broadcasts the announcement proofs to the network once the funding
    /// transaction has the announcement depth. Private channels only send
    /// our node announcement directly to the peer so that no channel
    /// information leaks. Returns whether the step completed.
    fn announce_after_confs(
        &mut self,
        flow: &mut OpeningFlow,
        short_chan_id: ShortChannelId,
    ) -> Result<bool, Error> {
        if !flow.channel.should_announce() {
            debug!(
                "Will not announce private channel {}.",
                short_chan_id.to_u64()
            );

            let peer_id = flow.channel.peer_id;
            if !self.peers.is_online(&peer_id) {
                return Ok(false);
            }

            let node_ann = self.signer.node_announcement()?;
            debug!(
                "Sending our NodeAnnouncement for ChannelID({}) to {}",
                hex_str(&flow.channel.channel_id()),
                peer_id
            );
            self.peers
                .send_message(&peer_id, true, FundingMessage::NodeAnnouncement(node_ann))?;
            return Ok(true);
        }

        let num_confs = flow.channel.num_confs_required.max(ANNOUNCEMENT_MIN_CONFS) as u32;
        let funding_outpoint = flow.channel.funding_outpoint;
        let funding_script = flow.channel.funding_script();
        let confirmation = self.chain.tx_confirmation_info(
            &funding_outpoint.txid,
            &funding_script,
            flow.channel.funding_broadcast_height,
        )?;
        match confirmation {
            Some(confirmation) if confirmation.confirmations >= num_confs => {}
            _ => {
                debug!(
                    "Will announce channel {} after ChannelPoint({}) has gotten {} confirmations",
                    short_chan_id.to_u64(),
                    funding_outpoint,
                    num_confs
                );
                return Ok(false);
            }
        }

        info!(
            "Announcing ChannelPoint({}), short_chan_id={}",
            funding_outpoint, short_chan_id
        );

        // Only the channel announcement digest is of interest here, the
        // router graph already carries the policy values.
        let ann = announcement::new_chan_announcement(
            &self.signer,
            self.config.chain_hash,
            self.config.id_key,
            flow.channel.peer_id,
            flow.channel.local_basepoints.funding_pubkey,
            flow.channel.remote_basepoints.funding_pubkey,
            short_chan_id,
            flow.channel.channel_id(),
            0,
            0,
            &self.config.default_routing_policy,
            self.time.unix_time_now() as u32,
        )?;

        self.send_to_gossip(FundingMessage::AnnounceSignatures(ann.proof), None, None)?;

        // A node announcement is only accepted by the network once a
        // channel is known for the node, and this might be our first.
        let node_ann = self.signer.node_announcement()?;
        self.send_to_gossip(FundingMessage::NodeAnnouncement(node_ann), None, None)?;

        Ok(true)
    }

    fn send_to_gossip(
        &mut self,
        msg: FundingMessage,
        capacity: Option<u64>,
        funding_outpoint: Option<OutPoint>,
    ) -> Result<(), Error> {
        match self.gossip.send_announcement(msg, capacity, funding_outpoint) {
            Ok(()) => Ok(()),
            Err(GossipError::Outdated) | Err(GossipError::Ignored) => {
                debug!("Router rejected announcement as outdated or ignored");
                Ok(())
            }
            Err(GossipError::Other(s)) => Err(Error::Gossip(s)),
        }
    }

    /// The timestamp to place in the next channel update for the given
    /// channel, strictly greater than any update we previously issued in
    /// this direction.
    fn next_update_timestamp(&mut self, short_chan_id: ShortChannelId) -> u32 {
        let now = self.time.unix_time_now() as u32;
        let last = self
            .last_update_timestamps
            .entry(short_chan_id.to_u64())
            .or_insert(0);
        let timestamp = now.max(*last + 1);
        *last = timestamp;
        timestamp
    }

    /// Delivers timeout errors to peers that were offline when their
    /// channel was forgotten. Best effort, a single attempt is made once
    /// the peer is seen online.
    fn deliver_pending_peer_errors(&mut self) {
        let pending = std::mem::take(&mut self.pending_peer_errors);
        for (peer_id, temp_chan_id, data) in pending {
            if !self.peers.is_online(&peer_id) {
                self.pending_peer_errors.push((peer_id, temp_chan_id, data));
                continue;
            }
            let error_msg = ErrorMessage {
                channel_id: temp_chan_id,
                data,
            };
            if let Err(e) = self
                .peers
                .send_message(&peer_id, false, FundingMessage::Error(error_msg))
            {
                error!("unable to send error message to peer {}", e);
            }
        }
    }

    /// Fails the funding flow of reservations that have not been updated
    /// within the reservation timeout and are not locked waiting for
    /// funding.
    fn sweep_zombie_reservations(&mut self) {
        let now = self.time.unix_time_now();
        if now.saturating_sub(self.last_zombie_sweep) < self.config.zombie_sweep_interval {
            return;
        }
        self.last_zombie_sweep = now;

        let zombies = self
            .registry
            .collect_zombies(now, self.config.reservation_timeout);
        for (peer_id, temp_chan_id) in zombies {
            let err = Error::ReservationTimedOut(format!(
                "reservation timed out waiting for peer (peer_id:{}, chan_id:{})",
                peer_id,
                hex_str(&temp_chan_id)
            ));
            warn!("{}", err);
            self.fail_funding_flow(&peer_id, &temp_chan_id, err);
        }
    }
}
