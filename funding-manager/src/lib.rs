//! # Library providing data structures and functions supporting the
//! negotiation, establishment and announcement of payment channels.

#![crate_name = "funding_manager"]
// Coding conventions
#![forbid(unsafe_code)]
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(missing_docs)]

extern crate bitcoin;
extern crate funding_messages;
extern crate lightning;
extern crate log;
extern crate rand_chacha;
extern crate secp256k1;

pub mod config;
pub mod error;
pub mod manager;
pub mod opening;

mod announcement;
mod handshake;
mod reservation;

use std::sync::mpsc::Sender;

use bitcoin::{Address, BlockHash, OutPoint, ScriptBuf, Transaction, Txid};
use error::Error;
use funding_messages::announcement_msgs::NodeAnnouncement;
use funding_messages::{
    channel_id_from_outpoint, FeatureVector, FundingMessage, OpenChannel, ShortChannelId,
};
use lightning::ln::chan_utils::{build_commitment_secret, make_funding_redeemscript};
use opening::ChannelOpeningState;
use secp256k1::ecdsa::Signature;
use secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};

pub use funding_messages::ChannelId;

/// The highest commitment number, from which per-commitment secrets are
/// derived counting downwards.
pub const INITIAL_COMMITMENT_NUMBER: u64 = (1 << 48) - 1;

/// Time trait to provide current unix time. Mainly defined to facilitate
/// testing.
pub trait Time {
    /// Must return the unix epoch corresponding to the current time.
    fn unix_time_now(&self) -> u64;
}

/// Provide current time through `SystemTime`.
pub struct SystemTimeProvider {}

impl Time for SystemTimeProvider {
    fn unix_time_now(&self) -> u64 {
        let now = std::time::SystemTime::now();
        now.duration_since(std::time::UNIX_EPOCH)
            .expect("Unexpected time error")
            .as_secs()
    }
}

/// The format of the commitment transactions of a channel, negotiated from
/// the feature bits both peers advertise and fixed at reservation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitmentType {
    /// The original commitment format with a tweaked to-remote key.
    Legacy,
    /// Commitments paying to a static remote key.
    Tweakless,
    /// Commitments carrying anchor outputs, implying tweakless.
    Anchors,
}

/// Limits a party requires on the commitment transactions of the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConstraints {
    /// Threshold below which no output should be created, in satoshis.
    pub dust_limit: u64,
    /// Amount that must be kept unencumbered by the party, in satoshis.
    pub channel_reserve: u64,
    /// Maximum total value of outstanding HTLCs, in millisatoshis.
    pub max_value_in_flight: u64,
    /// Smallest HTLC that may be offered, in millisatoshis.
    pub htlc_minimum: u64,
    /// Maximum number of concurrently offered HTLCs.
    pub max_accepted_htlcs: u16,
    /// Relative timelock on the party's own commitment outputs.
    pub csv_delay: u16,
}

/// The set of basepoints a party contributes to a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelBasepoints {
    /// Key of the party in the 2-of-2 funding output.
    pub funding_pubkey: PublicKey,
    /// Basepoint used to derive revocation keys.
    pub revocation: PublicKey,
    /// Basepoint used to derive payment keys.
    pub payment: PublicKey,
    /// Basepoint used to derive delayed payment keys.
    pub delayed_payment: PublicKey,
    /// Basepoint used to derive HTLC keys.
    pub htlc: PublicKey,
}

/// Our half of the channel parameters, supplied by the wallet reservation.
#[derive(Clone, Debug)]
pub struct ChannelContribution {
    /// The amount we fund the channel with, in satoshis.
    pub funding_amount: u64,
    /// Our basepoints.
    pub basepoints: ChannelBasepoints,
    /// Our commitment point for the first commitment transaction.
    pub first_commitment_point: PublicKey,
    /// The dust limit we enforce on our own commitment, in satoshis.
    pub dust_limit: u64,
    /// The shutdown script we committed to, if any.
    pub upfront_shutdown: Option<ScriptBuf>,
}

/// The counterparty's half of the channel parameters, extracted from its
/// `Open` or `Accept` message together with the constraints we require of it.
#[derive(Clone, Debug)]
pub struct RemoteContribution {
    /// The amount the counterparty funds the channel with, in satoshis.
    pub funding_amount: u64,
    /// The counterparty's basepoints.
    pub basepoints: ChannelBasepoints,
    /// The counterparty's first commitment point.
    pub first_commitment_point: PublicKey,
    /// The constraints applying to the counterparty's commitment.
    pub constraints: ChannelConstraints,
    /// The shutdown script the counterparty committed to, if any.
    pub upfront_shutdown: Option<ScriptBuf>,
}

/// Parameters for the wallet to create a new channel reservation.
#[derive(Clone, Debug)]
pub struct InitFundingRequest {
    /// The genesis hash of the chain to open the channel on.
    pub chain_hash: BlockHash,
    /// The temporary id tracking the reservation through the handshake.
    pub temporary_channel_id: ChannelId,
    /// The identity key of the counterparty.
    pub peer_id: PublicKey,
    /// The amount we contribute, in satoshis. Zero when responding.
    pub local_amount: u64,
    /// The amount the counterparty contributes, in satoshis.
    pub remote_amount: u64,
    /// Fee rate for the commitment transaction, in sat per 1000 weight.
    pub commit_fee_per_kw: u32,
    /// Fee rate for the funding transaction, in sat per 1000 weight. Zero
    /// lets the wallet pick.
    pub funding_fee_per_kw: u32,
    /// Amount pushed to the counterparty, in millisatoshis.
    pub push_msat: u64,
    /// Channel opening flags.
    pub channel_flags: u8,
    /// Number of confirmations required on the inputs funding the channel.
    pub min_confs: u32,
    /// Whether fees are taken from the funding amount.
    pub subtract_fees: bool,
    /// The negotiated commitment format.
    pub commitment_type: CommitmentType,
}

/// Progress of an externally funded (PSBT) reservation.
#[derive(Clone, Debug)]
pub enum PsbtState {
    /// The reservation is funded by the wallet itself.
    NotRequired,
    /// The reservation waits for an external party to fund and sign the
    /// PSBT spending to the funding output.
    AwaitingFunding {
        /// The address of the funding output.
        funding_address: Address,
        /// The expected value of the funding output, in satoshis.
        funding_amount: u64,
        /// The serialized draft PSBT to fund.
        psbt: Vec<u8>,
    },
    /// The final signed PSBT has been verified and handed to the wallet.
    Ready,
    /// The user gave up on the funding flow.
    UserCanceled,
    /// The counterparty gave up on the funding flow.
    RemoteCanceled,
}

/// An in-flight channel reservation within the wallet. The reservation holds
/// the coins committed to the funding output and progresses through the
/// contribution of both parties up to the fully signed funding transaction.
pub trait ChannelReservation {
    /// Records the number of confirmations required before the channel is
    /// considered open.
    fn set_num_confs_required(&mut self, num_confs: u16);
    /// Validates and applies the constraints the counterparty dictates for
    /// our commitment transaction.
    fn commit_constraints(
        &mut self,
        constraints: &ChannelConstraints,
        max_local_csv: u16,
    ) -> Result<(), Error>;
    /// Commits the shutdown script cooperative close payouts must pay to.
    fn set_our_upfront_shutdown(&mut self, script: Option<ScriptBuf>);
    /// Our half of the channel parameters.
    fn our_contribution(&self) -> ChannelContribution;
    /// Processes the counterparty's contribution on the funding side,
    /// building and signing both the funding transaction and the commitment
    /// transactions. Returns [`Error::PsbtFundingRequired`] if the
    /// reservation awaits externally assembled funding.
    fn process_contribution(&mut self, remote: RemoteContribution) -> Result<(), Error>;
    /// Processes the counterparty's contribution on the responding side,
    /// where we commit no funds of our own.
    fn process_single_contribution(&mut self, remote: RemoteContribution) -> Result<(), Error>;
    /// Continues a reservation parked on PSBT funding once the signed PSBT
    /// has been verified.
    fn process_psbt(&mut self) -> Result<(), Error>;
    /// The outpoint of the funding output, known on the funding side once
    /// the counterparty's contribution has been processed.
    fn funding_outpoint(&self) -> Result<OutPoint, Error>;
    /// Our signature over the counterparty's version of the commitment
    /// transaction.
    fn our_signatures(&self) -> Result<Signature, Error>;
    /// Verifies the counterparty's commitment signature and finalizes the
    /// reservation on the funding side. The channel is recorded as pending
    /// in the channel database.
    fn complete_reservation(&mut self, their_commit_sig: &Signature)
        -> Result<FundedChannel, Error>;
    /// Verifies the counterparty's commitment signature and finalizes the
    /// reservation on the responding side, recording the channel as pending
    /// in the channel database.
    fn complete_reservation_single(
        &mut self,
        funding_outpoint: &OutPoint,
        their_commit_sig: &Signature,
    ) -> Result<FundedChannel, Error>;
    /// Aborts the reservation, releasing any coins locked for it.
    fn cancel(&mut self) -> Result<(), Error>;
    /// The total capacity of the channel being reserved, in satoshis.
    fn capacity(&self) -> u64;
    /// Whether the reservation is funded through an externally assembled
    /// PSBT.
    fn is_psbt(&self) -> bool;
    /// Whether the reservation was pre-registered by the operator, exempting
    /// it from the pending channel limit.
    fn is_canned_shim(&self) -> bool;
    /// Progress of the external funding of this reservation.
    fn psbt_state(&self) -> PsbtState;
    /// Records that the counterparty aborted the flow, so that a parked PSBT
    /// funding state resolves as remotely canceled.
    fn mark_remote_canceled(&mut self);
}

/// Wallet trait handling the parts of the funding process that move funds
/// from on-chain outputs into channels.
pub trait Wallet {
    /// Attempts to reserve the funds and keys for a new channel.
    fn init_channel_reservation(
        &self,
        request: &InitFundingRequest,
    ) -> Result<Box<dyn ChannelReservation>, Error>;
    /// Returns a script paying to a fresh wallet address, for use as an
    /// upfront shutdown script.
    fn new_shutdown_script(&self) -> Result<ScriptBuf, Error>;
    /// Whether the wallet view of the chain is current.
    fn is_synced(&self) -> Result<bool, Error>;
    /// Verifies that the confirmed funding transaction pays to the expected
    /// funding script of the channel.
    fn validate_channel(&self, channel: &FundedChannel, funding_tx: &Transaction)
        -> Result<(), Error>;
    /// Broadcasts a transaction to the network, tagging it with the given
    /// label. Publishing a transaction that is already known to the network
    /// is not an error.
    fn publish_transaction(&self, tx: &Transaction, label: &str) -> Result<(), Error>;
    /// Overwrites the label of a wallet transaction.
    fn update_transaction_label(&self, txid: &Txid, label: &str) -> Result<(), Error>;
}

/// A confirmed transaction together with its location in the chain.
#[derive(Clone, Debug)]
pub struct TxConfirmation {
    /// The height of the block including the transaction.
    pub block_height: u32,
    /// The index of the transaction within its block.
    pub tx_index: u32,
    /// The number of confirmations the transaction has.
    pub confirmations: u32,
    /// The confirmed transaction.
    pub tx: Transaction,
}

/// Access to confirmation and block height information from the chain.
pub trait ChainNotifier {
    /// The current best block height.
    fn best_height(&self) -> Result<u32, Error>;
    /// Looks up the confirmation status of the transaction paying to the
    /// given script, searching from the given height. Returns `None` while
    /// the transaction is unconfirmed.
    fn tx_confirmation_info(
        &self,
        txid: &Txid,
        script: &ScriptBuf,
        from_height: u32,
    ) -> Result<Option<TxConfirmation>, Error>;
    /// The largest confirmation depth the notifier can track.
    fn max_supported_confs(&self) -> u32;
}

/// Storage for the per-channel opening state, keyed by funding outpoint.
/// Records are created on first confirmation, advanced forward only, and
/// deleted once the channel has been announced.
pub trait Storage {
    /// Atomically writes the opening state and short channel id for the
    /// given funding outpoint.
    fn save_opening_state(
        &self,
        funding_outpoint: &OutPoint,
        state: ChannelOpeningState,
        short_channel_id: ShortChannelId,
    ) -> Result<(), Error>;
    /// Reads back the opening state for the given funding outpoint, or
    /// `None` if the channel is not in an opening state.
    fn get_opening_state(
        &self,
        funding_outpoint: &OutPoint,
    ) -> Result<Option<(ChannelOpeningState, ShortChannelId)>, Error>;
    /// Deletes the opening state for the given funding outpoint.
    fn delete_opening_state(&self, funding_outpoint: &OutPoint) -> Result<(), Error>;
    /// Lists all stored opening states.
    fn all_opening_states(
        &self,
    ) -> Result<Vec<(OutPoint, ChannelOpeningState, ShortChannelId)>, Error>;
}

/// The reason a channel was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The channel was closed cooperatively.
    CooperativeClose,
    /// The channel was force closed by the local party.
    LocalForceClose,
    /// The channel was force closed by the remote party.
    RemoteForceClose,
    /// The funding flow was abandoned before the funding transaction
    /// confirmed.
    FundingCanceled,
}

/// Summary of a closed channel, recorded in the channel database.
#[derive(Clone, Debug)]
pub struct ChannelCloseSummary {
    /// The outpoint that anchored the channel on chain.
    pub funding_outpoint: OutPoint,
    /// The identity key of the counterparty.
    pub peer_id: PublicKey,
    /// The total capacity of the channel, in satoshis.
    pub capacity: u64,
    /// The balance returned to us, in satoshis.
    pub settled_balance: u64,
    /// Why the channel was closed.
    pub close_reason: CloseReason,
}

/// The channel database, owning the records of all channels this node takes
/// part in.
pub trait ChannelDatabase {
    /// All channels, pending or open.
    fn fetch_all_channels(&self) -> Result<Vec<FundedChannel>, Error>;
    /// Channels whose funding transaction has not yet reached its required
    /// confirmation depth.
    fn fetch_pending_channels(&self) -> Result<Vec<FundedChannel>, Error>;
    /// All channels with the given peer.
    fn fetch_open_channels(&self, peer_id: &PublicKey) -> Result<Vec<FundedChannel>, Error>;
    /// Looks up a channel by its permanent channel id.
    fn find_channel(&self, channel_id: &ChannelId) -> Result<Option<FundedChannel>, Error>;
    /// Flips the channel out of the pending state and records its location
    /// in the chain.
    fn mark_channel_open(
        &self,
        channel_id: &ChannelId,
        short_channel_id: ShortChannelId,
    ) -> Result<(), Error>;
    /// Replaces the channel record with a closed channel summary.
    fn close_channel(&self, summary: &ChannelCloseSummary) -> Result<(), Error>;
    /// Stores the commitment point the counterparty will use for its next
    /// commitment transaction.
    fn insert_next_revocation(
        &self,
        channel_id: &ChannelId,
        point: PublicKey,
    ) -> Result<(), Error>;
}

/// Access to the messaging layer towards peers.
pub trait PeerMessenger {
    /// Sends a message to the given peer, optionally flushing the
    /// connection.
    fn send_message(&self, peer_id: &PublicKey, flush: bool, msg: FundingMessage)
        -> Result<(), Error>;
    /// Whether the peer currently has an active connection.
    fn is_online(&self, peer_id: &PublicKey) -> bool;
    /// The features we advertised to the given peer.
    fn local_features(&self, peer_id: &PublicKey) -> FeatureVector;
    /// The features the given peer advertised to us.
    fn remote_features(&self, peer_id: &PublicKey) -> FeatureVector;
    /// Hands a fully established channel over to the peer's channel
    /// machinery, allowing HTLC traffic on it.
    fn add_new_channel(&self, peer_id: &PublicKey, channel: &FundedChannel) -> Result<(), Error>;
}

/// An error returned by the gossip subsystem for a submitted announcement.
#[derive(Clone, Debug)]
pub enum GossipError {
    /// A newer equivalent announcement is already known.
    Outdated,
    /// The announcement was dropped by policy.
    Ignored,
    /// The announcement could not be processed.
    Other(String),
}

impl std::fmt::Display for GossipError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            GossipError::Outdated => write!(f, "outdated announcement"),
            GossipError::Ignored => write!(f, "ignored announcement"),
            GossipError::Other(ref s) => write!(f, "{}", s),
        }
    }
}

/// The gossip subsystem, accepting announcements for network wide broadcast.
pub trait GossipSender {
    /// Submits an announcement message, together with optional graph
    /// information not carried in the message itself.
    fn send_announcement(
        &self,
        msg: FundingMessage,
        capacity: Option<u64>,
        funding_outpoint: Option<OutPoint>,
    ) -> Result<(), GossipError>;
}

/// External predicate consulted before accepting an inbound channel.
pub trait ChannelAcceptor {
    /// Whether the channel proposed by the given node should be accepted.
    fn accept(&self, peer_id: &PublicKey, msg: &OpenChannel) -> bool;
}

/// Signs gossip messages with keys held by the node.
pub trait MessageSigner {
    /// Signs the double-SHA256 digest of the given message with the private
    /// key behind the given public key.
    fn sign_message(&self, pubkey: &PublicKey, msg: &[u8]) -> Result<Signature, Error>;
    /// The latest fully signed announcement of this node.
    fn node_announcement(&self) -> Result<NodeAnnouncement, Error>;
}

/// Receives notifications about channels changing state.
pub trait ChannelEventNotifier {
    /// A channel entered the pending open state.
    fn notify_pending_open(&self, funding_outpoint: &OutPoint, channel: &FundedChannel);
    /// A channel transitioned from pending open to open.
    fn notify_open(&self, funding_outpoint: &OutPoint);
    /// Instructs interested subsystems to reload the short channel id of a
    /// formerly pending channel.
    fn report_short_channel_id(&self, funding_outpoint: &OutPoint) -> Result<(), Error>;
}

/// A channel anchored on chain, as recorded in the channel database.
#[derive(Clone, Debug)]
pub struct FundedChannel {
    /// The outpoint of the 2-of-2 funding output.
    pub funding_outpoint: OutPoint,
    /// The id that tracked the channel during the handshake.
    pub temporary_channel_id: ChannelId,
    /// The identity key of the counterparty.
    pub peer_id: PublicKey,
    /// The total channel capacity, in satoshis.
    pub capacity: u64,
    /// Our balance at opening, in satoshis.
    pub local_balance: u64,
    /// The counterparty balance at opening, in satoshis.
    pub remote_balance: u64,
    /// Whether we funded the channel.
    pub is_initiator: bool,
    /// Whether the funding transaction still awaits its required
    /// confirmation depth.
    pub is_pending: bool,
    /// Channel opening flags, see
    /// [`funding_messages::FF_ANNOUNCE_CHANNEL`].
    pub channel_flags: u8,
    /// Confirmations required before the channel is considered open.
    pub num_confs_required: u16,
    /// The best height when the funding transaction was broadcast.
    pub funding_broadcast_height: u32,
    /// The funding transaction, held only by the initiator and only when
    /// the wallet assembled it.
    pub funding_tx: Option<Transaction>,
    /// Our basepoints.
    pub local_basepoints: ChannelBasepoints,
    /// The counterparty's basepoints.
    pub remote_basepoints: ChannelBasepoints,
    /// The constraints applying to our commitment.
    pub local_constraints: ChannelConstraints,
    /// The constraints applying to the counterparty's commitment.
    pub remote_constraints: ChannelConstraints,
    /// The negotiated commitment format.
    pub commitment_type: CommitmentType,
    /// Seed from which our per-commitment secrets are derived.
    pub commitment_seed: [u8; 32],
    /// The commitment point the counterparty will use for its next
    /// commitment transaction, known once its `FundingLocked` arrives.
    pub remote_next_revocation: Option<PublicKey>,
    /// Height before which the channel may not be cooperatively closed.
    /// Non-zero only for channels created through a funding shim.
    pub thaw_height: u32,
    /// The location of the funding output in the chain, known once the
    /// funding transaction confirmed.
    pub short_channel_id: Option<ShortChannelId>,
}

impl FundedChannel {
    /// The permanent channel id derived from the funding outpoint.
    pub fn channel_id(&self) -> ChannelId {
        channel_id_from_outpoint(&self.funding_outpoint)
    }

    /// Whether the channel should be announced to the wider network.
    pub fn should_announce(&self) -> bool {
        self.channel_flags & funding_messages::FF_ANNOUNCE_CHANNEL != 0
    }

    /// Re-creates the script of the funding output.
    pub fn funding_script(&self) -> ScriptBuf {
        make_funding_redeemscript(
            &self.local_basepoints.funding_pubkey,
            &self.remote_basepoints.funding_pubkey,
        )
        .to_v0_p2wsh()
    }

    /// The commitment point for our next commitment transaction, presented
    /// to the counterparty in our `FundingLocked`.
    pub fn next_revocation_point<C: Signing>(&self, secp: &Secp256k1<C>) -> PublicKey {
        let secret = build_commitment_secret(
            &self.commitment_seed,
            INITIAL_COMMITMENT_NUMBER - 1,
        );
        let secret_key =
            SecretKey::from_slice(&secret).expect("to have generated a valid secret key.");
        PublicKey::from_secret_key(secp, &secret_key)
    }
}

/// Description of a channel still waiting for its funding transaction to
/// confirm, as returned by queries.
#[derive(Clone, Debug)]
pub struct PendingChannelSummary {
    /// The identity key of the counterparty.
    pub identity_pubkey: PublicKey,
    /// The outpoint of the funding output.
    pub funding_outpoint: OutPoint,
    /// The total channel capacity, in satoshis.
    pub capacity: u64,
    /// Our balance at opening, in satoshis.
    pub local_balance: u64,
    /// The counterparty balance at opening, in satoshis.
    pub remote_balance: u64,
}

/// Progress updates streamed to the caller that initiated a channel opening.
#[derive(Clone, Debug)]
pub enum OpenStatusUpdate {
    /// The reservation awaits an externally funded PSBT paying to the
    /// given address.
    PsbtFund {
        /// The address of the funding output.
        funding_address: Address,
        /// The expected value of the funding output, in satoshis.
        funding_amount: u64,
        /// The serialized draft PSBT to fund.
        psbt: Vec<u8>,
    },
    /// The funding transaction has been broadcast.
    ChanPending {
        /// The funding transaction id.
        txid: Txid,
        /// The index of the funding output.
        output_index: u32,
    },
    /// The channel is open and has been added to the router graph.
    ChanOpen {
        /// The outpoint anchoring the channel.
        channel_point: OutPoint,
    },
}

/// A request to initiate the funding workflow with a remote peer.
pub struct OpenChannelRequest {
    /// The identity key of the peer to open the channel with.
    pub peer_id: PublicKey,
    /// The amount we commit to the channel, in satoshis.
    pub local_amount: u64,
    /// Amount pushed to the counterparty, in millisatoshis.
    pub push_msat: u64,
    /// Smallest incoming HTLC we accept, in millisatoshis. Zero uses the
    /// configured default.
    pub min_htlc_in: u64,
    /// CSV delay required of the counterparty. Zero derives it from the
    /// channel capacity.
    pub remote_csv_delay: u16,
    /// Maximum value in flight allowed to the counterparty, in
    /// millisatoshis. Zero derives it from the channel capacity.
    pub max_value_in_flight: u64,
    /// Maximum number of HTLCs the counterparty can offer. Zero derives it
    /// from the channel capacity.
    pub max_htlcs: u16,
    /// Upper bound on the CSV delay we accept for our own commitment
    /// outputs. Zero uses the configured default.
    pub max_local_csv: u16,
    /// Confirmations required on the coins funding the channel.
    pub min_confs: u32,
    /// Whether the channel should be withheld from gossip.
    pub private: bool,
    /// Whether fees are taken from the funding amount.
    pub subtract_fees: bool,
    /// Fee rate for the funding transaction, in sat per 1000 weight. Zero
    /// lets the wallet pick.
    pub funding_fee_per_kw: u32,
    /// Script that cooperative close payouts must pay to, if the peer
    /// supports committing to it upfront.
    pub shutdown_script: Option<ScriptBuf>,
    /// Identifier for the reservation, generated when absent.
    pub pending_channel_id: Option<ChannelId>,
    /// Sink receiving progress updates for this opening.
    pub updates: Sender<OpenStatusUpdate>,
    /// Sink receiving the failure reason if the flow aborts.
    pub errors: Sender<Error>,
}
