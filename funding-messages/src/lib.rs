//! Data structures and functions related to peer communication during the
//! establishment of a payment channel.

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
extern crate lightning;
extern crate secp256k1;
#[macro_use]
pub mod ser_macros;
pub mod ser_impls;

#[cfg(feature = "serde")]
extern crate serde;

pub mod announcement_msgs;

use bitcoin::{BlockHash, OutPoint, ScriptBuf};
use lightning::ln::msgs::DecodeError;
use lightning::ln::wire::Type;
use lightning::util::ser::{Readable, Writeable, Writer};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use announcement_msgs::{
    AnnounceSignatures, ChannelAnnouncement, ChannelUpdate, NodeAnnouncement,
};

/// Type alias for a 32 byte channel id, either the temporary one generated
/// at the start of the funding flow, or the permanent one derived from the
/// funding outpoint.
pub type ChannelId = [u8; 32];

macro_rules! impl_type {
    ($const_name: ident, $type_name: ident, $type_val: expr) => {
        /// The type prefix for an [`$type_name`] message.
        pub const $const_name: u16 = $type_val;

        impl Type for $type_name {
            fn type_id(&self) -> u16 {
                $const_name
            }
        }
    };
}

impl_type!(ERROR_TYPE, ErrorMessage, 17);
impl_type!(OPEN_CHANNEL_TYPE, OpenChannel, 32);
impl_type!(ACCEPT_CHANNEL_TYPE, AcceptChannel, 33);
impl_type!(FUNDING_CREATED_TYPE, FundingCreated, 34);
impl_type!(FUNDING_SIGNED_TYPE, FundingSigned, 35);
impl_type!(FUNDING_LOCKED_TYPE, FundingLocked, 36);
impl_type!(CHANNEL_ANNOUNCEMENT_TYPE, ChannelAnnouncement, 256);
impl_type!(NODE_ANNOUNCEMENT_TYPE, NodeAnnouncement, 257);
impl_type!(CHANNEL_UPDATE_TYPE, ChannelUpdate, 258);
impl_type!(ANNOUNCE_SIGNATURES_TYPE, AnnounceSignatures, 259);

/// Derives the permanent channel id from the funding outpoint, by xoring the
/// lower two bytes of the funding transaction id with the output index.
pub fn channel_id_from_outpoint(outpoint: &OutPoint) -> ChannelId {
    use bitcoin::hashes::Hash;
    let mut res = outpoint.txid.to_byte_array();
    res[30] ^= ((outpoint.vout >> 8) & 0xff) as u8;
    res[31] ^= (outpoint.vout & 0xff) as u8;
    res
}

/// The compact identifier locating the funding output of a channel within
/// the blockchain, used in routing and gossip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ShortChannelId {
    /// The height of the block containing the funding transaction.
    pub block_height: u32,
    /// The index of the funding transaction within its block.
    pub tx_index: u32,
    /// The index of the funding output within the funding transaction.
    pub output_index: u16,
}

impl ShortChannelId {
    /// Packs the three components into a single integer, with the block
    /// height occupying the upper 3 bytes, the transaction index the
    /// following 3, and the output index the lower 2.
    pub fn to_u64(self) -> u64 {
        ((self.block_height as u64) << 40)
            | ((self.tx_index as u64) << 16)
            | (self.output_index as u64)
    }

    /// Unpacks a short channel id from its integer representation.
    pub fn from_u64(value: u64) -> Self {
        ShortChannelId {
            block_height: ((value >> 40) & 0xffffff) as u32,
            tx_index: ((value >> 16) & 0xffffff) as u32,
            output_index: (value & 0xffff) as u16,
        }
    }
}

impl std::fmt::Display for ShortChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.block_height, self.tx_index, self.output_index
        )
    }
}

impl Writeable for ShortChannelId {
    fn write<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
        self.to_u64().write(w)
    }
}

impl Readable for ShortChannelId {
    fn read<R: std::io::Read>(r: &mut R) -> Result<Self, DecodeError> {
        let value: u64 = Readable::read(r)?;
        Ok(ShortChannelId::from_u64(value))
    }
}

/// Feature bits a peer can signal, following the even/odd numbering
/// convention (odd bits are optional).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureBit {
    /// The peer can handle an upfront shutdown script committed at channel
    /// open.
    UpfrontShutdownScriptOptional = 5,
    /// The peer supports commitments with an untweaked remote output key.
    StaticRemoteKeyOptional = 13,
    /// The peer supports anchor outputs on commitment transactions.
    AnchorsOptional = 21,
}

/// A set of feature bits advertised by a peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct FeatureVector {
    bits: u64,
}

impl FeatureVector {
    /// Returns an empty feature vector.
    pub fn empty() -> Self {
        FeatureVector { bits: 0 }
    }

    /// Returns a feature vector with the given bits set.
    pub fn with_features(features: &[FeatureBit]) -> Self {
        let mut res = Self::empty();
        for feature in features {
            res.set(*feature);
        }
        res
    }

    /// Sets the given feature bit.
    pub fn set(&mut self, feature: FeatureBit) {
        self.bits |= 1 << (feature as u64);
    }

    /// Returns whether the given feature bit is set.
    pub fn has_feature(&self, feature: FeatureBit) -> bool {
        self.bits & (1 << (feature as u64)) != 0
    }
}

impl_funding_writeable!(FeatureVector, { (bits, writeable) });

/// The flag within [`OpenChannel::channel_flags`] indicating that the channel
/// should be announced to the wider network.
pub const FF_ANNOUNCE_CHANNEL: u8 = 1;

/// First message of the funding flow, sent by the party funding the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct OpenChannel {
    /// The genesis hash of the chain the channel is to be opened on.
    pub chain_hash: BlockHash,
    /// Identifier for the channel until the funding outpoint is known.
    pub temporary_channel_id: ChannelId,
    /// The total channel capacity provided by the initiator, in satoshis.
    pub funding_amount: u64,
    /// Amount gifted to the receiving node as part of the first commitment,
    /// in millisatoshis.
    pub push_amount: u64,
    /// Threshold below which the receiving node will not create outputs on
    /// its commitment, in satoshis.
    pub dust_limit: u64,
    /// Maximum total value of outstanding HTLCs offered to the sender, in
    /// millisatoshis.
    pub max_value_in_flight: u64,
    /// Amount the receiving node must keep unencumbered on its side of the
    /// channel, in satoshis.
    pub channel_reserve: u64,
    /// Smallest HTLC the sender will accept, in millisatoshis.
    pub htlc_minimum: u64,
    /// Fee rate for the commitment transaction, in satoshis per 1000 weight.
    pub fee_per_kw: u32,
    /// Relative timelock the receiving node must wait before unilaterally
    /// claiming its funds.
    pub csv_delay: u16,
    /// Maximum number of HTLCs the receiving node can offer concurrently.
    pub max_accepted_htlcs: u16,
    /// The sender's key in the 2-of-2 funding output.
    pub funding_pubkey: PublicKey,
    /// Basepoint used to derive revocation keys.
    pub revocation_point: PublicKey,
    /// Basepoint used to derive payment keys.
    pub payment_point: PublicKey,
    /// Basepoint used to derive delayed payment keys.
    pub delayed_payment_point: PublicKey,
    /// Basepoint used to derive HTLC keys.
    pub htlc_point: PublicKey,
    /// Commitment point for the first commitment transaction.
    pub first_commitment_point: PublicKey,
    /// Channel opening flags, see [`FF_ANNOUNCE_CHANNEL`].
    pub channel_flags: u8,
    /// Script to which cooperative close funds must be paid, if committed
    /// upfront.
    pub upfront_shutdown_script: Option<ScriptBuf>,
}

impl_funding_writeable!(OpenChannel, {
    (chain_hash, writeable),
    (temporary_channel_id, writeable),
    (funding_amount, writeable),
    (push_amount, writeable),
    (dust_limit, writeable),
    (max_value_in_flight, writeable),
    (channel_reserve, writeable),
    (htlc_minimum, writeable),
    (fee_per_kw, writeable),
    (csv_delay, writeable),
    (max_accepted_htlcs, writeable),
    (funding_pubkey, writeable),
    (revocation_point, writeable),
    (payment_point, writeable),
    (delayed_payment_point, writeable),
    (htlc_point, writeable),
    (first_commitment_point, writeable),
    (channel_flags, writeable),
    (upfront_shutdown_script, option)
});

/// Second message of the funding flow, the response of the receiving node to
/// an [`OpenChannel`] it is willing to enter.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct AcceptChannel {
    /// Identifier mirrored from the [`OpenChannel`] message.
    pub temporary_channel_id: ChannelId,
    /// Threshold below which the sending node will not create outputs on its
    /// commitment, in satoshis.
    pub dust_limit: u64,
    /// Maximum total value of outstanding HTLCs offered to the sender, in
    /// millisatoshis.
    pub max_value_in_flight: u64,
    /// Amount the initiator must keep unencumbered on its side of the
    /// channel, in satoshis.
    pub channel_reserve: u64,
    /// Smallest HTLC the sender will accept, in millisatoshis.
    pub htlc_minimum: u64,
    /// Number of confirmations the sender requires before considering the
    /// channel open.
    pub min_accept_depth: u32,
    /// Relative timelock the initiator must wait before unilaterally
    /// claiming its funds.
    pub csv_delay: u16,
    /// Maximum number of HTLCs the initiator can offer concurrently.
    pub max_accepted_htlcs: u16,
    /// The sender's key in the 2-of-2 funding output.
    pub funding_pubkey: PublicKey,
    /// Basepoint used to derive revocation keys.
    pub revocation_point: PublicKey,
    /// Basepoint used to derive payment keys.
    pub payment_point: PublicKey,
    /// Basepoint used to derive delayed payment keys.
    pub delayed_payment_point: PublicKey,
    /// Basepoint used to derive HTLC keys.
    pub htlc_point: PublicKey,
    /// Commitment point for the first commitment transaction.
    pub first_commitment_point: PublicKey,
    /// Script to which cooperative close funds must be paid, if committed
    /// upfront.
    pub upfront_shutdown_script: Option<ScriptBuf>,
}

impl_funding_writeable!(AcceptChannel, {
    (temporary_channel_id, writeable),
    (dust_limit, writeable),
    (max_value_in_flight, writeable),
    (channel_reserve, writeable),
    (htlc_minimum, writeable),
    (min_accept_depth, writeable),
    (csv_delay, writeable),
    (max_accepted_htlcs, writeable),
    (funding_pubkey, writeable),
    (revocation_point, writeable),
    (payment_point, writeable),
    (delayed_payment_point, writeable),
    (htlc_point, writeable),
    (first_commitment_point, writeable),
    (upfront_shutdown_script, option)
});

/// Third message of the funding flow, sent by the initiator once the funding
/// transaction has been built and its version of the commitment transaction
/// signed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct FundingCreated {
    /// Identifier mirrored from the [`OpenChannel`] message.
    pub temporary_channel_id: ChannelId,
    /// The outpoint of the 2-of-2 funding output.
    pub funding_outpoint: OutPoint,
    /// The initiator's signature over the receiving node's first commitment
    /// transaction.
    pub commit_sig: Signature,
}

impl_funding_writeable!(FundingCreated, {
    (temporary_channel_id, writeable),
    (funding_outpoint, writeable),
    (commit_sig, writeable)
});

/// Fourth message of the funding flow, sent by the receiving node. After
/// this message the initiator can safely broadcast the funding transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct FundingSigned {
    /// The permanent channel id derived from the funding outpoint.
    pub channel_id: ChannelId,
    /// The sender's signature over the initiator's first commitment
    /// transaction.
    pub commit_sig: Signature,
}

impl_funding_writeable!(FundingSigned, {
    (channel_id, writeable),
    (commit_sig, writeable)
});

/// Message exchanged once the funding transaction has reached the required
/// confirmation depth, delivering the next commitment point and enabling
/// channel operation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct FundingLocked {
    /// The permanent channel id derived from the funding outpoint.
    pub channel_id: ChannelId,
    /// The commitment point for the next commitment transaction of the
    /// sender.
    pub next_per_commitment_point: PublicKey,
}

impl_funding_writeable!(FundingLocked, {
    (channel_id, writeable),
    (next_per_commitment_point, writeable)
});

/// An error tied to a specific channel, aborting the funding flow for it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ErrorMessage {
    /// The channel the error relates to, temporary or permanent.
    pub channel_id: ChannelId,
    /// Human readable error data.
    pub data: String,
}

impl_funding_writeable!(ErrorMessage, {
    (channel_id, writeable),
    (data, string)
});

/// All messages handled by the funding protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum FundingMessage {
    /// Request to open a channel.
    Open(OpenChannel),
    /// Response to an open channel request.
    Accept(AcceptChannel),
    /// Funding transaction built, commitment signed by the initiator.
    Created(FundingCreated),
    /// Commitment signed by the receiving node.
    Signed(FundingSigned),
    /// Funding transaction confirmed, channel operational.
    FundingLocked(FundingLocked),
    /// Funding flow aborted.
    Error(ErrorMessage),
    /// Existence proof of a channel, broadcast over gossip.
    ChannelAnnouncement(ChannelAnnouncement),
    /// Directional routing policy for a channel, broadcast over gossip.
    ChannelUpdate(ChannelUpdate),
    /// Signatures over the channel announcement, broadcast over gossip.
    AnnounceSignatures(AnnounceSignatures),
    /// Announcement of a node, broadcast over gossip.
    NodeAnnouncement(NodeAnnouncement),
}

impl FundingMessage {
    /// The wire type id of the wrapped message.
    pub fn type_id(&self) -> u16 {
        match self {
            FundingMessage::Open(m) => m.type_id(),
            FundingMessage::Accept(m) => m.type_id(),
            FundingMessage::Created(m) => m.type_id(),
            FundingMessage::Signed(m) => m.type_id(),
            FundingMessage::FundingLocked(m) => m.type_id(),
            FundingMessage::Error(m) => m.type_id(),
            FundingMessage::ChannelAnnouncement(m) => m.type_id(),
            FundingMessage::ChannelUpdate(m) => m.type_id(),
            FundingMessage::AnnounceSignatures(m) => m.type_id(),
            FundingMessage::NodeAnnouncement(m) => m.type_id(),
        }
    }
}

impl Writeable for FundingMessage {
    fn write<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
        self.type_id().write(w)?;
        match self {
            FundingMessage::Open(m) => m.write(w),
            FundingMessage::Accept(m) => m.write(w),
            FundingMessage::Created(m) => m.write(w),
            FundingMessage::Signed(m) => m.write(w),
            FundingMessage::FundingLocked(m) => m.write(w),
            FundingMessage::Error(m) => m.write(w),
            FundingMessage::ChannelAnnouncement(m) => m.write(w),
            FundingMessage::ChannelUpdate(m) => m.write(w),
            FundingMessage::AnnounceSignatures(m) => m.write(w),
            FundingMessage::NodeAnnouncement(m) => m.write(w),
        }
    }
}

impl Readable for FundingMessage {
    fn read<R: std::io::Read>(r: &mut R) -> Result<Self, DecodeError> {
        let type_id: u16 = Readable::read(r)?;
        let msg = match type_id {
            OPEN_CHANNEL_TYPE => FundingMessage::Open(Readable::read(r)?),
            ACCEPT_CHANNEL_TYPE => FundingMessage::Accept(Readable::read(r)?),
            FUNDING_CREATED_TYPE => FundingMessage::Created(Readable::read(r)?),
            FUNDING_SIGNED_TYPE => FundingMessage::Signed(Readable::read(r)?),
            FUNDING_LOCKED_TYPE => FundingMessage::FundingLocked(Readable::read(r)?),
            ERROR_TYPE => FundingMessage::Error(Readable::read(r)?),
            CHANNEL_ANNOUNCEMENT_TYPE => FundingMessage::ChannelAnnouncement(Readable::read(r)?),
            CHANNEL_UPDATE_TYPE => FundingMessage::ChannelUpdate(Readable::read(r)?),
            ANNOUNCE_SIGNATURES_TYPE => FundingMessage::AnnounceSignatures(Readable::read(r)?),
            NODE_ANNOUNCEMENT_TYPE => FundingMessage::NodeAnnouncement(Readable::read(r)?),
            _ => return Err(DecodeError::UnknownRequiredFeature),
        };
        Ok(msg)
    }
}
