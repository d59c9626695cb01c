//! Messages used to advertise a newly opened channel and its routing policy
//! to the gossip layer.

use bitcoin::BlockHash;
use lightning::ln::msgs::DecodeError;
use lightning::util::ser::{Readable, Writeable, Writer};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use crate::{ChannelId, FeatureVector, ShortChannelId};

/// The flag within [`ChannelUpdate::message_flags`] indicating that the
/// `htlc_maximum_msat` field is meaningful.
pub const CHAN_UPDATE_OPTION_MAX_HTLC: u8 = 1;

/// The flag within [`ChannelUpdate::channel_flags`] carrying the direction
/// of the update: 0 if the update is from the node whose serialized identity
/// key orders first, 1 otherwise.
pub const CHAN_UPDATE_DIRECTION: u8 = 1;

/// Proof of the existence of a channel, binding the funding keys and the
/// identity keys of both endpoints. The node and bitcoin keys are ordered by
/// the lexicographic order of the serialized node identity keys, so that
/// every observer derives the same announcement for a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ChannelAnnouncement {
    /// The genesis hash of the chain the channel was opened on.
    pub chain_hash: BlockHash,
    /// The location of the funding output within the blockchain.
    pub short_channel_id: ShortChannelId,
    /// Features required to route through this channel.
    pub features: FeatureVector,
    /// Identity key of the first node.
    pub node_id_1: PublicKey,
    /// Identity key of the second node.
    pub node_id_2: PublicKey,
    /// Funding key of the first node.
    pub bitcoin_key_1: PublicKey,
    /// Funding key of the second node.
    pub bitcoin_key_2: PublicKey,
}

impl_funding_writeable!(ChannelAnnouncement, {
    (chain_hash, writeable),
    (short_channel_id, writeable),
    (features, writeable),
    (node_id_1, writeable),
    (node_id_2, writeable),
    (bitcoin_key_1, writeable),
    (bitcoin_key_2, writeable)
});

impl ChannelAnnouncement {
    /// The serialized content covered by the announcement signatures.
    pub fn data_to_sign(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf)
            .expect("in-memory writes don't error");
        buf
    }
}

/// The directional routing policy of one endpoint of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct ChannelUpdate {
    /// Signature of the sending node over the remaining fields.
    pub signature: Signature,
    /// The genesis hash of the chain the channel was opened on.
    pub chain_hash: BlockHash,
    /// The location of the funding output within the blockchain.
    pub short_channel_id: ShortChannelId,
    /// Unix timestamp of the update, strictly increasing for successive
    /// updates in the same direction.
    pub timestamp: u32,
    /// See [`CHAN_UPDATE_OPTION_MAX_HTLC`].
    pub message_flags: u8,
    /// See [`CHAN_UPDATE_DIRECTION`].
    pub channel_flags: u8,
    /// Blocks to subtract from an incoming HTLC's expiry when forwarding.
    pub time_lock_delta: u16,
    /// Smallest HTLC the sending node will forward, in millisatoshis.
    pub htlc_minimum_msat: u64,
    /// Largest HTLC the sending node will forward, in millisatoshis.
    pub htlc_maximum_msat: u64,
    /// Base forwarding fee, in millisatoshis.
    pub fee_base_msat: u32,
    /// Proportional forwarding fee, in millionths.
    pub fee_proportional_millionths: u32,
}

impl ChannelUpdate {
    /// The direction bit of this update.
    pub fn direction(&self) -> u8 {
        self.channel_flags & CHAN_UPDATE_DIRECTION
    }

    /// The serialized content covered by [`ChannelUpdate::signature`].
    pub fn data_to_sign(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_data(&mut buf)
            .expect("in-memory writes don't error");
        buf
    }

    fn write_data<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
        self.chain_hash.write(w)?;
        self.short_channel_id.write(w)?;
        self.timestamp.write(w)?;
        self.message_flags.write(w)?;
        self.channel_flags.write(w)?;
        self.time_lock_delta.write(w)?;
        self.htlc_minimum_msat.write(w)?;
        self.htlc_maximum_msat.write(w)?;
        self.fee_base_msat.write(w)?;
        self.fee_proportional_millionths.write(w)
    }
}

impl Writeable for ChannelUpdate {
    fn write<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
        self.signature.write(w)?;
        self.write_data(w)
    }
}

impl Readable for ChannelUpdate {
    fn read<R: std::io::Read>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(ChannelUpdate {
            signature: Readable::read(r)?,
            chain_hash: Readable::read(r)?,
            short_channel_id: Readable::read(r)?,
            timestamp: Readable::read(r)?,
            message_flags: Readable::read(r)?,
            channel_flags: Readable::read(r)?,
            time_lock_delta: Readable::read(r)?,
            htlc_minimum_msat: Readable::read(r)?,
            htlc_maximum_msat: Readable::read(r)?,
            fee_base_msat: Readable::read(r)?,
            fee_proportional_millionths: Readable::read(r)?,
        })
    }
}

/// Our half of the signatures needed by the counterparty to reconstruct the
/// fully signed channel announcement.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct AnnounceSignatures {
    /// The permanent channel id.
    pub channel_id: ChannelId,
    /// The location of the funding output within the blockchain.
    pub short_channel_id: ShortChannelId,
    /// Signature over the channel announcement under our identity key.
    pub node_signature: Signature,
    /// Signature over the channel announcement under our funding key.
    pub bitcoin_signature: Signature,
}

impl_funding_writeable!(AnnounceSignatures, {
    (channel_id, writeable),
    (short_channel_id, writeable),
    (node_signature, writeable),
    (bitcoin_signature, writeable)
});

/// Announcement of a node's existence and metadata. Only accepted by the
/// network once at least one channel is known for the node.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct NodeAnnouncement {
    /// Signature of the announced node over the remaining fields.
    pub signature: Signature,
    /// Features supported by the node.
    pub features: FeatureVector,
    /// Unix timestamp of the announcement.
    pub timestamp: u32,
    /// Identity key of the announced node.
    pub node_id: PublicKey,
    /// Human readable alias of the node, zero padded.
    pub alias: [u8; 32],
}

impl NodeAnnouncement {
    /// The serialized content covered by [`NodeAnnouncement::signature`].
    pub fn data_to_sign(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_data(&mut buf)
            .expect("in-memory writes don't error");
        buf
    }

    fn write_data<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
        self.features.write(w)?;
        self.timestamp.write(w)?;
        self.node_id.write(w)?;
        self.alias.write(w)
    }
}

impl Writeable for NodeAnnouncement {
    fn write<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
        self.signature.write(w)?;
        self.write_data(w)
    }
}

impl Readable for NodeAnnouncement {
    fn read<R: std::io::Read>(r: &mut R) -> Result<Self, DecodeError> {
        Ok(NodeAnnouncement {
            signature: Readable::read(r)?,
            features: Readable::read(r)?,
            timestamp: Readable::read(r)?,
            node_id: Readable::read(r)?,
            alias: Readable::read(r)?,
        })
    }
}
