//! Construction of the authenticated artefacts advertising a newly opened
//! channel: the channel announcement, our directional channel update, and
//! the signature proof allowing the counterparty to reconstruct the fully
//! signed announcement.

use std::ops::Deref;

use bitcoin::BlockHash;
use funding_messages::announcement_msgs::{
    AnnounceSignatures, ChannelAnnouncement, ChannelUpdate, CHAN_UPDATE_OPTION_MAX_HTLC,
};
use funding_messages::{ChannelId, FeatureVector, ShortChannelId};
use secp256k1::ecdsa::Signature;
use secp256k1::PublicKey;

use crate::config::RoutingPolicy;
use crate::error::Error;
use crate::MessageSigner;

/// The two authenticated announcements and the signature proof produced for
/// a newly opened channel.
pub(crate) struct ChanAnnouncementBundle {
    pub chan_ann: ChannelAnnouncement,
    pub chan_update: ChannelUpdate,
    pub proof: AnnounceSignatures,
}

/// A structurally valid signature standing in until the real one has been
/// computed over the serialized message.
fn placeholder_signature() -> Signature {
    let mut compact = [0u8; 64];
    compact[31] = 1;
    compact[63] = 1;
    Signature::from_compact(&compact).expect("valid compact signature")
}

/// Creates the announcement messages required to broadcast a newly created
/// channel to the network. The lexicographic ordering of the serialized
/// node identity keys decides which node is "node 1"; the direction flag of
/// our channel update is 0 exactly when we are. Every observer must derive
/// the same ordering for announcements to deduplicate across the network.
#[allow(clippy::too_many_arguments)]
pub(crate) fn new_chan_announcement<S: Deref>(
    signer: &S,
    chain_hash: BlockHash,
    local_id: PublicKey,
    remote_id: PublicKey,
    local_funding_key: PublicKey,
    remote_funding_key: PublicKey,
    short_channel_id: ShortChannelId,
    channel_id: ChannelId,
    fwd_min_htlc: u64,
    fwd_max_htlc: u64,
    policy: &RoutingPolicy,
    timestamp: u32,
) -> Result<ChanAnnouncementBundle, Error>
where
    S::Target: MessageSigner,
{
    let local_serialized = local_id.serialize();
    let remote_serialized = remote_id.serialize();

    let we_are_first = local_serialized < remote_serialized;
    let (node_id_1, node_id_2, bitcoin_key_1, bitcoin_key_2) = if we_are_first {
        (local_id, remote_id, local_funding_key, remote_funding_key)
    } else {
        (remote_id, local_id, remote_funding_key, local_funding_key)
    };
    let channel_flags = if we_are_first { 0 } else { 1 };

    let chan_ann = ChannelAnnouncement {
        chain_hash,
        short_channel_id,
        features: FeatureVector::empty(),
        node_id_1,
        node_id_2,
        bitcoin_key_1,
        bitcoin_key_2,
    };

    let mut chan_update = ChannelUpdate {
        signature: placeholder_signature(),
        chain_hash,
        short_channel_id,
        timestamp,
        message_flags: CHAN_UPDATE_OPTION_MAX_HTLC,
        channel_flags,
        time_lock_delta: policy.time_lock_delta,
        htlc_minimum_msat: fwd_min_htlc,
        htlc_maximum_msat: fwd_max_htlc,
        fee_base_msat: policy.base_fee,
        fee_proportional_millionths: policy.fee_rate,
    };
    chan_update.signature = signer.sign_message(&local_id, &chan_update.data_to_sign())?;

    let ann_data = chan_ann.data_to_sign();
    let node_signature = signer.sign_message(&local_id, &ann_data)?;
    let bitcoin_signature = signer.sign_message(&local_funding_key, &ann_data)?;

    let proof = AnnounceSignatures {
        channel_id,
        short_channel_id,
        node_signature,
        bitcoin_signature,
    };

    Ok(ChanAnnouncementBundle {
        chan_ann,
        chan_update,
        proof,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::{sha256d, Hash};
    use funding_messages::announcement_msgs::NodeAnnouncement;
    use secp256k1::{Message, Secp256k1, SecretKey};
    use std::collections::HashMap;

    struct TestSigner {
        secp: Secp256k1<secp256k1::All>,
        keys: HashMap<PublicKey, SecretKey>,
    }

    impl TestSigner {
        fn new(secrets: &[SecretKey]) -> Self {
            let secp = Secp256k1::new();
            let keys = secrets
                .iter()
                .map(|secret| (PublicKey::from_secret_key(&secp, secret), *secret))
                .collect();
            TestSigner { secp, keys }
        }
    }

    impl MessageSigner for TestSigner {
        fn sign_message(&self, pubkey: &PublicKey, msg: &[u8]) -> Result<Signature, Error> {
            let secret = self
                .keys
                .get(pubkey)
                .ok_or_else(|| Error::InvalidState("unknown key".to_string()))?;
            let digest = sha256d::Hash::hash(msg);
            let message = Message::from_slice(digest.as_byte_array()).unwrap();
            Ok(self.secp.sign_ecdsa(&message, secret))
        }

        fn node_announcement(&self) -> Result<NodeAnnouncement, Error> {
            unimplemented!("not used in these tests")
        }
    }

    fn keypair(byte: u8) -> (SecretKey, PublicKey) {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        (secret, PublicKey::from_secret_key(&secp, &secret))
    }

    fn build(
        local_id: PublicKey,
        remote_id: PublicKey,
        signer: &Box<TestSigner>,
        local_funding: PublicKey,
        remote_funding: PublicKey,
    ) -> ChanAnnouncementBundle {
        let policy = RoutingPolicy {
            time_lock_delta: 40,
            min_htlc_out: 1000,
            base_fee: 1000,
            fee_rate: 1,
        };
        new_chan_announcement(
            signer,
            BlockHash::all_zeros(),
            local_id,
            remote_id,
            local_funding,
            remote_funding,
            ShortChannelId {
                block_height: 100,
                tx_index: 1,
                output_index: 0,
            },
            [3; 32],
            1000,
            990_000_000,
            &policy,
            1_600_000_000,
        )
        .unwrap()
    }

    #[test]
    fn nodes_are_ordered_lexicographically_test() {
        let (local_secret, local_id) = keypair(1);
        let (_, remote_id) = keypair(2);
        let (local_funding_secret, local_funding) = keypair(3);
        let (_, remote_funding) = keypair(4);
        let signer = Box::new(TestSigner::new(&[local_secret, local_funding_secret]));

        let bundle = build(local_id, remote_id, &signer, local_funding, remote_funding);

        assert!(bundle.chan_ann.node_id_1.serialize() < bundle.chan_ann.node_id_2.serialize());
        let we_are_first = bundle.chan_ann.node_id_1 == local_id;
        assert_eq!(
            bundle.chan_update.direction() == 0,
            we_are_first,
            "direction bit must be 0 exactly when our key is node 1"
        );
        if we_are_first {
            assert_eq!(bundle.chan_ann.bitcoin_key_1, local_funding);
        } else {
            assert_eq!(bundle.chan_ann.bitcoin_key_2, local_funding);
        }
    }

    #[test]
    fn ordering_is_stable_under_swapped_perspective_test() {
        let (local_secret, local_id) = keypair(1);
        let (remote_secret, remote_id) = keypair(2);
        let (local_funding_secret, local_funding) = keypair(3);
        let (remote_funding_secret, remote_funding) = keypair(4);
        let signer = Box::new(TestSigner::new(&[
            local_secret,
            remote_secret,
            local_funding_secret,
            remote_funding_secret,
        ]));

        let ours = build(local_id, remote_id, &signer, local_funding, remote_funding);
        let theirs = build(remote_id, local_id, &signer, remote_funding, local_funding);

        assert_eq!(ours.chan_ann, theirs.chan_ann);
        assert_ne!(
            ours.chan_update.direction(),
            theirs.chan_update.direction()
        );
    }

    #[test]
    fn update_signature_verifies_under_identity_key_test() {
        let (local_secret, local_id) = keypair(1);
        let (_, remote_id) = keypair(2);
        let (local_funding_secret, local_funding) = keypair(3);
        let (_, remote_funding) = keypair(4);
        let signer = Box::new(TestSigner::new(&[local_secret, local_funding_secret]));

        let bundle = build(local_id, remote_id, &signer, local_funding, remote_funding);

        let secp = Secp256k1::new();
        let digest = sha256d::Hash::hash(&bundle.chan_update.data_to_sign());
        let message = Message::from_slice(digest.as_byte_array()).unwrap();
        assert!(secp
            .verify_ecdsa(&message, &bundle.chan_update.signature, &local_id)
            .is_ok());

        let ann_digest = sha256d::Hash::hash(&bundle.chan_ann.data_to_sign());
        let ann_message = Message::from_slice(ann_digest.as_byte_array()).unwrap();
        assert!(secp
            .verify_ecdsa(&ann_message, &bundle.proof.node_signature, &local_id)
            .is_ok());
        assert!(secp
            .verify_ecdsa(&ann_message, &bundle.proof.bitcoin_signature, &local_funding)
            .is_ok());
    }
}
