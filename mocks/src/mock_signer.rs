use bitcoin::hashes::{sha256d, Hash};
use funding_manager::error::Error;
use funding_manager::MessageSigner;
use funding_messages::announcement_msgs::NodeAnnouncement;
use funding_messages::FeatureVector;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

/// Message signer mock holding the identity key of the node. Signatures
/// over other keys (e.g. channel funding keys) are produced with the
/// identity secret as well, which is enough for tests that only check the
/// presence and structure of announcements.
pub struct MockSigner {
    secp: Secp256k1<All>,
    node_secret: SecretKey,
    node_id: PublicKey,
}

impl MockSigner {
    pub fn new(node_secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let node_id = PublicKey::from_secret_key(&secp, &node_secret);
        MockSigner {
            secp,
            node_secret,
            node_id,
        }
    }

    pub fn node_id(&self) -> PublicKey {
        self.node_id
    }
}

impl MessageSigner for MockSigner {
    fn sign_message(&self, _pubkey: &PublicKey, msg: &[u8]) -> Result<Signature, Error> {
        let digest = sha256d::Hash::hash(msg);
        let message =
            Message::from_slice(digest.as_byte_array()).expect("digest is a valid message");
        Ok(self.secp.sign_ecdsa(&message, &self.node_secret))
    }

    fn node_announcement(&self) -> Result<NodeAnnouncement, Error> {
        let mut announcement = NodeAnnouncement {
            signature: Signature::from_compact(&[1; 64]).expect("valid signature"),
            features: FeatureVector::empty(),
            timestamp: 1_600_000_000,
            node_id: self.node_id,
            alias: [0; 32],
        };
        announcement.signature = self.sign_message(&self.node_id, &announcement.data_to_sign())?;
        Ok(announcement)
    }
}
