use funding_manager::error::Error;
use funding_manager::{ChannelId, FundedChannel, PeerMessenger};
use funding_messages::{FeatureVector, FundingMessage};
use secp256k1::PublicKey;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Peer messaging mock recording every sent message, with per peer online
/// state and feature vectors controlled by the test.
pub struct MockPeerMessenger {
    messages: Mutex<Vec<(PublicKey, FundingMessage)>>,
    online: Mutex<HashSet<PublicKey>>,
    features: Mutex<HashMap<PublicKey, (FeatureVector, FeatureVector)>>,
    added_channels: Mutex<Vec<(PublicKey, ChannelId)>>,
    fail_sends: Mutex<bool>,
}

impl MockPeerMessenger {
    pub fn new() -> Self {
        MockPeerMessenger {
            messages: Mutex::new(Vec::new()),
            online: Mutex::new(HashSet::new()),
            features: Mutex::new(HashMap::new()),
            added_channels: Mutex::new(Vec::new()),
            fail_sends: Mutex::new(false),
        }
    }

    pub fn set_online(&self, peer_id: PublicKey, online: bool) {
        let mut set = self.online.lock().unwrap();
        if online {
            set.insert(peer_id);
        } else {
            set.remove(&peer_id);
        }
    }

    /// Sets the features we advertised to the peer and the ones it
    /// advertised to us.
    pub fn set_features(&self, peer_id: PublicKey, local: FeatureVector, remote: FeatureVector) {
        self.features.lock().unwrap().insert(peer_id, (local, remote));
    }

    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }

    /// Drains and returns the messages sent so far, in order.
    pub fn take_messages(&self) -> Vec<(PublicKey, FundingMessage)> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }

    pub fn added_channels(&self) -> Vec<(PublicKey, ChannelId)> {
        self.added_channels.lock().unwrap().clone()
    }
}

impl Default for MockPeerMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerMessenger for MockPeerMessenger {
    fn send_message(
        &self,
        peer_id: &PublicKey,
        _flush: bool,
        msg: FundingMessage,
    ) -> Result<(), Error> {
        if *self.fail_sends.lock().unwrap() {
            return Err(Error::PeerDisconnected);
        }
        if !self.online.lock().unwrap().contains(peer_id) {
            return Err(Error::PeerDisconnected);
        }
        self.messages.lock().unwrap().push((*peer_id, msg));
        Ok(())
    }

    fn is_online(&self, peer_id: &PublicKey) -> bool {
        self.online.lock().unwrap().contains(peer_id)
    }

    fn local_features(&self, peer_id: &PublicKey) -> FeatureVector {
        self.features
            .lock()
            .unwrap()
            .get(peer_id)
            .map(|(local, _)| *local)
            .unwrap_or_else(FeatureVector::empty)
    }

    fn remote_features(&self, peer_id: &PublicKey) -> FeatureVector {
        self.features
            .lock()
            .unwrap()
            .get(peer_id)
            .map(|(_, remote)| *remote)
            .unwrap_or_else(FeatureVector::empty)
    }

    fn add_new_channel(&self, peer_id: &PublicKey, channel: &FundedChannel) -> Result<(), Error> {
        self.added_channels
            .lock()
            .unwrap()
            .push((*peer_id, channel.channel_id()));
        Ok(())
    }
}
