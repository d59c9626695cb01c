use funding_manager::ChannelAcceptor;
use funding_messages::OpenChannel;
use secp256k1::PublicKey;
use std::sync::Mutex;

/// Channel acceptor mock, accepting everything unless told otherwise.
pub struct MockAcceptor {
    accept: Mutex<bool>,
}

impl MockAcceptor {
    pub fn new() -> Self {
        MockAcceptor {
            accept: Mutex::new(true),
        }
    }

    pub fn set_accept(&self, accept: bool) {
        *self.accept.lock().unwrap() = accept;
    }
}

impl Default for MockAcceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelAcceptor for MockAcceptor {
    fn accept(&self, _peer_id: &PublicKey, _msg: &OpenChannel) -> bool {
        *self.accept.lock().unwrap()
    }
}
