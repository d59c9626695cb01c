use bitcoin::OutPoint;
use funding_manager::{GossipError, GossipSender};
use funding_messages::FundingMessage;
use std::sync::Mutex;

/// Gossip mock recording submitted announcements. Can be configured to
/// reject the next submissions with a given error.
pub struct MockGossip {
    announcements: Mutex<Vec<FundingMessage>>,
    next_error: Mutex<Option<GossipError>>,
}

impl MockGossip {
    pub fn new() -> Self {
        MockGossip {
            announcements: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
        }
    }

    /// Makes every following submission return the given error until
    /// cleared.
    pub fn set_error(&self, error: Option<GossipError>) {
        *self.next_error.lock().unwrap() = error;
    }

    pub fn announcements(&self) -> Vec<FundingMessage> {
        self.announcements.lock().unwrap().clone()
    }

    pub fn take_announcements(&self) -> Vec<FundingMessage> {
        std::mem::take(&mut *self.announcements.lock().unwrap())
    }
}

impl Default for MockGossip {
    fn default() -> Self {
        Self::new()
    }
}

impl GossipSender for MockGossip {
    fn send_announcement(
        &self,
        msg: FundingMessage,
        _capacity: Option<u64>,
        _funding_outpoint: Option<OutPoint>,
    ) -> Result<(), GossipError> {
        if let Some(error) = &*self.next_error.lock().unwrap() {
            return Err(error.clone());
        }
        self.announcements.lock().unwrap().push(msg);
        Ok(())
    }
}
