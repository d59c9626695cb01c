use bitcoin::OutPoint;
use funding_manager::error::Error;
use funding_manager::{ChannelEventNotifier, FundedChannel};
use std::sync::Mutex;

/// Channel event notifier mock recording every notification.
pub struct MockEventNotifier {
    pending_open: Mutex<Vec<OutPoint>>,
    open: Mutex<Vec<OutPoint>>,
    reported_short_ids: Mutex<Vec<OutPoint>>,
}

impl MockEventNotifier {
    pub fn new() -> Self {
        MockEventNotifier {
            pending_open: Mutex::new(Vec::new()),
            open: Mutex::new(Vec::new()),
            reported_short_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn pending_open_events(&self) -> Vec<OutPoint> {
        self.pending_open.lock().unwrap().clone()
    }

    pub fn open_events(&self) -> Vec<OutPoint> {
        self.open.lock().unwrap().clone()
    }

    pub fn reported_short_ids(&self) -> Vec<OutPoint> {
        self.reported_short_ids.lock().unwrap().clone()
    }
}

impl Default for MockEventNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEventNotifier for MockEventNotifier {
    fn notify_pending_open(&self, funding_outpoint: &OutPoint, _channel: &FundedChannel) {
        self.pending_open.lock().unwrap().push(*funding_outpoint);
    }

    fn notify_open(&self, funding_outpoint: &OutPoint) {
        self.open.lock().unwrap().push(*funding_outpoint);
    }

    fn report_short_channel_id(&self, funding_outpoint: &OutPoint) -> Result<(), Error> {
        self.reported_short_ids
            .lock()
            .unwrap()
            .push(*funding_outpoint);
        Ok(())
    }
}
