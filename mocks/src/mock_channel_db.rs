use funding_manager::error::Error;
use funding_manager::{ChannelCloseSummary, ChannelDatabase, ChannelId, FundedChannel};
use funding_messages::ShortChannelId;
use secp256k1::PublicKey;
use std::collections::HashMap;
use std::sync::RwLock;

/// In memory channel database.
pub struct MockChannelDatabase {
    channels: RwLock<HashMap<ChannelId, FundedChannel>>,
    closed: RwLock<Vec<ChannelCloseSummary>>,
}

impl MockChannelDatabase {
    pub fn new() -> Self {
        MockChannelDatabase {
            channels: RwLock::new(HashMap::new()),
            closed: RwLock::new(Vec::new()),
        }
    }

    /// Inserts a channel record, used by the mock wallet when completing a
    /// reservation.
    pub fn insert_channel(&self, channel: FundedChannel) {
        self.channels
            .write()
            .unwrap()
            .insert(channel.channel_id(), channel);
    }

    pub fn closed_channels(&self) -> Vec<ChannelCloseSummary> {
        self.closed.read().unwrap().clone()
    }
}

impl Default for MockChannelDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelDatabase for MockChannelDatabase {
    fn fetch_all_channels(&self) -> Result<Vec<FundedChannel>, Error> {
        Ok(self.channels.read().unwrap().values().cloned().collect())
    }

    fn fetch_pending_channels(&self) -> Result<Vec<FundedChannel>, Error> {
        Ok(self
            .channels
            .read()
            .unwrap()
            .values()
            .filter(|channel| channel.is_pending)
            .cloned()
            .collect())
    }

    fn fetch_open_channels(&self, peer_id: &PublicKey) -> Result<Vec<FundedChannel>, Error> {
        Ok(self
            .channels
            .read()
            .unwrap()
            .values()
            .filter(|channel| &channel.peer_id == peer_id)
            .cloned()
            .collect())
    }

    fn find_channel(&self, channel_id: &ChannelId) -> Result<Option<FundedChannel>, Error> {
        Ok(self.channels.read().unwrap().get(channel_id).cloned())
    }

    fn mark_channel_open(
        &self,
        channel_id: &ChannelId,
        short_channel_id: ShortChannelId,
    ) -> Result<(), Error> {
        let mut channels = self.channels.write().unwrap();
        let channel = channels
            .get_mut(channel_id)
            .ok_or_else(|| Error::Database("unknown channel".to_string()))?;
        channel.is_pending = false;
        channel.short_channel_id = Some(short_channel_id);
        Ok(())
    }

    fn close_channel(&self, summary: &ChannelCloseSummary) -> Result<(), Error> {
        let mut channels = self.channels.write().unwrap();
        channels.retain(|_, channel| channel.funding_outpoint != summary.funding_outpoint);
        self.closed.write().unwrap().push(summary.clone());
        Ok(())
    }

    fn insert_next_revocation(
        &self,
        channel_id: &ChannelId,
        point: PublicKey,
    ) -> Result<(), Error> {
        let mut channels = self.channels.write().unwrap();
        let channel = channels
            .get_mut(channel_id)
            .ok_or_else(|| Error::Database("unknown channel".to_string()))?;
        channel.remote_next_revocation = Some(point);
        Ok(())
    }
}
