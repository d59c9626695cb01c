use bitcoin::OutPoint;
use funding_manager::error::Error as DaemonError;
use funding_manager::opening::ChannelOpeningState;
use funding_manager::Storage;
use funding_messages::ShortChannelId;
use std::collections::HashMap;
use std::sync::RwLock;

/// In memory implementation of the opening state store.
pub struct MemoryStorage {
    opening_states: RwLock<HashMap<OutPoint, (ChannelOpeningState, ShortChannelId)>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            opening_states: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryStorage {
    fn save_opening_state(
        &self,
        funding_outpoint: &OutPoint,
        state: ChannelOpeningState,
        short_channel_id: ShortChannelId,
    ) -> Result<(), DaemonError> {
        let mut map = self
            .opening_states
            .write()
            .expect("Could not get write lock");
        map.insert(*funding_outpoint, (state, short_channel_id));
        Ok(())
    }

    fn get_opening_state(
        &self,
        funding_outpoint: &OutPoint,
    ) -> Result<Option<(ChannelOpeningState, ShortChannelId)>, DaemonError> {
        let map = self.opening_states.read().expect("Could not get read lock");
        Ok(map.get(funding_outpoint).copied())
    }

    fn delete_opening_state(&self, funding_outpoint: &OutPoint) -> Result<(), DaemonError> {
        let mut map = self
            .opening_states
            .write()
            .expect("Could not get write lock");
        map.remove(funding_outpoint);
        Ok(())
    }

    fn all_opening_states(
        &self,
    ) -> Result<Vec<(OutPoint, ChannelOpeningState, ShortChannelId)>, DaemonError> {
        let map = self.opening_states.read().expect("Could not get read lock");
        Ok(map
            .iter()
            .map(|(outpoint, (state, short_chan_id))| (*outpoint, *state, *short_chan_id))
            .collect())
    }
}
