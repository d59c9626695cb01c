//! Bookkeeping of in-flight channel reservations, keyed by peer and
//! temporary channel id.

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use secp256k1::PublicKey;

use crate::error::Error;
use crate::{ChannelId, ChannelReservation, OpenStatusUpdate};

/// A pending channel reservation together with the context needed to track
/// and progress the funding workflow it belongs to.
pub(crate) struct ReservationContext {
    /// The underlying wallet reservation.
    pub reservation: Box<dyn ChannelReservation>,
    /// The identity key of the counterparty.
    pub peer_id: PublicKey,
    /// The total capacity of the channel, in satoshis.
    pub capacity: u64,
    /// CSV delay we require for the remote commitment outputs.
    pub remote_csv_delay: u16,
    /// Smallest HTLC we accept from the remote, in millisatoshis.
    pub remote_min_htlc: u64,
    /// Maximum value the remote may have in flight, in millisatoshis.
    pub remote_max_value: u64,
    /// Maximum number of HTLCs the remote may offer.
    pub remote_max_htlcs: u16,
    /// The largest CSV delay we accept for our own commitment outputs.
    pub max_local_csv: u16,
    /// Unix time of the last message handled for this reservation. `None`
    /// marks the reservation as locked, shielding it from the zombie sweep.
    pub last_updated: Option<u64>,
    /// Sink streaming progress to the caller, present for locally initiated
    /// flows.
    pub updates: Option<Sender<OpenStatusUpdate>>,
    /// Sink receiving the failure reason, present for locally initiated
    /// flows.
    pub errors: Option<Sender<Error>>,
}

impl ReservationContext {
    pub(crate) fn is_locked(&self) -> bool {
        self.last_updated.is_none()
    }

    /// Locks the reservation, excluding it from the zombie sweep.
    pub(crate) fn lock(&mut self) {
        self.last_updated = None;
    }

    pub(crate) fn update_timestamp(&mut self, now: u64) {
        self.last_updated = Some(now);
    }

    /// Forwards the failure reason to the local caller, if any is
    /// listening.
    pub(crate) fn notify_error(&self, error: Error) {
        if let Some(errors) = &self.errors {
            let _ = errors.send(error);
        }
    }

    /// Streams a progress update to the local caller, if any is listening.
    pub(crate) fn notify_update(&self, update: OpenStatusUpdate) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(update);
        }
    }
}

/// Source of temporary channel ids. Ids are produced by a ChaCha20 stream
/// cipher keyed with a random seed, taking one block per monotonically
/// increasing stream number, which makes them collision free for the
/// lifetime of the seed.
pub(crate) struct TempChanIdSource {
    seed: [u8; 32],
    nonce: u64,
}

impl TempChanIdSource {
    pub(crate) fn new(seed: [u8; 32]) -> Self {
        TempChanIdSource { seed, nonce: 0 }
    }

    pub(crate) fn next_id(&mut self) -> ChannelId {
        let mut cipher = ChaCha20Rng::from_seed(self.seed);
        cipher.set_stream(self.nonce);
        self.nonce += 1;

        let mut id = [0u8; 32];
        cipher.fill_bytes(&mut id);
        id
    }
}

/// Two level mapping housing the state of all pending funding workflows:
/// peer id to temporary channel id to reservation context, plus the
/// crossref from permanent to temporary channel id installed once the
/// funding outpoint of a flow is known.
pub(crate) struct ReservationRegistry {
    active: HashMap<PublicKey, HashMap<ChannelId, ReservationContext>>,
    signed: HashMap<ChannelId, ChannelId>,
}

impl ReservationRegistry {
    pub(crate) fn new() -> Self {
        ReservationRegistry {
            active: HashMap::new(),
            signed: HashMap::new(),
        }
    }

    pub(crate) fn insert(
        &mut self,
        peer_id: PublicKey,
        temp_chan_id: ChannelId,
        context: ReservationContext,
    ) {
        self.active
            .entry(peer_id)
            .or_insert_with(HashMap::new)
            .insert(temp_chan_id, context);
    }

    pub(crate) fn get(
        &self,
        peer_id: &PublicKey,
        temp_chan_id: &ChannelId,
    ) -> Option<&ReservationContext> {
        self.active.get(peer_id)?.get(temp_chan_id)
    }

    pub(crate) fn get_mut(
        &mut self,
        peer_id: &PublicKey,
        temp_chan_id: &ChannelId,
    ) -> Option<&mut ReservationContext> {
        self.active.get_mut(peer_id)?.get_mut(temp_chan_id)
    }

    /// Removes the reservation for the given peer and temporary id,
    /// dropping the peer entry altogether when it was the last one.
    pub(crate) fn remove(
        &mut self,
        peer_id: &PublicKey,
        temp_chan_id: &ChannelId,
    ) -> Option<ReservationContext> {
        let peer_reservations = self.active.get_mut(peer_id)?;
        let context = peer_reservations.remove(temp_chan_id);
        if peer_reservations.is_empty() {
            self.active.remove(peer_id);
        }
        context
    }

    /// Removes and returns all reservations held for the given peer.
    pub(crate) fn take_peer(
        &mut self,
        peer_id: &PublicKey,
    ) -> Vec<(ChannelId, ReservationContext)> {
        match self.active.remove(peer_id) {
            Some(reservations) => reservations.into_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Installs the crossref from the permanent channel id of a flow to its
    /// temporary id.
    pub(crate) fn register_signed(&mut self, channel_id: ChannelId, temp_chan_id: ChannelId) {
        self.signed.insert(channel_id, temp_chan_id);
    }

    /// Consumes the crossref for the given permanent channel id.
    pub(crate) fn take_signed(&mut self, channel_id: &ChannelId) -> Option<ChannelId> {
        self.signed.remove(channel_id)
    }

    /// The number of reservations for the given peer that count towards the
    /// pending channel limit. Reservations created from a canned funding
    /// shim are exempt, the operator registered them and expects the
    /// channel to arrive.
    pub(crate) fn count_nonshim(&self, peer_id: &PublicKey) -> usize {
        match self.active.get(peer_id) {
            Some(reservations) => reservations
                .values()
                .filter(|context| !context.reservation.is_canned_shim())
                .count(),
            None => 0,
        }
    }

    /// Collects the reservations that have not seen a message for longer
    /// than the given timeout. Locked reservations and PSBT funded ones are
    /// never collected, the latter rely on the peer's own timeout.
    pub(crate) fn collect_zombies(&self, now: u64, timeout: u64) -> Vec<(PublicKey, ChannelId)> {
        let mut zombies = Vec::new();
        for (peer_id, reservations) in &self.active {
            for (temp_chan_id, context) in reservations {
                if context.is_locked() || context.reservation.is_psbt() {
                    continue;
                }
                if let Some(last_updated) = context.last_updated {
                    if now.saturating_sub(last_updated) > timeout {
                        zombies.push((*peer_id, *temp_chan_id));
                    }
                }
            }
        }
        zombies
    }

    /// Whether a reservation exists for the given peer and temporary id.
    pub(crate) fn contains(&self, peer_id: &PublicKey, temp_chan_id: &ChannelId) -> bool {
        self.get(peer_id, temp_chan_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_chan_ids_are_unique_test() {
        let mut source = TempChanIdSource::new([42; 32]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(source.next_id()));
        }
    }

    #[test]
    fn temp_chan_ids_are_deterministic_for_a_seed_test() {
        let mut first = TempChanIdSource::new([42; 32]);
        let mut second = TempChanIdSource::new([42; 32]);
        assert_eq!(first.next_id(), second.next_id());

        let mut other_seed = TempChanIdSource::new([43; 32]);
        let mut source = TempChanIdSource::new([42; 32]);
        assert_ne!(source.next_id(), other_seed.next_id());
    }
}
