//! # Configuration of the funding manager.

use bitcoin::BlockHash;
use secp256k1::PublicKey;

/// The smallest channel we accept, protecting against channels too small to
/// ever be economically useful.
pub const MIN_CHAN_FUNDING_SIZE: u64 = 20_000;

/// Soft limit on the maximum channel size accepted by the protocol, serving
/// as a precautionary bound while implementations mature.
pub const MAX_FUNDING_AMOUNT: u64 = (1 << 24) - 1;

/// The lower bound of the CSV delay we require from the remote for its
/// commitment transaction.
pub const MIN_REMOTE_DELAY: u16 = 144;

/// The upper bound of the CSV delay we require from the remote for its
/// commitment transaction.
pub const MAX_REMOTE_DELAY: u16 = 2016;

/// The maximum number of blocks a responder waits for the funding
/// transaction to confirm before forgetting the channel, roughly two weeks.
pub const MAX_WAIT_NUM_BLOCKS_FUNDING_CONF: u32 = 2016;

/// The largest number of HTLCs one party can offer on a channel.
pub const MAX_HTLC_NUMBER: u16 = 483;

/// Confirmations a public channel must have before it is announced to the
/// wider network.
pub const ANNOUNCEMENT_MIN_CONFS: u16 = 6;

/// Our default routing policy, used when first announcing a channel.
#[derive(Clone, Copy, Debug)]
pub struct RoutingPolicy {
    /// Blocks subtracted from an incoming HTLC's expiry when forwarding.
    pub time_lock_delta: u16,
    /// Smallest HTLC we forward, in millisatoshis.
    pub min_htlc_out: u64,
    /// Base forwarding fee, in millisatoshis.
    pub base_fee: u32,
    /// Proportional forwarding fee, in millionths.
    pub fee_rate: u32,
}

/// Configuration of the funding manager. Scalar knobs only; collaborating
/// subsystems are injected separately at construction.
#[derive(Clone, Debug)]
pub struct FundingConfig {
    /// The genesis hash of the chain channels are opened on.
    pub chain_hash: BlockHash,
    /// The key identifying this node within the network.
    pub id_key: PublicKey,
    /// The smallest channel we accept as a responder, in satoshis.
    pub min_chan_size: u64,
    /// The largest channel we accept as a responder, in satoshis.
    pub max_chan_size: u64,
    /// The maximum number of pending channels we allow per peer.
    pub max_pending_channels: usize,
    /// Whether inbound channels with a non-zero push amount are rejected.
    pub reject_push: bool,
    /// The largest CSV delay we accept for our own commitment outputs.
    pub max_local_csv_delay: u16,
    /// Idle time after which a non-locked reservation is considered a
    /// zombie, in seconds.
    pub reservation_timeout: u64,
    /// Interval between two zombie reservation sweeps, in seconds.
    pub zombie_sweep_interval: u64,
    /// Default smallest incoming HTLC we accept on new channels, in
    /// millisatoshis.
    pub default_min_htlc_in: u64,
    /// The dust limit we enforce on our own commitment, in satoshis.
    pub default_dust_limit: u64,
    /// The routing policy announced for new channels.
    pub default_routing_policy: RoutingPolicy,
    /// Whether a fresh wallet address is committed as shutdown script when
    /// the peer supports it and the caller did not provide one.
    pub enable_upfront_shutdown: bool,
    /// Whether pending initiated channels have their funding transaction
    /// re-published on startup.
    pub rebroadcast_on_start: bool,
}

impl FundingConfig {
    /// The number of confirmations we require before considering a channel
    /// extended to us open, scaling with the funds at stake.
    pub fn num_required_confs(&self, capacity: u64, push_msat: u64) -> u16 {
        let stake = capacity + push_msat / 1000;
        let max_conf_stake = self.max_chan_size.max(1);
        let conf = 1 + (ANNOUNCEMENT_MIN_CONFS as u64 - 1) * stake / max_conf_stake;
        conf.min(ANNOUNCEMENT_MIN_CONFS as u64) as u16
    }

    /// The CSV delay we require for the remote commitment outputs, growing
    /// with the channel size to leave more time to respond to a breach.
    pub fn required_remote_delay(&self, capacity: u64) -> u16 {
        let span = (MAX_REMOTE_DELAY - MIN_REMOTE_DELAY) as u64;
        let delay = MIN_REMOTE_DELAY as u64 + span * capacity / self.max_chan_size.max(1);
        delay.min(MAX_REMOTE_DELAY as u64) as u16
    }

    /// The amount the remote must keep unencumbered at all times, one
    /// percent of the capacity floored at the dust limit.
    pub fn required_remote_chan_reserve(&self, capacity: u64, dust_limit: u64) -> u64 {
        (capacity / 100).max(dust_limit)
    }

    /// The maximum total value of HTLCs the remote may have in flight with
    /// us, in millisatoshis.
    pub fn required_remote_max_value(&self, capacity: u64) -> u64 {
        let reserve = self.required_remote_chan_reserve(capacity, self.default_dust_limit);
        capacity.saturating_sub(reserve) * 1000
    }

    /// The maximum number of HTLCs the remote may offer concurrently.
    pub fn required_remote_max_htlcs(&self, capacity: u64) -> u16 {
        let scaled = (MAX_HTLC_NUMBER as u64) * capacity / self.max_chan_size.max(1);
        scaled.clamp(5, MAX_HTLC_NUMBER as u64) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    fn test_config() -> FundingConfig {
        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&[1; 32]).unwrap();
        FundingConfig {
            chain_hash: BlockHash::all_zeros(),
            id_key: PublicKey::from_secret_key(&secp, &sk),
            min_chan_size: MIN_CHAN_FUNDING_SIZE,
            max_chan_size: MAX_FUNDING_AMOUNT,
            max_pending_channels: 1,
            reject_push: false,
            max_local_csv_delay: 10_000,
            reservation_timeout: 600,
            zombie_sweep_interval: 60,
            default_min_htlc_in: 1000,
            default_dust_limit: 573,
            default_routing_policy: RoutingPolicy {
                time_lock_delta: 40,
                min_htlc_out: 1000,
                base_fee: 1000,
                fee_rate: 1,
            },
            enable_upfront_shutdown: false,
            rebroadcast_on_start: true,
        }
    }

    #[test]
    fn required_confs_scale_with_stake_test() {
        let config = test_config();
        assert_eq!(config.num_required_confs(MIN_CHAN_FUNDING_SIZE, 0), 1);
        assert_eq!(
            config.num_required_confs(MAX_FUNDING_AMOUNT, 0),
            ANNOUNCEMENT_MIN_CONFS
        );
        let mid = config.num_required_confs(MAX_FUNDING_AMOUNT / 2, 0);
        assert!(mid > 1 && mid < ANNOUNCEMENT_MIN_CONFS);
    }

    #[test]
    fn required_remote_delay_bounds_test() {
        let config = test_config();
        assert_eq!(config.required_remote_delay(0), MIN_REMOTE_DELAY);
        assert_eq!(
            config.required_remote_delay(MAX_FUNDING_AMOUNT),
            MAX_REMOTE_DELAY
        );
        let mid = config.required_remote_delay(MAX_FUNDING_AMOUNT / 2);
        assert!(mid > MIN_REMOTE_DELAY && mid < MAX_REMOTE_DELAY);
    }

    #[test]
    fn remote_reserve_floored_at_dust_test() {
        let config = test_config();
        assert_eq!(config.required_remote_chan_reserve(1_000_000, 573), 10_000);
        assert_eq!(config.required_remote_chan_reserve(20_000, 573), 573);
    }
}
