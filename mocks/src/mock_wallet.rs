use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bitcoin::absolute::LockTime;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Address, Network, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use funding_manager::error::Error;
use funding_manager::{
    ChannelBasepoints, ChannelConstraints, ChannelContribution, ChannelId, ChannelReservation,
    FundedChannel, InitFundingRequest, PsbtState, RemoteContribution, Wallet,
};
use lightning::ln::chan_utils::make_funding_redeemscript;
use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::mock_chain::MockChainNotifier;
use crate::mock_channel_db::MockChannelDatabase;

/// The mutable state of a mock reservation, shared between the reservation
/// handle held by the funding manager and the wallet so tests can drive
/// PSBT flows and inspect cancellations.
pub struct ReservationState {
    pub request: InitFundingRequest,
    pub our_basepoints: ChannelBasepoints,
    pub our_first_point: PublicKey,
    pub our_dust_limit: u64,
    pub upfront_shutdown: Option<ScriptBuf>,
    pub num_confs_required: u16,
    pub local_constraints: Option<ChannelConstraints>,
    pub remote: Option<RemoteContribution>,
    pub funding_tx: Option<Transaction>,
    pub funding_outpoint: Option<OutPoint>,
    pub commitment_seed: [u8; 32],
    pub funding_secret: SecretKey,
    pub is_psbt: bool,
    pub psbt_state: PsbtState,
    pub is_canned_shim: bool,
    pub cancel_count: usize,
    pub completed: bool,
}

struct MockReservation {
    state: Arc<Mutex<ReservationState>>,
    channel_db: Arc<MockChannelDatabase>,
    chain: Arc<MockChainNotifier>,
    secp: Secp256k1<All>,
}

impl MockReservation {
    fn build_funding(state: &mut ReservationState, secp: &Secp256k1<All>) {
        let remote = state
            .remote
            .as_ref()
            .expect("contribution must have been processed");
        let our_funding_pubkey = PublicKey::from_secret_key(secp, &state.funding_secret);
        let funding_script =
            make_funding_redeemscript(&our_funding_pubkey, &remote.basepoints.funding_pubkey)
                .to_v0_p2wsh();
        let capacity = state.request.local_amount + state.request.remote_amount;
        let tx = Transaction {
            version: 2,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: capacity,
                script_pubkey: funding_script,
            }],
        };
        state.funding_outpoint = Some(OutPoint {
            txid: tx.txid(),
            vout: 0,
        });
        state.funding_tx = Some(tx);
    }

    fn build_channel(&self, state: &ReservationState, is_initiator: bool) -> FundedChannel {
        let remote = state
            .remote
            .as_ref()
            .expect("contribution must have been processed");
        let capacity = state.request.local_amount + state.request.remote_amount;
        let push_sat = state.request.push_msat / 1000;
        let (local_balance, remote_balance) = if is_initiator {
            (capacity - push_sat, push_sat)
        } else {
            (push_sat, capacity - push_sat)
        };
        let local_constraints = state.local_constraints.unwrap_or(ChannelConstraints {
            dust_limit: state.our_dust_limit,
            channel_reserve: capacity / 100,
            max_value_in_flight: capacity * 1000,
            htlc_minimum: 1,
            max_accepted_htlcs: 483,
            csv_delay: 144,
        });
        FundedChannel {
            funding_outpoint: state
                .funding_outpoint
                .expect("funding outpoint must be known"),
            temporary_channel_id: state.request.temporary_channel_id,
            peer_id: state.request.peer_id,
            capacity,
            local_balance,
            remote_balance,
            is_initiator,
            is_pending: true,
            channel_flags: state.request.channel_flags,
            num_confs_required: state.num_confs_required,
            funding_broadcast_height: self.chain.current_height(),
            funding_tx: if is_initiator {
                state.funding_tx.clone()
            } else {
                None
            },
            local_basepoints: state.our_basepoints,
            remote_basepoints: remote.basepoints,
            local_constraints,
            remote_constraints: remote.constraints,
            commitment_type: state.request.commitment_type,
            commitment_seed: state.commitment_seed,
            remote_next_revocation: None,
            thaw_height: if state.is_canned_shim { 144 } else { 0 },
            short_channel_id: None,
        }
    }
}

impl ChannelReservation for MockReservation {
    fn set_num_confs_required(&mut self, num_confs: u16) {
        self.state.lock().unwrap().num_confs_required = num_confs;
    }

    fn commit_constraints(
        &mut self,
        constraints: &ChannelConstraints,
        _max_local_csv: u16,
    ) -> Result<(), Error> {
        self.state.lock().unwrap().local_constraints = Some(*constraints);
        Ok(())
    }

    fn set_our_upfront_shutdown(&mut self, script: Option<ScriptBuf>) {
        self.state.lock().unwrap().upfront_shutdown = script;
    }

    fn our_contribution(&self) -> ChannelContribution {
        let state = self.state.lock().unwrap();
        ChannelContribution {
            funding_amount: state.request.local_amount,
            basepoints: state.our_basepoints,
            first_commitment_point: state.our_first_point,
            dust_limit: state.our_dust_limit,
            upfront_shutdown: state.upfront_shutdown.clone(),
        }
    }

    fn process_contribution(&mut self, remote: RemoteContribution) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.remote = Some(remote);
        MockReservation::build_funding(&mut state, &self.secp);
        if state.is_psbt {
            let funding_tx = state.funding_tx.as_ref().expect("funding built above");
            let funding_address = Address::from_script(
                &funding_tx.output[0].script_pubkey,
                Network::Regtest,
            )
            .expect("p2wsh script has an address");
            state.psbt_state = PsbtState::AwaitingFunding {
                funding_address,
                funding_amount: funding_tx.output[0].value,
                psbt: b"draft psbt".to_vec(),
            };
            return Err(Error::PsbtFundingRequired);
        }
        Ok(())
    }

    fn process_single_contribution(&mut self, remote: RemoteContribution) -> Result<(), Error> {
        self.state.lock().unwrap().remote = Some(remote);
        Ok(())
    }

    fn process_psbt(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        match state.psbt_state {
            PsbtState::Ready => {}
            _ => {
                return Err(Error::InvalidState(
                    "no verified PSBT for this reservation".to_string(),
                ))
            }
        }
        if state.funding_outpoint.is_none() {
            MockReservation::build_funding(&mut state, &self.secp);
        }
        Ok(())
    }

    fn funding_outpoint(&self) -> Result<OutPoint, Error> {
        self.state
            .lock()
            .unwrap()
            .funding_outpoint
            .ok_or_else(|| Error::InvalidState("funding outpoint not known yet".to_string()))
    }

    fn our_signatures(&self) -> Result<Signature, Error> {
        let state = self.state.lock().unwrap();
        let secp = Secp256k1::new();
        let digest = sha256d::Hash::hash(&state.request.temporary_channel_id);
        let message =
            Message::from_slice(digest.as_byte_array()).expect("digest is a valid message");
        Ok(secp.sign_ecdsa(&message, &state.funding_secret))
    }

    fn complete_reservation(
        &mut self,
        _their_commit_sig: &Signature,
    ) -> Result<FundedChannel, Error> {
        let channel = {
            let mut state = self.state.lock().unwrap();
            state.completed = true;
            self.build_channel(&state, true)
        };
        self.channel_db.insert_channel(channel.clone());
        Ok(channel)
    }

    fn complete_reservation_single(
        &mut self,
        funding_outpoint: &OutPoint,
        _their_commit_sig: &Signature,
    ) -> Result<FundedChannel, Error> {
        let channel = {
            let mut state = self.state.lock().unwrap();
            state.funding_outpoint = Some(*funding_outpoint);
            state.completed = true;
            self.build_channel(&state, false)
        };
        self.channel_db.insert_channel(channel.clone());
        Ok(channel)
    }

    fn cancel(&mut self) -> Result<(), Error> {
        self.state.lock().unwrap().cancel_count += 1;
        Ok(())
    }

    fn capacity(&self) -> u64 {
        let state = self.state.lock().unwrap();
        state.request.local_amount + state.request.remote_amount
    }

    fn is_psbt(&self) -> bool {
        self.state.lock().unwrap().is_psbt
    }

    fn is_canned_shim(&self) -> bool {
        self.state.lock().unwrap().is_canned_shim
    }

    fn psbt_state(&self) -> PsbtState {
        self.state.lock().unwrap().psbt_state.clone()
    }

    fn mark_remote_canceled(&mut self) {
        self.state.lock().unwrap().psbt_state = PsbtState::RemoteCanceled;
    }
}

/// Wallet mock handing out deterministic keys and fabricated funding
/// transactions. Reservation state is kept shared so tests can inspect and
/// drive individual reservations.
pub struct MockWallet {
    chain: Arc<MockChainNotifier>,
    channel_db: Arc<MockChannelDatabase>,
    secp: Secp256k1<All>,
    key_seed: u8,
    counter: Mutex<u8>,
    reservations: Mutex<HashMap<ChannelId, Arc<Mutex<ReservationState>>>>,
    psbt_flows: Mutex<HashSet<ChannelId>>,
    shims: Mutex<HashSet<ChannelId>>,
    synced: Mutex<bool>,
    reservation_error: Mutex<Option<String>>,
    fail_publish: Mutex<bool>,
    published: Mutex<Vec<(Transaction, String)>>,
    labels: Mutex<Vec<(Txid, String)>>,
}

impl MockWallet {
    /// Creates a new wallet deriving its keys from the given seed byte,
    /// which must differ between the two wallets of a test.
    pub fn new(
        chain: Arc<MockChainNotifier>,
        channel_db: Arc<MockChannelDatabase>,
        key_seed: u8,
    ) -> Self {
        MockWallet {
            chain,
            channel_db,
            secp: Secp256k1::new(),
            key_seed,
            counter: Mutex::new(0),
            reservations: Mutex::new(HashMap::new()),
            psbt_flows: Mutex::new(HashSet::new()),
            shims: Mutex::new(HashSet::new()),
            synced: Mutex::new(true),
            reservation_error: Mutex::new(None),
            fail_publish: Mutex::new(false),
            published: Mutex::new(Vec::new()),
            labels: Mutex::new(Vec::new()),
        }
    }

    pub fn set_synced(&self, synced: bool) {
        *self.synced.lock().unwrap() = synced;
    }

    /// Makes the next reservation attempts fail with the given reservation
    /// error text.
    pub fn set_reservation_error(&self, error: Option<String>) {
        *self.reservation_error.lock().unwrap() = error;
    }

    pub fn set_fail_publish(&self, fail: bool) {
        *self.fail_publish.lock().unwrap() = fail;
    }

    /// Registers the given temporary channel id as requiring externally
    /// assembled (PSBT) funding.
    pub fn register_psbt_flow(&self, temp_chan_id: ChannelId) {
        self.psbt_flows.lock().unwrap().insert(temp_chan_id);
    }

    /// Registers the given temporary channel id as a canned funding shim,
    /// exempting it from the pending channel limit.
    pub fn register_shim(&self, temp_chan_id: ChannelId) {
        self.shims.lock().unwrap().insert(temp_chan_id);
    }

    /// The shared state of the reservation with the given temporary id.
    pub fn reservation_state(
        &self,
        temp_chan_id: &ChannelId,
    ) -> Option<Arc<Mutex<ReservationState>>> {
        self.reservations.lock().unwrap().get(temp_chan_id).cloned()
    }

    /// Marks the PSBT of the given reservation as funded, signed and
    /// verified.
    pub fn psbt_finalize(&self, temp_chan_id: &ChannelId) {
        if let Some(state) = self.reservation_state(temp_chan_id) {
            state.lock().unwrap().psbt_state = PsbtState::Ready;
        }
    }

    /// Marks the PSBT flow of the given reservation as abandoned by the
    /// user.
    pub fn psbt_user_cancel(&self, temp_chan_id: &ChannelId) {
        if let Some(state) = self.reservation_state(temp_chan_id) {
            state.lock().unwrap().psbt_state = PsbtState::UserCanceled;
        }
    }

    pub fn published_transactions(&self) -> Vec<(Transaction, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn transaction_labels(&self) -> Vec<(Txid, String)> {
        self.labels.lock().unwrap().clone()
    }

    fn next_secret(&self) -> SecretKey {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        let mut bytes = [0u8; 32];
        bytes[0] = self.key_seed;
        bytes[1] = *counter;
        bytes[31] = 1;
        SecretKey::from_slice(&bytes).expect("valid secret key")
    }

    fn next_pubkey(&self) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, &self.next_secret())
    }
}

impl Wallet for MockWallet {
    fn init_channel_reservation(
        &self,
        request: &InitFundingRequest,
    ) -> Result<Box<dyn ChannelReservation>, Error> {
        if let Some(error) = &*self.reservation_error.lock().unwrap() {
            return Err(Error::Reservation(error.clone()));
        }

        let funding_secret = self.next_secret();
        let basepoints = ChannelBasepoints {
            funding_pubkey: PublicKey::from_secret_key(&self.secp, &funding_secret),
            revocation: self.next_pubkey(),
            payment: self.next_pubkey(),
            delayed_payment: self.next_pubkey(),
            htlc: self.next_pubkey(),
        };
        let mut commitment_seed = [0u8; 32];
        commitment_seed[..32].copy_from_slice(&funding_secret.secret_bytes());

        let state = Arc::new(Mutex::new(ReservationState {
            request: request.clone(),
            our_basepoints: basepoints,
            our_first_point: self.next_pubkey(),
            our_dust_limit: 573,
            upfront_shutdown: None,
            num_confs_required: 1,
            local_constraints: None,
            remote: None,
            funding_tx: None,
            funding_outpoint: None,
            commitment_seed,
            funding_secret,
            is_psbt: self
                .psbt_flows
                .lock()
                .unwrap()
                .contains(&request.temporary_channel_id),
            psbt_state: PsbtState::NotRequired,
            is_canned_shim: self
                .shims
                .lock()
                .unwrap()
                .contains(&request.temporary_channel_id),
            cancel_count: 0,
            completed: false,
        }));

        self.reservations
            .lock()
            .unwrap()
            .insert(request.temporary_channel_id, state.clone());

        Ok(Box::new(MockReservation {
            state,
            channel_db: self.channel_db.clone(),
            chain: self.chain.clone(),
            secp: Secp256k1::new(),
        }))
    }

    fn new_shutdown_script(&self) -> Result<ScriptBuf, Error> {
        let mut script = vec![0x00, 0x14];
        script.extend_from_slice(&[self.key_seed; 20]);
        Ok(ScriptBuf::from(script))
    }

    fn is_synced(&self) -> Result<bool, Error> {
        Ok(*self.synced.lock().unwrap())
    }

    fn validate_channel(
        &self,
        channel: &FundedChannel,
        funding_tx: &Transaction,
    ) -> Result<(), Error> {
        let vout = channel.funding_outpoint.vout as usize;
        let output = funding_tx
            .output
            .get(vout)
            .ok_or_else(|| Error::Wallet("funding output missing".to_string()))?;
        if output.script_pubkey != channel.funding_script() {
            return Err(Error::Wallet(
                "funding output pays to an unexpected script".to_string(),
            ));
        }
        if output.value != channel.capacity {
            return Err(Error::Wallet("funding output value mismatch".to_string()));
        }
        Ok(())
    }

    fn publish_transaction(&self, tx: &Transaction, label: &str) -> Result<(), Error> {
        if *self.fail_publish.lock().unwrap() {
            return Err(Error::Wallet("broadcast failed".to_string()));
        }
        self.published
            .lock()
            .unwrap()
            .push((tx.clone(), label.to_string()));
        Ok(())
    }

    fn update_transaction_label(&self, txid: &Txid, label: &str) -> Result<(), Error> {
        self.labels.lock().unwrap().push((*txid, label.to_string()));
        Ok(())
    }
}
