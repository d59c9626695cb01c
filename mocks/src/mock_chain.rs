use bitcoin::{ScriptBuf, Transaction, Txid};
use funding_manager::error::Error;
use funding_manager::{ChainNotifier, TxConfirmation};
use lightning::chain::chaininterface::{ConfirmationTarget, FeeEstimator};
use std::collections::HashMap;
use std::sync::Mutex;

struct ConfirmedTx {
    block_height: u32,
    tx_index: u32,
    tx: Transaction,
}

/// Chain notifier mock tracking a best height and a set of confirmed
/// transactions, both controlled by the test.
pub struct MockChainNotifier {
    height: Mutex<u32>,
    confirmed: Mutex<HashMap<Txid, ConfirmedTx>>,
    max_confs: u32,
}

impl MockChainNotifier {
    pub fn new(height: u32) -> Self {
        MockChainNotifier {
            height: Mutex::new(height),
            confirmed: Mutex::new(HashMap::new()),
            max_confs: 1008,
        }
    }

    pub fn current_height(&self) -> u32 {
        *self.height.lock().unwrap()
    }

    pub fn set_height(&self, height: u32) {
        *self.height.lock().unwrap() = height;
    }

    pub fn mine_blocks(&self, count: u32) {
        *self.height.lock().unwrap() += count;
    }

    /// Records the transaction as included in the next block.
    pub fn confirm_transaction(&self, tx: &Transaction) {
        let mut height = self.height.lock().unwrap();
        *height += 1;
        self.confirmed.lock().unwrap().insert(
            tx.txid(),
            ConfirmedTx {
                block_height: *height,
                tx_index: 1,
                tx: tx.clone(),
            },
        );
    }

    /// Records the transaction as included at the given position.
    pub fn confirm_transaction_at(&self, tx: &Transaction, block_height: u32, tx_index: u32) {
        self.confirmed.lock().unwrap().insert(
            tx.txid(),
            ConfirmedTx {
                block_height,
                tx_index,
                tx: tx.clone(),
            },
        );
        let mut height = self.height.lock().unwrap();
        if *height < block_height {
            *height = block_height;
        }
    }
}

impl ChainNotifier for MockChainNotifier {
    fn best_height(&self) -> Result<u32, Error> {
        Ok(self.current_height())
    }

    fn tx_confirmation_info(
        &self,
        txid: &Txid,
        _script: &ScriptBuf,
        _from_height: u32,
    ) -> Result<Option<TxConfirmation>, Error> {
        let confirmed = self.confirmed.lock().unwrap();
        let entry = match confirmed.get(txid) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let best_height = self.current_height();
        if best_height < entry.block_height {
            return Ok(None);
        }
        Ok(Some(TxConfirmation {
            block_height: entry.block_height,
            tx_index: entry.tx_index,
            confirmations: best_height - entry.block_height + 1,
            tx: entry.tx.clone(),
        }))
    }

    fn max_supported_confs(&self) -> u32 {
        self.max_confs
    }
}

/// Fee estimator returning a fixed rate.
pub struct MockFeeEstimator {
    pub sat_per_kw: u32,
}

impl FeeEstimator for MockFeeEstimator {
    fn get_est_sat_per_1000_weight(&self, _confirmation_target: ConfirmationTarget) -> u32 {
        self.sat_per_kw
    }
}
