use crate::executor::{BaseExecutor, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::account::Account;
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tree::NIL_ASSET_ROOT;
use keel_ledger::tx::{RegisterZnsTx, TxInfo};
use keel_ledger::tx_detail::TxDetail;
use keel_ledger::types::{AccountStatus, PUBKEY_BYTES};

/// L1-originated registration: creates the account for a fresh L1 address or
/// rotates the public key of an existing one. Pubdata is emitted only for
/// the first registration.
pub struct RegisterZnsExecutor {
    base: BaseExecutor,
    tx_info: RegisterZnsTx,
    creates_account: bool,
}

impl RegisterZnsExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: RegisterZnsTx) -> Self {
        RegisterZnsExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
            creates_account: false,
        }
    }
}

impl TxExecutor for RegisterZnsExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        match state.get_account_by_l1_address(&self.tx_info.l1_address) {
            Ok(existing) => {
                self.creates_account = false;
                self.tx_info.account_index = existing.account_index;
            }
            Err(_) => {
                self.creates_account = true;
                self.tx_info.account_index = state.next_account_index();
            }
        }
        self.base
            .mark_account_assets_dirty(self.tx_info.account_index, &[]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, _state: &StateDb, _opts: VerifyOpts) -> Result<(), TxError> {
        let t = &self.tx_info;
        if t.l1_address.is_zero() {
            return Err(TxError::InvalidL1Address);
        }
        if t.public_key.as_bytes().len() != PUBKEY_BYTES || t.public_key.is_empty() {
            return Err(TxError::InvalidTxInfo);
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut account = if self.creates_account {
            let mut account = Account::new(t.account_index, t.l1_address, *NIL_ASSET_ROOT);
            account.status = AccountStatus::Confirmed;
            account
        } else {
            state.get_account(t.account_index)?
        };
        account.public_key = t.public_key.clone();
        state.set_pending_account(t.account_index, account);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        // A key rotation replays the priority request without new pubdata.
        let record = encode_tx_pubdata(&TxInfo::RegisterZns(self.tx_info.clone()))?;
        if self.creates_account {
            self.base.append_onchain_pubdata(state, record, true, false);
        } else {
            state.priority_operations += 1;
        }
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::RegisterZns(self.tx_info.clone());
        tx.account_index = Some(self.tx_info.account_index);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, _state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        // The registration has no balance movement; the witness helper
        // synthesizes the empty-account before-image on its own.
        Ok(Vec::new())
    }

    fn finalize(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        if self.creates_account {
            state.advance_account_index();
        }
        Ok(())
    }
}
