use crate::executor::{BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::account::Account;
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tree::NIL_ASSET_ROOT;
use keel_ledger::tx::{DepositTx, TxInfo};
use keel_ledger::tx_detail::TxDetail;

/// Priority deposit: credits the target account, creating it first when the
/// L1 address is unknown. No fee, no signature, no nonce change.
pub struct DepositExecutor {
    base: BaseExecutor,
    tx_info: DepositTx,
    creates_account: bool,
}

impl DepositExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: DepositTx) -> Self {
        DepositExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
            creates_account: false,
        }
    }
}

impl TxExecutor for DepositExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        // The account index in the L1 event is advisory; resolve by address.
        match state.get_account_by_l1_address(&self.tx_info.l1_address) {
            Ok(account) => {
                self.creates_account = false;
                self.tx_info.account_index = account.account_index;
            }
            Err(_) => {
                self.creates_account = true;
                self.tx_info.account_index = state.next_account_index();
            }
        }
        self.base
            .mark_account_assets_dirty(self.tx_info.account_index, &[self.tx_info.asset_id]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, _state: &StateDb, _opts: VerifyOpts) -> Result<(), TxError> {
        // Priority ops were validated on L1; nothing to check here.
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut account = if self.creates_account {
            Account::new(t.account_index, t.l1_address, *NIL_ASSET_ROOT)
        } else {
            state.get_account(t.account_index)?
        };
        account.credit(t.asset_id, t.asset_amount);
        state.set_pending_account(t.account_index, account);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::Deposit(self.tx_info.clone()))?;
        self.base.append_onchain_pubdata(state, record, true, true);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::Deposit(self.tx_info.clone());
        tx.account_index = Some(self.tx_info.account_index);
        tx.asset_id = Some(self.tx_info.asset_id as u64);
        tx.tx_amount = Some(self.tx_info.asset_amount);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let mut account = if self.creates_account {
            Account::new(t.account_index, t.l1_address, *NIL_ASSET_ROOT)
        } else {
            state.get_account(t.account_index)?
        };
        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(&mut account, t.asset_id, t.asset_amount as i128, None, false)?;
        Ok(builder.build())
    }

    fn finalize(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        if self.creates_account {
            state.advance_account_index();
        }
        Ok(())
    }
}
