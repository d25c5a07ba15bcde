use crate::executor::{BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{FullExitTx, TxInfo};
use keel_ledger::tx_detail::TxDetail;

/// Forced exit of one asset, requested on L1. An unknown L1 address takes
/// the empty-account path: a zero-amount record is emitted, no account is
/// created, and the priority counter still advances.
pub struct FullExitExecutor {
    base: BaseExecutor,
    tx_info: FullExitTx,
    empty_account: bool,
}

impl FullExitExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: FullExitTx) -> Self {
        FullExitExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
            empty_account: false,
        }
    }
}

impl TxExecutor for FullExitExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        match state.get_account_by_l1_address(&self.tx_info.l1_address) {
            Ok(account) => {
                self.empty_account = false;
                self.tx_info.account_index = account.account_index;
                self.tx_info.asset_amount = account.balance_of(self.tx_info.asset_id);
                self.base
                    .mark_account_assets_dirty(account.account_index, &[self.tx_info.asset_id]);
            }
            Err(_) => {
                self.empty_account = true;
                self.tx_info.account_index = 0;
                self.tx_info.asset_amount = 0;
            }
        }
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, _state: &StateDb, _opts: VerifyOpts) -> Result<(), TxError> {
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        if self.empty_account {
            return Ok(());
        }
        let t = &self.tx_info;
        let mut account = state.get_account(t.account_index)?;
        account.debit(t.asset_id, t.asset_amount)?;
        if t.asset_amount != 0 {
            state.set_pending_account(t.account_index, account);
        }
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::FullExit(self.tx_info.clone()))?;
        self.base.append_onchain_pubdata(state, record, true, true);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::FullExit(self.tx_info.clone());
        tx.account_index = Some(self.tx_info.account_index);
        tx.asset_id = Some(self.tx_info.asset_id as u64);
        tx.tx_amount = Some(self.tx_info.asset_amount);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        if self.empty_account {
            return Ok(Vec::new());
        }
        let t = &self.tx_info;
        let mut account = state.get_account(t.account_index)?;
        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(&mut account, t.asset_id, -(t.asset_amount as i128), None, false)?;
        Ok(builder.build())
    }

    fn finalize(&mut self, _state: &mut StateDb) -> Result<(), TxError> {
        Ok(())
    }
}
