use crate::executor::{copied, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{TxInfo, WithdrawTx};
use keel_ledger::tx_detail::TxDetail;

/// L2-originated withdrawal: debits the sender, charges gas, and emits an
/// on-chain op carrying the target L1 address.
pub struct WithdrawExecutor {
    base: BaseExecutor,
    tx_info: WithdrawTx,
}

impl WithdrawExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: WithdrawTx) -> Self {
        WithdrawExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
        }
    }
}

impl TxExecutor for WithdrawExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        self.base
            .mark_account_assets_dirty(t.from_account_index, &[t.asset_id, t.gas_fee_asset_id]);
        self.base
            .mark_account_assets_dirty(t.gas_account_index, &[t.gas_fee_asset_id]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError> {
        self.base.verify_inputs(state, opts)?;
        let t = &self.tx_info;
        let from_account = state.get_account(t.from_account_index)?;
        if t.asset_id == t.gas_fee_asset_id {
            let need = t.asset_amount + t.gas_fee_asset_amount;
            let have = from_account.balance_of(t.asset_id);
            if have < need {
                return Err(TxError::BalanceNotEnough {
                    asset_id: t.asset_id,
                    have,
                    need,
                });
            }
        } else {
            let have = from_account.balance_of(t.asset_id);
            if have < t.asset_amount {
                return Err(TxError::BalanceNotEnough {
                    asset_id: t.asset_id,
                    have,
                    need: t.asset_amount,
                });
            }
            let have_fee = from_account.balance_of(t.gas_fee_asset_id);
            if have_fee < t.gas_fee_asset_amount {
                return Err(TxError::BalanceNotEnough {
                    asset_id: t.gas_fee_asset_id,
                    have: have_fee,
                    need: t.gas_fee_asset_amount,
                });
            }
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut from_account = state.get_account(t.from_account_index)?;
        from_account.debit(t.asset_id, t.asset_amount)?;
        from_account.debit(t.gas_fee_asset_id, t.gas_fee_asset_amount)?;
        from_account.nonce += 1;

        state.set_pending_account(t.from_account_index, from_account);
        state.set_pending_gas(t.gas_fee_asset_id, t.gas_fee_asset_amount);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::Withdraw(self.tx_info.clone()))?;
        // On-chain op but not a priority request: the withdrawal is executed
        // on L1 at verify time.
        self.base.append_onchain_pubdata(state, record, false, true);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::Withdraw(self.tx_info.clone());
        tx.asset_id = Some(self.tx_info.asset_id as u64);
        tx.tx_amount = Some(self.tx_info.asset_amount);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let mut copies =
            state.deep_copy_accounts(&[t.from_account_index, t.gas_account_index])?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(
            copied(&mut copies, t.from_account_index)?,
            t.asset_id,
            -(t.asset_amount as i128),
            None,
            false,
        )?;
        builder.fungible(
            copied(&mut copies, t.from_account_index)?,
            t.gas_fee_asset_id,
            -(t.gas_fee_asset_amount as i128),
            None,
            false,
        )?;
        builder.fungible(
            copied(&mut copies, t.gas_account_index)?,
            t.gas_fee_asset_id,
            t.gas_fee_asset_amount as i128,
            None,
            true,
        )?;
        Ok(builder.build())
    }

    fn finalize(&mut self, _state: &mut StateDb) -> Result<(), TxError> {
        Ok(())
    }
}
