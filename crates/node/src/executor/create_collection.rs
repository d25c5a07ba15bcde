use crate::executor::{copied, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{CreateCollectionTx, TxInfo};
use keel_ledger::tx_detail::TxDetail;

pub struct CreateCollectionExecutor {
    base: BaseExecutor,
    tx_info: CreateCollectionTx,
}

impl CreateCollectionExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: CreateCollectionTx) -> Self {
        CreateCollectionExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
        }
    }
}

impl TxExecutor for CreateCollectionExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        self.base
            .mark_account_assets_dirty(t.account_index, &[t.gas_fee_asset_id]);
        self.base
            .mark_account_assets_dirty(t.gas_account_index, &[t.gas_fee_asset_id]);
        self.base.prepare(state)?;

        // The new collection takes the account's current collection nonce.
        let account = state.get_account(self.tx_info.account_index)?;
        self.tx_info.collection_id = account.collection_nonce as u16;
        Ok(())
    }

    fn verify_inputs(&mut self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError> {
        self.tx_info.metadata.validate()?;
        self.base.verify_inputs(state, opts)?;
        let t = &self.tx_info;
        let account = state.get_account(t.account_index)?;
        let have = account.balance_of(t.gas_fee_asset_id);
        if have < t.gas_fee_asset_amount {
            return Err(TxError::BalanceNotEnough {
                asset_id: t.gas_fee_asset_id,
                have,
                need: t.gas_fee_asset_amount,
            });
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut account = state.get_account(t.account_index)?;
        account.debit(t.gas_fee_asset_id, t.gas_fee_asset_amount)?;
        account.nonce += 1;
        account.collection_nonce += 1;

        state.set_pending_account(t.account_index, account);
        state.set_pending_gas(t.gas_fee_asset_id, t.gas_fee_asset_amount);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::CreateCollection(self.tx_info.clone()))?;
        self.base.append_pubdata(state, record);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::CreateCollection(self.tx_info.clone());
        tx.collection_id = Some(self.tx_info.collection_id);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let mut copies = state.deep_copy_accounts(&[t.account_index, t.gas_account_index])?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.collection_nonce(copied(&mut copies, t.account_index)?);
        builder.fungible(
            copied(&mut copies, t.account_index)?,
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
