use crate::executor::{copied, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::account::{offer_slot, set_offer_bit};
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{CancelOfferTx, TxInfo};
use keel_ledger::tx_detail::TxDetail;

/// Sets the submitter's own offer bit and charges gas.
pub struct CancelOfferExecutor {
    base: BaseExecutor,
    tx_info: CancelOfferTx,
}

impl CancelOfferExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: CancelOfferTx) -> Self {
        CancelOfferExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
        }
    }
}

impl TxExecutor for CancelOfferExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let (offer_asset, _) = offer_slot(t.offer_id);
        self.base
            .mark_account_assets_dirty(t.account_index, &[t.gas_fee_asset_id, offer_asset]);
        self.base
            .mark_account_assets_dirty(t.gas_account_index, &[t.gas_fee_asset_id]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError> {
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
        if account.is_offer_consumed(t.offer_id) {
            return Err(TxError::OfferAlreadyConsumed);
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut account = state.get_account(t.account_index)?;
        account.debit(t.gas_fee_asset_id, t.gas_fee_asset_amount)?;
        account.nonce += 1;
        account.consume_offer(t.offer_id)?;

        state.set_pending_account(t.account_index, account);
        state.set_pending_gas(t.gas_fee_asset_id, t.gas_fee_asset_amount);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::CancelOffer(self.tx_info.clone()))?;
        self.base.append_pubdata(state, record);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::CancelOffer(self.tx_info.clone());
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let (offer_asset, bit) = offer_slot(t.offer_id);
        let mut copies = state.deep_copy_accounts(&[t.account_index, t.gas_account_index])?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(
            copied(&mut copies, t.account_index)?,
            t.gas_fee_asset_id,
            -(t.gas_fee_asset_amount as i128),
            None,
            false,
        )?;
        let account = copied(&mut copies, t.account_index)?;
        let new_bitmap = set_offer_bit(
            account.asset(offer_asset).offer_canceled_or_finalized,
            bit,
        );
        builder.fungible(account, offer_asset, 0, Some(new_bitmap), false)?;
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
