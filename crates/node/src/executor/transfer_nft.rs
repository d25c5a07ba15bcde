use crate::executor::{copied, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{TransferNftTx, TxInfo};
use keel_ledger::tx_detail::{NftSnapshot, TxDetail};

pub struct TransferNftExecutor {
    base: BaseExecutor,
    tx_info: TransferNftTx,
}

impl TransferNftExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: TransferNftTx) -> Self {
        TransferNftExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
        }
    }
}

impl TxExecutor for TransferNftExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        self.base.mark_nft_dirty(t.nft_index);
        self.base
            .mark_account_assets_dirty(t.from_account_index, &[t.gas_fee_asset_id]);
        // Keeps the recipient's group present in the tx details.
        self.base.mark_account_assets_dirty(t.to_account_index, &[]);
        self.base
            .mark_account_assets_dirty(t.gas_account_index, &[t.gas_fee_asset_id]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError> {
        self.base.verify_inputs(state, opts)?;
        let t = &self.tx_info;

        let from_account = state.get_account(t.from_account_index)?;
        let have = from_account.balance_of(t.gas_fee_asset_id);
        if have < t.gas_fee_asset_amount {
            return Err(TxError::BalanceNotEnough {
                asset_id: t.gas_fee_asset_id,
                have,
                need: t.gas_fee_asset_amount,
            });
        }

        let to_account = state.get_account(t.to_account_index)?;
        if from_account.account_index == to_account.account_index {
            return Err(TxError::InvalidToAccount);
        }
        if to_account.l1_address != t.to_l1_address {
            return Err(TxError::InvalidToAccount);
        }

        let nft = state.get_nft(t.nft_index)?;
        if nft.owner_account_index != t.from_account_index {
            return Err(TxError::NotNftOwner);
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut from_account = state.get_account(t.from_account_index)?;
        let mut nft = state.get_nft(t.nft_index)?;

        from_account.debit(t.gas_fee_asset_id, t.gas_fee_asset_amount)?;
        from_account.nonce += 1;
        nft.owner_account_index = t.to_account_index;

        state.set_pending_account(t.from_account_index, from_account);
        state.set_pending_nft(t.nft_index, nft);
        state.set_pending_gas(t.gas_fee_asset_id, t.gas_fee_asset_amount);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::TransferNft(self.tx_info.clone()))?;
        self.base.append_pubdata(state, record);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::TransferNft(self.tx_info.clone());
        tx.nft_index = Some(self.tx_info.nft_index);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let nft = state.get_nft(t.nft_index)?;
        let mut copies = state.deep_copy_accounts(&[
            t.from_account_index,
            t.to_account_index,
            t.gas_account_index,
        ])?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(
            copied(&mut copies, t.from_account_index)?,
            t.gas_fee_asset_id,
            -(t.gas_fee_asset_amount as i128),
            None,
            false,
        )?;
        builder.fungible(
            copied(&mut copies, t.to_account_index)?,
            t.gas_fee_asset_id,
            0,
            None,
            false,
        )?;
        let old = NftSnapshot::from(&nft);
        let mut new = old.clone();
        new.owner_account_index = t.to_account_index;
        let to_account = copied(&mut copies, t.to_account_index)?.clone();
        builder.nft(&to_account, old, new);
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
