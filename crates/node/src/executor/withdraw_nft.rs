use crate::executor::{copied, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::error::TxError;
use keel_ledger::nft::Nft;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{TxInfo, WithdrawNftTx};
use keel_ledger::tx_detail::{NftSnapshot, TxDetail};

/// Withdraws an NFT to L1: charges gas, zeroes the leaf, and emits an
/// on-chain op describing the token for the settlement contract.
pub struct WithdrawNftExecutor {
    base: BaseExecutor,
    tx_info: WithdrawNftTx,
}

impl WithdrawNftExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: WithdrawNftTx) -> Self {
        WithdrawNftExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
        }
    }
}

impl TxExecutor for WithdrawNftExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        // Fill creator fields from the live leaf; the on-chain record must
        // describe the token fully.
        let nft = state.get_nft(self.tx_info.nft_index)?;
        self.tx_info.creator_account_index = nft.creator_account_index;
        self.tx_info.creator_treasury_rate = nft.creator_treasury_rate;
        self.tx_info.collection_id = nft.collection_id;
        self.tx_info.nft_content_hash = nft.nft_content_hash;
        if let Ok(creator) = state.get_account(nft.creator_account_index) {
            self.tx_info.creator_l1_address = creator.l1_address;
        }

        let t = &self.tx_info;
        self.base.mark_nft_dirty(t.nft_index);
        self.base
            .mark_account_assets_dirty(t.account_index, &[t.gas_fee_asset_id]);
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
        let nft = state.get_nft(t.nft_index)?;
        if nft.owner_account_index != t.account_index {
            return Err(TxError::NotNftOwner);
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut account = state.get_account(t.account_index)?;
        account.debit(t.gas_fee_asset_id, t.gas_fee_asset_amount)?;
        account.nonce += 1;

        state.set_pending_account(t.account_index, account);
        state.set_pending_nft(t.nft_index, Nft::empty(t.nft_index));
        state.set_pending_gas(t.gas_fee_asset_id, t.gas_fee_asset_amount);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::WithdrawNft(self.tx_info.clone()))?;
        self.base.append_onchain_pubdata(state, record, false, true);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::WithdrawNft(self.tx_info.clone());
        tx.nft_index = Some(self.tx_info.nft_index);
        tx.collection_id = Some(self.tx_info.collection_id);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let nft = state.get_nft(t.nft_index)?;
        let mut copies = state.deep_copy_accounts(&[t.account_index, t.gas_account_index])?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(
            copied(&mut copies, t.account_index)?,
            t.gas_fee_asset_id,
            -(t.gas_fee_asset_amount as i128),
            None,
            false,
        )?;
        let owner = copied(&mut copies, t.account_index)?.clone();
        builder.nft(
            &owner,
            NftSnapshot::from(&nft),
            NftSnapshot::empty(t.nft_index),
        );
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
