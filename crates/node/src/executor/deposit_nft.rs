use crate::executor::{BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::account::Account;
use keel_ledger::error::TxError;
use keel_ledger::nft::Nft;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tree::NIL_ASSET_ROOT;
use keel_ledger::tx::{DepositNftTx, TxInfo};
use keel_ledger::tx_detail::{NftSnapshot, TxDetail};

/// Priority NFT deposit: installs the leaf minted on L1 under the target
/// account, creating the account when its L1 address is unknown.
pub struct DepositNftExecutor {
    base: BaseExecutor,
    tx_info: DepositNftTx,
    creates_account: bool,
}

impl DepositNftExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: DepositNftTx) -> Self {
        DepositNftExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
            creates_account: false,
        }
    }

    fn new_nft(&self) -> Nft {
        let t = &self.tx_info;
        Nft {
            nft_index: t.nft_index,
            creator_account_index: t.creator_account_index,
            owner_account_index: t.account_index,
            nft_content_hash: t.nft_content_hash,
            creator_treasury_rate: t.creator_treasury_rate,
            collection_id: t.collection_id,
            ipns_name: None,
            ipns_id: None,
            metadata: None,
        }
    }
}

impl TxExecutor for DepositNftExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
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
        self.base.mark_nft_dirty(self.tx_info.nft_index);
        self.base
            .mark_account_assets_dirty(self.tx_info.account_index, &[]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, state: &StateDb, _opts: VerifyOpts) -> Result<(), TxError> {
        // The target leaf must be vacant.
        if let Ok(existing) = state.get_nft(self.tx_info.nft_index) {
            if !existing.is_empty() {
                return Err(TxError::InvalidTxInfo);
            }
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        if self.creates_account {
            let account = Account::new(t.account_index, t.l1_address, *NIL_ASSET_ROOT);
            state.set_pending_account(t.account_index, account);
        }
        state.set_pending_nft(t.nft_index, self.new_nft());
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::DepositNft(self.tx_info.clone()))?;
        self.base.append_onchain_pubdata(state, record, true, true);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::DepositNft(self.tx_info.clone());
        tx.account_index = Some(self.tx_info.account_index);
        tx.nft_index = Some(self.tx_info.nft_index);
        tx.collection_id = Some(self.tx_info.collection_id);
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
        // Empty fungible delta keeps the account group present for the
        // witness; the NFT row carries the actual change.
        builder.fungible(&mut account, 0, 0, None, false)?;
        builder.nft(
            &account,
            NftSnapshot::empty(t.nft_index),
            NftSnapshot::from(&self.new_nft()),
        );
        Ok(builder.build())
    }

    fn finalize(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        if self.creates_account {
            state.advance_account_index();
        }
        Ok(())
    }
}
