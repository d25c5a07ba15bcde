use crate::executor::{BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::address::L1Address;
use keel_ledger::error::TxError;
use keel_ledger::nft::Nft;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{FullExitNftTx, TxInfo};
use keel_ledger::tx_detail::{NftSnapshot, TxDetail};

/// Forced NFT exit requested on L1. When the address is unknown or the NFT
/// is not owned by it, a zero-filled record is emitted and nothing mutates;
/// priority bookkeeping always advances.
pub struct FullExitNftExecutor {
    base: BaseExecutor,
    tx_info: FullExitNftTx,
    exits_nft: bool,
}

impl FullExitNftExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: FullExitNftTx) -> Self {
        FullExitNftExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
            exits_nft: false,
        }
    }

    fn zero_fill(&mut self) {
        self.exits_nft = false;
        self.tx_info.creator_account_index = 0;
        self.tx_info.creator_l1_address = L1Address::default();
        self.tx_info.creator_treasury_rate = 0;
        self.tx_info.collection_id = 0;
        self.tx_info.nft_content_hash = [0u8; 32];
    }
}

impl TxExecutor for FullExitNftExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let owner = state.get_account_by_l1_address(&self.tx_info.l1_address);
        let nft = state.get_nft(self.tx_info.nft_index);
        match (owner, nft) {
            (Ok(account), Ok(nft)) if nft.owner_account_index == account.account_index => {
                self.exits_nft = true;
                self.tx_info.account_index = account.account_index;
                self.tx_info.creator_account_index = nft.creator_account_index;
                self.tx_info.creator_treasury_rate = nft.creator_treasury_rate;
                self.tx_info.collection_id = nft.collection_id;
                self.tx_info.nft_content_hash = nft.nft_content_hash;
                if let Ok(creator) = state.get_account(nft.creator_account_index) {
                    self.tx_info.creator_l1_address = creator.l1_address;
                }
                self.base.mark_nft_dirty(self.tx_info.nft_index);
                self.base
                    .mark_account_assets_dirty(account.account_index, &[]);
            }
            (Ok(account), _) => {
                self.tx_info.account_index = account.account_index;
                self.zero_fill();
            }
            (Err(_), _) => {
                self.tx_info.account_index = 0;
                self.zero_fill();
            }
        }
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, _state: &StateDb, _opts: VerifyOpts) -> Result<(), TxError> {
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        if self.exits_nft {
            state.set_pending_nft(self.tx_info.nft_index, Nft::empty(self.tx_info.nft_index));
        }
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::FullExitNft(self.tx_info.clone()))?;
        self.base.append_onchain_pubdata(state, record, true, true);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::FullExitNft(self.tx_info.clone());
        tx.account_index = Some(self.tx_info.account_index);
        tx.nft_index = Some(self.tx_info.nft_index);
        tx.collection_id = Some(self.tx_info.collection_id);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        if !self.exits_nft {
            return Ok(Vec::new());
        }
        let t = &self.tx_info;
        let nft = state.get_nft(t.nft_index)?;
        let mut account = state.get_account(t.account_index)?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(&mut account, 0, 0, None, false)?;
        builder.nft(
            &account,
            NftSnapshot::from(&nft),
            NftSnapshot::empty(t.nft_index),
        );
        Ok(builder.build())
    }

    fn finalize(&mut self, _state: &mut StateDb) -> Result<(), TxError> {
        Ok(())
    }
}
