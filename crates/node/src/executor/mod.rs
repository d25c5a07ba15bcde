//! The transaction executor framework. Every tx type walks the same state
//! machine:
//!
//! ```text
//! prepare -> verify_inputs -> generate_tx_details -> apply_transaction
//!         -> generate_pub_data -> get_executed_tx -> finalize
//! ```
//!
//! `prepare` is idempotent; `apply_transaction` works on cloned records and
//! swaps them in via the pending maps only on success, so a failure leaves
//! the state cache untouched.

mod atomic_match;
mod cancel_offer;
mod create_collection;
mod deposit;
mod deposit_nft;
mod full_exit;
mod full_exit_nft;
mod mint_nft;
mod register_zns;
mod transfer;
mod transfer_nft;
mod withdraw;
mod withdraw_nft;

pub use atomic_match::AtomicMatchExecutor;
pub use cancel_offer::CancelOfferExecutor;
pub use create_collection::CreateCollectionExecutor;
pub use deposit::DepositExecutor;
pub use deposit_nft::DepositNftExecutor;
pub use full_exit::FullExitExecutor;
pub use full_exit_nft::FullExitNftExecutor;
pub use mint_nft::MintNftExecutor;
pub use register_zns::RegisterZnsExecutor;
pub use transfer::TransferExecutor;
pub use transfer_nft::TransferNftExecutor;
pub use withdraw::WithdrawExecutor;
pub use withdraw_nft::WithdrawNftExecutor;

use crate::sig::verify_tx_signature;
use crate::statedb::{concat_keccak, StateDb};
use crate::store::{ExecutedTx, PoolTx, TxStatus};
use keel_ledger::account::Account;
use keel_ledger::codec::suffix_pad_to_pubdata_size;
use keel_ledger::error::TxError;
use keel_ledger::tx::TxInfo;
use keel_ledger::tx_detail::{
    AssetType, BalanceDelta, BalanceSnapshot, NftSnapshot, TxDetail, NIL_ACCOUNT_ORDER,
};
use keel_ledger::types::{AccountIndex, AssetId, NftIndex};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Copy, Debug)]
pub struct VerifyOpts {
    pub skip_gas_amount_check: bool,
    pub skip_sig_check: bool,
}

impl VerifyOpts {
    /// Commit-path options: gas floors and signatures were already enforced
    /// at pool admission.
    pub fn commit() -> Self {
        VerifyOpts {
            skip_gas_amount_check: true,
            skip_sig_check: true,
        }
    }

    /// API-path options: everything checked.
    pub fn api() -> Self {
        VerifyOpts {
            skip_gas_amount_check: false,
            skip_sig_check: false,
        }
    }
}

pub trait TxExecutor: Send {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError>;
    fn verify_inputs(&mut self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError>;
    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError>;
    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError>;
    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError>;
    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError>;
    fn finalize(&mut self, state: &mut StateDb) -> Result<(), TxError>;
}

/// Borrow one of the deep-copied accounts used for tx-detail generation.
pub(crate) fn copied(
    copies: &mut BTreeMap<AccountIndex, Account>,
    index: AccountIndex,
) -> Result<&mut Account, TxError> {
    copies.get_mut(&index).ok_or(TxError::AccountNotFound(index))
}

/// Closed-set dispatch on the tx type.
pub fn new_tx_executor(pool_tx: PoolTx) -> Result<Box<dyn TxExecutor>, TxError> {
    Ok(match &pool_tx.tx_info {
        TxInfo::RegisterZns(tx) => Box::new(RegisterZnsExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::Deposit(tx) => Box::new(DepositExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::DepositNft(tx) => Box::new(DepositNftExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::Transfer(tx) => Box::new(TransferExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::Withdraw(tx) => Box::new(WithdrawExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::CreateCollection(tx) => {
            Box::new(CreateCollectionExecutor::new(pool_tx.clone(), tx.clone()))
        }
        TxInfo::MintNft(tx) => Box::new(MintNftExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::TransferNft(tx) => Box::new(TransferNftExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::AtomicMatch(tx) => Box::new(AtomicMatchExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::CancelOffer(tx) => Box::new(CancelOfferExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::WithdrawNft(tx) => Box::new(WithdrawNftExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::FullExit(tx) => Box::new(FullExitExecutor::new(pool_tx.clone(), tx.clone())),
        TxInfo::FullExitNft(tx) => Box::new(FullExitNftExecutor::new(pool_tx.clone(), tx.clone())),
    })
}

/// State shared by every executor: the pool record plus the dirty slots this
/// tx touches.
pub struct BaseExecutor {
    pub pool_tx: PoolTx,
    dirty_account_assets: BTreeMap<AccountIndex, BTreeSet<AssetId>>,
    dirty_nfts: BTreeSet<NftIndex>,
}

impl BaseExecutor {
    pub fn new(pool_tx: PoolTx) -> Self {
        BaseExecutor {
            pool_tx,
            dirty_account_assets: BTreeMap::new(),
            dirty_nfts: BTreeSet::new(),
        }
    }

    pub fn mark_account_assets_dirty(&mut self, index: AccountIndex, assets: &[AssetId]) {
        let entry = self.dirty_account_assets.entry(index).or_default();
        for a in assets {
            entry.insert(*a);
        }
    }

    pub fn mark_nft_dirty(&mut self, index: NftIndex) {
        self.dirty_nfts.insert(index);
    }

    /// Assign the canonical tx hash for L2 submissions that arrived without
    /// one. Idempotent.
    pub fn prepare(&mut self, _state: &mut StateDb) -> Result<(), TxError> {
        if self.pool_tx.tx_hash.is_empty() && self.pool_tx.tx_info.from_account_index().is_some() {
            self.pool_tx.tx_hash = format!("0x{}", hex::encode(self.pool_tx.tx_info.hash()));
        }
        Ok(())
    }

    /// Shared validation: stateless fields, expiry, nonce, gas, signature.
    pub fn verify_inputs(&self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError> {
        let info = &self.pool_tx.tx_info;
        info.validate()?;
        if let Some(expired_at) = info.expired_at() {
            state.verify_expired_at(expired_at)?;
        }
        if let Some(from) = info.from_account_index() {
            state.verify_nonce(from, info.nonce().unwrap_or_default())?;
            let (gas_account, gas_asset, gas_amount) = info.gas().ok_or(TxError::InvalidTxInfo)?;
            state.verify_gas(
                gas_account,
                gas_asset,
                info.tx_type(),
                gas_amount,
                opts.skip_gas_amount_check,
            )?;
            if !opts.skip_sig_check {
                let from_account = state.get_account(from)?;
                if !from_account.can_originate_l2_tx() {
                    return Err(TxError::EmptyPublicKey);
                }
                verify_tx_signature(info, &from_account.l1_address)?;
            }
        }
        Ok(())
    }

    /// Push this executor's dirty slots into the state cache; called from
    /// every `apply_transaction`.
    pub fn sync_dirty_to_state_cache(&self, state: &mut StateDb) {
        for (index, assets) in &self.dirty_account_assets {
            let assets: Vec<AssetId> = assets.iter().copied().collect();
            state.mark_account_assets_dirty(*index, &assets);
        }
        for index in &self.dirty_nfts {
            state.mark_nft_dirty(*index);
        }
    }

    /// The base executed-tx record; executors fill in their type-specific
    /// columns on top.
    pub fn build_executed_tx(&self, state: &StateDb, from_api: bool) -> ExecutedTx {
        let info = &self.pool_tx.tx_info;
        ExecutedTx {
            pool_tx_id: self.pool_tx.pool_tx_id,
            tx_hash: self.pool_tx.tx_hash.clone(),
            tx_type: info.tx_type(),
            tx_info: info.clone(),
            account_index: info.from_account_index(),
            nonce: info.nonce(),
            expired_at: info.expired_at().unwrap_or(i64::MAX),
            gas_fee_asset_id: info.gas().map(|(_, asset, _)| asset),
            gas_fee: info.gas().map(|(_, _, amount)| amount),
            asset_id: None,
            tx_amount: None,
            nft_index: None,
            collection_id: None,
            block_height: if from_api { 0 } else { state.block_height },
            tx_index: if from_api { -1 } else { state.txs.len() as i64 },
            status: TxStatus::Executed,
            details: Vec::new(),
        }
    }

    /// Append a plain (non-on-chain) pubdata record.
    pub fn append_pubdata(&self, state: &mut StateDb, record: Vec<u8>) {
        let padded = suffix_pad_to_pubdata_size(record);
        state.pub_data.extend_from_slice(&padded);
    }

    /// Append an on-chain-op record: offset + rolling keccak, and the
    /// priority-operations counter when the op originated on L1.
    pub fn append_onchain_pubdata(
        &self,
        state: &mut StateDb,
        record: Vec<u8>,
        is_priority: bool,
        in_ops_hash: bool,
    ) {
        let padded = suffix_pad_to_pubdata_size(record);
        if is_priority {
            state.priority_operations += 1;
        }
        state.pub_data_offsets.push(state.pub_data.len() as u32);
        if in_ops_hash {
            state.pending_onchain_ops_hash =
                concat_keccak(&state.pending_onchain_ops_hash, &padded);
            state.pending_onchain_ops_pubdata.push(padded.clone());
        }
        state.pub_data.extend_from_slice(&padded);
    }
}

/// Builds tx-detail rows under the ordering contract: `order` increments per
/// row, `account_order` only when the account changes, NFT rows carry the nil
/// account order, and gas rows must come last.
pub struct DetailBuilder {
    rows: Vec<TxDetail>,
    order: i64,
    account_order: i64,
    last_account: Option<AccountIndex>,
    block_height: u64,
    pool_tx_id: u64,
}

impl DetailBuilder {
    pub fn new(state: &StateDb, pool_tx_id: u64) -> Self {
        DetailBuilder {
            rows: Vec::with_capacity(4),
            order: 0,
            account_order: -1,
            last_account: None,
            block_height: state.block_height,
            pool_tx_id,
        }
    }

    fn next_account_order(&mut self, index: AccountIndex) -> i64 {
        if self.last_account != Some(index) {
            self.account_order += 1;
            self.last_account = Some(index);
        }
        self.account_order
    }

    /// Emit a fungible row and roll the copied account forward by `delta`.
    pub fn fungible(
        &mut self,
        account: &mut Account,
        asset_id: AssetId,
        delta: i128,
        new_bitmap: Option<u128>,
        is_gas: bool,
    ) -> Result<(), TxError> {
        let pre = account.asset(asset_id);
        let account_order = self.next_account_order(account.account_index);
        self.rows.push(TxDetail {
            asset_id: asset_id as u64,
            asset_type: AssetType::Fungible,
            account_index: account.account_index,
            l1_address: account.l1_address,
            balance: BalanceSnapshot::Fungible(pre.clone()),
            balance_delta: BalanceDelta::Fungible {
                asset_id,
                balance_delta: delta,
                offer_canceled_or_finalized: new_bitmap,
            },
            order: self.order,
            account_order,
            nonce: account.nonce,
            collection_nonce: account.collection_nonce,
            is_gas,
            block_height: self.block_height,
            pool_tx_id: self.pool_tx_id,
        });
        self.order += 1;

        // Roll the copy forward so a later row for the same slot chains.
        let new_balance = (pre.balance as i128)
            .checked_add(delta)
            .filter(|b| *b >= 0)
            .ok_or(TxError::BalanceNotEnough {
                asset_id,
                have: pre.balance,
                need: delta.unsigned_abs(),
            })?;
        let slot = account
            .asset_info
            .entry(asset_id)
            .or_insert_with(|| keel_ledger::account::AccountAsset::new(asset_id));
        slot.balance = new_balance as u128;
        if let Some(bitmap) = new_bitmap {
            slot.offer_canceled_or_finalized = bitmap;
        }
        Ok(())
    }

    /// Emit an NFT replacement row (nil account order, no grouping change).
    pub fn nft(&mut self, account: &Account, old: NftSnapshot, new: NftSnapshot) {
        self.rows.push(TxDetail {
            asset_id: old.nft_index,
            asset_type: AssetType::Nft,
            account_index: account.account_index,
            l1_address: account.l1_address,
            balance: BalanceSnapshot::Nft(old),
            balance_delta: BalanceDelta::Nft(new),
            order: self.order,
            account_order: NIL_ACCOUNT_ORDER,
            nonce: account.nonce,
            collection_nonce: account.collection_nonce,
            is_gas: false,
            block_height: self.block_height,
            pool_tx_id: self.pool_tx_id,
        });
        self.order += 1;
    }

    /// Emit the collection-nonce bump row and roll the copy forward.
    pub fn collection_nonce(&mut self, account: &mut Account) {
        let account_order = self.next_account_order(account.account_index);
        self.rows.push(TxDetail {
            asset_id: u64::MAX,
            asset_type: AssetType::CollectionNonce,
            account_index: account.account_index,
            l1_address: account.l1_address,
            balance: BalanceSnapshot::CollectionNonce {
                nonce: account.collection_nonce,
            },
            balance_delta: BalanceDelta::CollectionNonce {
                nonce: account.collection_nonce + 1,
            },
            order: self.order,
            account_order,
            nonce: account.nonce,
            collection_nonce: account.collection_nonce,
            is_gas: false,
            block_height: self.block_height,
            pool_tx_id: self.pool_tx_id,
        });
        self.order += 1;
        account.collection_nonce += 1;
    }

    pub fn build(self) -> Vec<TxDetail> {
        self.rows
    }
}
