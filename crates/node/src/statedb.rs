//! The in-memory state cache. The block processor is its sole writer;
//! executors mutate it through cloned records swapped back in on success, so
//! a failing apply leaves no partial state behind. API readers take deep
//! copies on demand.

use crate::ipfs::IpfsClient;
use keel_ledger::account::Account;
use keel_ledger::address::L1Address;
use keel_ledger::error::{StateError, TxError};
use keel_ledger::nft::Nft;
use keel_ledger::records::NftMetadataHistory;
use keel_ledger::types::{
    AccountIndex, AssetId, BlockHeight, NftIndex, TxType, GAS_ACCOUNT_INDEX, GAS_ASSETS,
};
use sha3::{Digest, Keccak256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// keccak256 of the empty string: the seed of the rolling on-chain-ops hash.
pub const EMPTY_STRING_KECCAK: [u8; 32] = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
    0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
    0xa4, 0x70,
];

/// Roll the on-chain-ops hash forward by one record.
pub fn concat_keccak(acc: &[u8; 32], pubdata: &[u8]) -> [u8; 32] {
    let mut h = Keccak256::new();
    h.update(acc);
    h.update(pubdata);
    let out = h.finalize();
    let mut a = [0u8; 32];
    a.copy_from_slice(&out);
    a
}

/// Minimum fee schedule per tx type; zero means no floor is enforced.
#[derive(Clone, Debug, Default)]
pub struct GasFeeSchedule {
    pub min_fee: HashMap<TxType, u128>,
}

pub struct StateDb {
    /// Committed view as of the last sealed block.
    accounts: HashMap<AccountIndex, Account>,
    account_index_by_l1: HashMap<L1Address, AccountIndex>,
    nfts: HashMap<NftIndex, Nft>,

    /// Post-apply values accumulated for the block being built.
    pending_accounts: BTreeMap<AccountIndex, Account>,
    pending_nfts: BTreeMap<NftIndex, Nft>,
    /// Fee credits per gas asset, folded onto the gas account at seal time.
    pending_gas: BTreeMap<AssetId, u128>,

    /// Tree slots that need recomputation at seal time.
    dirty_account_assets: BTreeMap<AccountIndex, BTreeSet<AssetId>>,
    dirty_nfts: BTreeSet<NftIndex>,

    // Block-building buffers.
    pub pub_data: Vec<u8>,
    pub pub_data_offsets: Vec<u32>,
    pub priority_operations: u64,
    pub pending_onchain_ops_pubdata: Vec<Vec<u8>>,
    pub pending_onchain_ops_hash: [u8; 32],
    pub txs: Vec<crate::store::ExecutedTx>,
    /// Metadata pins recorded by MintNft, drained at block seal.
    pub pending_metadata_history: Vec<NftMetadataHistory>,

    next_account_index: AccountIndex,
    next_nft_index: NftIndex,

    /// Current block context; executors read expiry and timestamps from here
    /// so execution stays deterministic.
    pub block_height: BlockHeight,
    pub block_timestamp_ms: i64,

    /// True when serving API dry-runs: no index allocation side effects.
    pub dry_run: bool,

    pub gas_fee_schedule: GasFeeSchedule,
    ipfs: Option<Arc<dyn IpfsClient>>,
}

impl StateDb {
    pub fn new() -> Self {
        StateDb {
            accounts: HashMap::new(),
            account_index_by_l1: HashMap::new(),
            nfts: HashMap::new(),
            pending_accounts: BTreeMap::new(),
            pending_nfts: BTreeMap::new(),
            pending_gas: BTreeMap::new(),
            dirty_account_assets: BTreeMap::new(),
            dirty_nfts: BTreeSet::new(),
            pub_data: Vec::new(),
            pub_data_offsets: Vec::new(),
            priority_operations: 0,
            pending_onchain_ops_pubdata: Vec::new(),
            pending_onchain_ops_hash: EMPTY_STRING_KECCAK,
            txs: Vec::new(),
            pending_metadata_history: Vec::new(),
            next_account_index: 0,
            next_nft_index: 0,
            block_height: 0,
            block_timestamp_ms: 0,
            dry_run: false,
            gas_fee_schedule: GasFeeSchedule::default(),
            ipfs: None,
        }
    }

    pub fn with_ipfs(mut self, ipfs: Arc<dyn IpfsClient>) -> Self {
        self.ipfs = Some(ipfs);
        self
    }

    pub fn ipfs(&self) -> Option<&Arc<dyn IpfsClient>> {
        self.ipfs.as_ref()
    }

    /// Install a confirmed account (bootstrap / sync path).
    pub fn insert_confirmed_account(&mut self, account: Account) {
        if account.account_index >= self.next_account_index {
            self.next_account_index = account.account_index + 1;
        }
        self.account_index_by_l1
            .insert(account.l1_address, account.account_index);
        self.accounts.insert(account.account_index, account);
    }

    pub fn insert_confirmed_nft(&mut self, nft: Nft) {
        if nft.nft_index >= self.next_nft_index {
            self.next_nft_index = nft.nft_index + 1;
        }
        self.nfts.insert(nft.nft_index, nft);
    }

    /// Pending-first read; the committed view backs it.
    pub fn get_account(&self, index: AccountIndex) -> Result<Account, TxError> {
        if let Some(a) = self.pending_accounts.get(&index) {
            return Ok(a.clone());
        }
        self.accounts
            .get(&index)
            .cloned()
            .ok_or(TxError::AccountNotFound(index))
    }

    pub fn has_account(&self, index: AccountIndex) -> bool {
        self.pending_accounts.contains_key(&index) || self.accounts.contains_key(&index)
    }

    pub fn get_account_by_l1_address(&self, address: &L1Address) -> Result<Account, TxError> {
        for a in self.pending_accounts.values() {
            if a.l1_address == *address {
                return Ok(a.clone());
            }
        }
        self.account_index_by_l1
            .get(address)
            .and_then(|i| self.accounts.get(i))
            .cloned()
            .ok_or_else(|| TxError::AccountByAddressNotFound(address.to_hex()))
    }

    pub fn get_nft(&self, index: NftIndex) -> Result<Nft, TxError> {
        if let Some(n) = self.pending_nfts.get(&index) {
            return Ok(n.clone());
        }
        self.nfts
            .get(&index)
            .cloned()
            .ok_or(TxError::NftNotFound(index))
    }

    pub fn set_pending_account(&mut self, index: AccountIndex, account: Account) {
        self.pending_accounts.insert(index, account);
    }

    pub fn set_pending_nft(&mut self, index: NftIndex, nft: Nft) {
        self.pending_nfts.insert(index, nft);
    }

    pub fn set_pending_gas(&mut self, asset_id: AssetId, amount: u128) {
        *self.pending_gas.entry(asset_id).or_insert(0) += amount;
    }

    pub fn pending_gas(&self) -> &BTreeMap<AssetId, u128> {
        &self.pending_gas
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

    pub fn dirty_account_assets(&self) -> &BTreeMap<AccountIndex, BTreeSet<AssetId>> {
        &self.dirty_account_assets
    }

    pub fn dirty_nfts(&self) -> &BTreeSet<NftIndex> {
        &self.dirty_nfts
    }

    pub fn next_account_index(&self) -> AccountIndex {
        self.next_account_index
    }

    pub fn next_nft_index(&self) -> NftIndex {
        self.next_nft_index
    }

    pub fn advance_account_index(&mut self) {
        self.next_account_index += 1;
    }

    pub fn advance_nft_index(&mut self) {
        self.next_nft_index += 1;
    }

    /// Deep copies for tx-detail generation: executors mutate these freely
    /// without touching the cache.
    pub fn deep_copy_accounts(
        &self,
        indices: &[AccountIndex],
    ) -> Result<BTreeMap<AccountIndex, Account>, TxError> {
        let mut out = BTreeMap::new();
        for i in indices {
            out.insert(*i, self.get_account(*i)?);
        }
        Ok(out)
    }

    pub fn verify_expired_at(&self, expired_at: i64) -> Result<(), TxError> {
        if expired_at < self.block_timestamp_ms {
            return Err(TxError::Expired {
                expired_at,
                now: self.block_timestamp_ms,
            });
        }
        Ok(())
    }

    pub fn verify_nonce(&self, index: AccountIndex, nonce: u64) -> Result<(), TxError> {
        let account = self.get_account(index)?;
        if account.nonce != nonce {
            return Err(TxError::BadNonce {
                expected: account.nonce,
                got: nonce,
            });
        }
        Ok(())
    }

    pub fn verify_gas(
        &self,
        gas_account_index: AccountIndex,
        gas_fee_asset_id: AssetId,
        tx_type: TxType,
        gas_fee_amount: u128,
        skip_amount_check: bool,
    ) -> Result<(), TxError> {
        if gas_account_index != GAS_ACCOUNT_INDEX {
            return Err(TxError::InvalidTxInfo);
        }
        if !GAS_ASSETS.contains(&gas_fee_asset_id) {
            return Err(TxError::InvalidTxInfo);
        }
        if !skip_amount_check {
            let min = self
                .gas_fee_schedule
                .min_fee
                .get(&tx_type)
                .copied()
                .unwrap_or(0);
            if gas_fee_amount < min {
                return Err(TxError::GasFeeTooLow);
            }
        }
        Ok(())
    }

    /// Fold this block's fee credits onto the gas account. Called once per
    /// block before sealing, so the gas credit appears exactly once.
    pub fn apply_pending_gas(&mut self) -> Result<(), TxError> {
        if self.pending_gas.values().all(|v| *v == 0) {
            return Ok(());
        }
        let mut gas_account = self.get_account(GAS_ACCOUNT_INDEX)?;
        let assets: Vec<AssetId> = self
            .pending_gas
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(k, _)| *k)
            .collect();
        for (asset_id, amount) in &self.pending_gas {
            if *amount > 0 {
                gas_account.credit(*asset_id, *amount);
            }
        }
        self.pending_accounts
            .insert(GAS_ACCOUNT_INDEX, gas_account);
        let entry = self
            .dirty_account_assets
            .entry(GAS_ACCOUNT_INDEX)
            .or_default();
        entry.extend(assets);
        Ok(())
    }

    /// Promote pending records into the committed view and clear the block
    /// buffers. Returns the mutated records for history persistence.
    pub fn commit_pending(&mut self, height: BlockHeight) -> (Vec<Account>, Vec<Nft>) {
        let mut changed_accounts = Vec::with_capacity(self.pending_accounts.len());
        for (index, mut account) in std::mem::take(&mut self.pending_accounts) {
            account.l2_block_height = height;
            self.account_index_by_l1.insert(account.l1_address, index);
            if index >= self.next_account_index {
                self.next_account_index = index + 1;
            }
            self.accounts.insert(index, account.clone());
            changed_accounts.push(account);
        }
        let mut changed_nfts = Vec::with_capacity(self.pending_nfts.len());
        for (index, nft) in std::mem::take(&mut self.pending_nfts) {
            if index >= self.next_nft_index {
                self.next_nft_index = index + 1;
            }
            self.nfts.insert(index, nft.clone());
            changed_nfts.push(nft);
        }
        self.pending_gas.clear();
        self.dirty_account_assets.clear();
        self.dirty_nfts.clear();
        self.pub_data.clear();
        self.pub_data_offsets.clear();
        self.priority_operations = 0;
        self.pending_onchain_ops_pubdata.clear();
        self.pending_onchain_ops_hash = EMPTY_STRING_KECCAK;
        self.txs.clear();
        self.pending_metadata_history.clear();
        (changed_accounts, changed_nfts)
    }

    /// Discard everything accumulated for the current block.
    pub fn discard_pending(&mut self) {
        self.pending_accounts.clear();
        self.pending_nfts.clear();
        self.pending_gas.clear();
        self.dirty_account_assets.clear();
        self.dirty_nfts.clear();
        self.pub_data.clear();
        self.pub_data_offsets.clear();
        self.priority_operations = 0;
        self.pending_onchain_ops_pubdata.clear();
        self.pending_onchain_ops_hash = EMPTY_STRING_KECCAK;
        self.txs.clear();
        self.pending_metadata_history.clear();
    }

    /// Drop committed records above `height` (rollback of unconfirmed
    /// blocks). The caller is responsible for rolling the trees back too.
    pub fn rollback_above(&mut self, height: BlockHeight) -> Result<(), StateError> {
        self.discard_pending();
        self.accounts.retain(|_, a| a.l2_block_height <= height);
        self.account_index_by_l1 = self
            .accounts
            .values()
            .map(|a| (a.l1_address, a.account_index))
            .collect();
        self.next_account_index = self
            .accounts
            .keys()
            .max()
            .map(|i| i + 1)
            .unwrap_or(0);
        Ok(())
    }
}

impl Default for StateDb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_ledger::tree::NIL_ASSET_ROOT;

    fn seeded() -> StateDb {
        let mut state = StateDb::new();
        let mut gas = Account::new(GAS_ACCOUNT_INDEX, L1Address([1; 20]), *NIL_ASSET_ROOT);
        gas.status = keel_ledger::AccountStatus::Confirmed;
        state.insert_confirmed_account(gas);
        let mut a = Account::new(2, L1Address([2; 20]), *NIL_ASSET_ROOT);
        a.credit(0, 1000);
        state.insert_confirmed_account(a);
        state
    }

    #[test]
    fn pending_reads_shadow_committed() {
        let mut state = seeded();
        let mut a = state.get_account(2).unwrap();
        a.credit(0, 5);
        state.set_pending_account(2, a);
        assert_eq!(state.get_account(2).unwrap().balance_of(0), 1005);
        state.discard_pending();
        assert_eq!(state.get_account(2).unwrap().balance_of(0), 1000);
    }

    #[test]
    fn lookup_by_l1_address_sees_pending_accounts() {
        let mut state = seeded();
        let fresh = Account::new(3, L1Address([9; 20]), *NIL_ASSET_ROOT);
        state.set_pending_account(3, fresh);
        assert_eq!(
            state
                .get_account_by_l1_address(&L1Address([9; 20]))
                .unwrap()
                .account_index,
            3
        );
    }

    #[test]
    fn gas_credit_applied_once_per_block() {
        let mut state = seeded();
        state.set_pending_gas(0, 700);
        state.set_pending_gas(0, 300);
        state.apply_pending_gas().unwrap();
        assert_eq!(
            state.get_account(GAS_ACCOUNT_INDEX).unwrap().balance_of(0),
            1000
        );
        assert!(state.dirty_account_assets().contains_key(&GAS_ACCOUNT_INDEX));
    }

    #[test]
    fn commit_pending_promotes_and_clears() {
        let mut state = seeded();
        let mut a = state.get_account(2).unwrap();
        a.nonce += 1;
        state.set_pending_account(2, a);
        state.pub_data.extend_from_slice(&[1, 2, 3]);
        let (accounts, _) = state.commit_pending(7);
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].l2_block_height, 7);
        assert_eq!(state.get_account(2).unwrap().nonce, 1);
        assert!(state.pub_data.is_empty());
        assert_eq!(state.pending_onchain_ops_hash, EMPTY_STRING_KECCAK);
    }

    #[test]
    fn rollback_drops_newer_accounts() {
        let mut state = seeded();
        let mut fresh = Account::new(5, L1Address([5; 20]), *NIL_ASSET_ROOT);
        fresh.l2_block_height = 9;
        state.insert_confirmed_account(fresh);
        state.rollback_above(8).unwrap();
        assert!(state.get_account(5).is_err());
        assert!(state
            .get_account_by_l1_address(&L1Address([5; 20]))
            .is_err());
    }
}
