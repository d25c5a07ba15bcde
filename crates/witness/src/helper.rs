//! Builds the per-transaction witness by replaying tx-detail rows against the
//! tree triad. The helper reads each touched slot's pre-state, captures its
//! Merkle path, applies the row's delta, and writes the post-leaf back, so
//! after the last row the trees sit at the block's after-state.
//!
//! Row-order dependence: rows arrive grouped by `account_order` with the gas
//! credit last; the grouping here breaks if an executor violates that.

use crate::witness::{
    fixed_account_proof, fixed_asset_proof, fixed_nft_proof, AccountAssetWitness, AccountWitness,
    AssetProof, GasWitness, NftWitness, TxWitness, NB_ACCOUNTS_PER_TX,
    NB_ACCOUNT_ASSETS_PER_ACCOUNT,
};
use crate::WitnessError;
use keel_ledger::account::{Account, AccountAsset};
use keel_ledger::merkle::{NodeHash, SparseMerkleTree, Version};
use keel_ledger::tree::{
    compute_account_leaf_hash, compute_asset_leaf_hash, compute_nft_leaf_hash, compute_state_root,
    AssetTreeCache, EMPTY_ASSET_TREE, NIL_ASSET_ROOT,
};
use keel_ledger::tx::TxInfo;
use keel_ledger::tx_detail::{
    compute_new_balance, AssetType, BalanceDelta, BalanceSnapshot, NftSnapshot, TxDetail,
};
use keel_ledger::types::{
    AccountIndex, BlockHeight, TxType, GAS_ACCOUNT_INDEX, GAS_ASSETS, LAST_ACCOUNT_ASSET_ID,
    LAST_ACCOUNT_INDEX, LAST_NFT_INDEX,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Read access to confirmed account records and their block-height history.
pub trait AccountProvider: Send + Sync {
    fn confirmed_account(&self, index: AccountIndex) -> Result<Account, WitnessError>;
    fn account_history_at(
        &self,
        index: AccountIndex,
        height: BlockHeight,
    ) -> Result<Option<Account>, WitnessError>;
}

/// The executed-tx view the helper consumes: payload plus detail rows.
#[derive(Clone, Debug)]
pub struct WitnessTx {
    pub tx_type: TxType,
    pub account_index: Option<AccountIndex>,
    pub nonce: u64,
    pub expired_at: i64,
    pub signature: Vec<u8>,
    pub tx_info: TxInfo,
    pub details: Vec<TxDetail>,
}

struct AccountGroup {
    account: Account,
    /// Pre-state per referenced asset, in row order.
    assets: Vec<AccountAsset>,
    /// The rows whose deltas roll those assets forward.
    rows: Vec<TxDetail>,
}

struct NftGroup {
    before: NftSnapshot,
    row: TxDetail,
}

pub struct WitnessHelper {
    account_tree: Arc<RwLock<SparseMerkleTree>>,
    nft_tree: Arc<RwLock<SparseMerkleTree>>,
    asset_trees: Arc<AssetTreeCache>,
    provider: Arc<dyn AccountProvider>,
    /// Before-image of the gas account, threaded across the block's txs.
    gas_account: Option<Account>,
}

impl WitnessHelper {
    pub fn new(
        account_tree: Arc<RwLock<SparseMerkleTree>>,
        nft_tree: Arc<RwLock<SparseMerkleTree>>,
        asset_trees: Arc<AssetTreeCache>,
        provider: Arc<dyn AccountProvider>,
    ) -> Self {
        WitnessHelper {
            account_tree,
            nft_tree,
            asset_trees,
            provider,
            gas_account: None,
        }
    }

    /// Construct the witness for one executed tx, advancing the trees to the
    /// tx's after-state at `version` (the block height being sealed).
    pub fn construct_tx_witness(
        &mut self,
        tx: &WitnessTx,
        version: Version,
    ) -> Result<TxWitness, WitnessError> {
        let (account_keys, groups, nft_group) = self.collect_groups(tx)?;

        let account_root_before = self.account_tree.read().root();
        let nft_root_before = self.nft_tree.read().root();

        let (accounts_info_before, account_proofs, asset_proofs) =
            self.construct_account_witness(tx, version, &account_keys, groups)?;
        let (nft_before, nft_proof) = self.construct_nft_witness(nft_group, version)?;

        let state_root_before = compute_state_root(&account_root_before, &nft_root_before);
        let state_root_after = compute_state_root(
            &self.account_tree.read().root(),
            &self.nft_tree.read().root(),
        );

        Ok(TxWitness {
            tx_type: tx.tx_type as u8,
            nonce: tx.nonce,
            expired_at: tx.expired_at,
            signature: tx.signature.clone(),
            tx_info: tx.tx_info.clone(),
            account_root_before,
            nft_root_before,
            state_root_before,
            state_root_after,
            accounts_info_before,
            merkle_proofs_account_before: Box::new(account_proofs),
            merkle_proofs_account_assets_before: Box::new(asset_proofs),
            nft_before,
            merkle_proofs_nft_before: Box::new(nft_proof),
        })
    }

    /// Derive the ordered account groups and the optional NFT group from the
    /// tx's detail rows.
    fn collect_groups(
        &self,
        tx: &WitnessTx,
    ) -> Result<(Vec<AccountIndex>, Vec<AccountGroup>, Option<NftGroup>), WitnessError> {
        let mut account_keys: Vec<AccountIndex> = Vec::new();
        let mut groups: Vec<AccountGroup> = Vec::new();
        let mut nft_group: Option<NftGroup> = None;
        // Chained pre-states: a second row for the same (account, asset)
        // starts from the first row's post-state.
        let mut asset_chain: HashMap<(AccountIndex, u64), AccountAsset> = HashMap::new();
        let mut last_account_order: i64 = -2;

        if tx.tx_type == TxType::RegisterZns {
            let index = tx
                .account_index
                .ok_or_else(|| WitnessError::MalformedDetails("register without account".into()))?;
            return Ok((vec![index], Vec::new(), None));
        }

        for row in &tx.details {
            if row.is_gas {
                continue;
            }
            match row.asset_type {
                AssetType::Fungible => {
                    if row.account_order != last_account_order {
                        let mut account = self.provider.confirmed_account(row.account_index)?;
                        account.nonce = row.nonce;
                        account.collection_nonce = row.collection_nonce;
                        account_keys.push(row.account_index);
                        groups.push(AccountGroup {
                            account,
                            assets: Vec::new(),
                            rows: Vec::new(),
                        });
                        last_account_order = row.account_order;
                    }
                    let group = groups
                        .last_mut()
                        .ok_or_else(|| WitnessError::MalformedDetails("row before group".into()))?;
                    let key = (row.account_index, row.asset_id);
                    let pre = match asset_chain.get(&key) {
                        Some(chained) => chained.clone(),
                        None => match &row.balance {
                            BalanceSnapshot::Fungible(asset) => asset.clone(),
                            _ => {
                                return Err(WitnessError::MalformedDetails(
                                    "fungible row with non-fungible snapshot".into(),
                                ))
                            }
                        },
                    };
                    let post = compute_new_balance(
                        &BalanceSnapshot::Fungible(pre.clone()),
                        &row.balance_delta,
                    )?;
                    if let BalanceSnapshot::Fungible(post_asset) = post {
                        asset_chain.insert(key, post_asset);
                    }
                    group.assets.push(pre);
                    group.rows.push(row.clone());
                }
                AssetType::Nft => {
                    let before = match &row.balance {
                        BalanceSnapshot::Nft(snapshot) => snapshot.clone(),
                        _ => {
                            return Err(WitnessError::MalformedDetails(
                                "nft row with non-nft snapshot".into(),
                            ))
                        }
                    };
                    nft_group = Some(NftGroup {
                        before,
                        row: row.clone(),
                    });
                }
                AssetType::CollectionNonce => {
                    if row.account_order != last_account_order {
                        let mut account = self.provider.confirmed_account(row.account_index)?;
                        account.nonce = row.nonce;
                        account.collection_nonce = row.collection_nonce;
                        account_keys.push(row.account_index);
                        groups.push(AccountGroup {
                            account,
                            assets: Vec::new(),
                            rows: Vec::new(),
                        });
                        last_account_order = row.account_order;
                    } else if let Some(group) = groups.last_mut() {
                        group.account.nonce = row.nonce;
                        group.account.collection_nonce = row.collection_nonce;
                    }
                }
            }
        }
        Ok((account_keys, groups, nft_group))
    }

    #[allow(clippy::type_complexity)]
    fn construct_account_witness(
        &mut self,
        tx: &WitnessTx,
        version: Version,
        account_keys: &[AccountIndex],
        groups: Vec<AccountGroup>,
    ) -> Result<
        (
            [AccountWitness; NB_ACCOUNTS_PER_TX],
            [crate::witness::AccountProof; NB_ACCOUNTS_PER_TX],
            [[AssetProof; NB_ACCOUNT_ASSETS_PER_ACCOUNT]; NB_ACCOUNTS_PER_TX],
        ),
        WitnessError,
    > {
        let empty_account = AccountWitness::empty(LAST_ACCOUNT_INDEX, *NIL_ASSET_ROOT);
        let mut accounts: Vec<AccountWitness> = Vec::with_capacity(NB_ACCOUNTS_PER_TX);
        let mut account_proofs: Vec<crate::witness::AccountProof> = Vec::new();
        let mut asset_proofs: Vec<[AssetProof; NB_ACCOUNT_ASSETS_PER_ACCOUNT]> = Vec::new();

        let is_register = tx.tx_type == TxType::RegisterZns;
        let mut groups = groups.into_iter();

        for &account_key in account_keys {
            let account_proof = fixed_account_proof(self.account_tree.read().proof(account_key as u64))?;

            let (witness, slot_proofs) = if is_register {
                // A registration targets the next unused index; its
                // before-image is the empty account over a nil asset tree.
                let expected = self.asset_trees.next_account_index();
                if account_key != expected {
                    return Err(WitnessError::UnexpectedRegisterIndex {
                        expected,
                        got: account_key,
                    });
                }
                self.asset_trees.update_cache(account_key, version);
                let account = self.provider.confirmed_account(account_key)?;
                let witness = AccountWitness::empty(account_key as u64, *NIL_ASSET_ROOT);

                if account_key == GAS_ACCOUNT_INDEX {
                    let mut cached = account.clone();
                    cached.nonce = 0;
                    cached.collection_nonce = 0;
                    cached.asset_root = *NIL_ASSET_ROOT;
                    self.gas_account = Some(cached);
                }

                let tree = self.asset_trees.get(account_key);
                let mut proofs = Vec::new();
                for _ in 0..NB_ACCOUNT_ASSETS_PER_ACCOUNT {
                    proofs.push(fixed_asset_proof(tree.read().proof(LAST_ACCOUNT_ASSET_ID))?);
                }
                // The new leaf is written with the account's registered
                // identity below, using the group-less path.
                let leaf = compute_account_leaf_hash(
                    &account.l1_address,
                    &account.public_key,
                    0,
                    0,
                    &NIL_ASSET_ROOT,
                );
                self.account_tree
                    .write()
                    .set(account_key as u64, leaf, version)?;
                accounts.push(witness);
                account_proofs.push(account_proof);
                asset_proofs.push(
                    proofs
                        .try_into()
                        .map_err(|_| WitnessError::MalformedDetails("asset slot overflow".into()))?,
                );
                continue;
            } else {
                let group = groups.next().ok_or_else(|| {
                    WitnessError::MalformedDetails("fewer groups than account keys".into())
                })?;
                let tree = self.asset_trees.get_adapter(account_key);
                let mut witness = AccountWitness {
                    account_index: account_key as u64,
                    l1_address: *group.account.l1_address.as_bytes(),
                    public_key: group.account.public_key.as_bytes().to_vec(),
                    nonce: group.account.nonce,
                    collection_nonce: group.account.collection_nonce,
                    asset_root: tree.read().root(),
                    assets: std::array::from_fn(|_| {
                        AccountAssetWitness::empty(LAST_ACCOUNT_ASSET_ID)
                    }),
                };
                let mut slot_proofs: Vec<AssetProof> = Vec::new();
                for (slot, (pre, row)) in group.assets.iter().zip(group.rows.iter()).enumerate() {
                    if slot >= NB_ACCOUNT_ASSETS_PER_ACCOUNT {
                        return Err(WitnessError::MalformedDetails(
                            "more assets than witness slots".into(),
                        ));
                    }
                    witness.assets[slot] = AccountAssetWitness {
                        asset_id: row.asset_id,
                        balance: pre.balance,
                        offer_canceled_or_finalized: pre.offer_canceled_or_finalized,
                    };
                    slot_proofs.push(fixed_asset_proof(tree.read().proof(row.asset_id))?);
                    let post = compute_new_balance(
                        &BalanceSnapshot::Fungible(pre.clone()),
                        &row.balance_delta,
                    )?;
                    let BalanceSnapshot::Fungible(post_asset) = post else {
                        return Err(WitnessError::MalformedDetails(
                            "fungible delta produced non-fungible state".into(),
                        ));
                    };
                    tree.write().set(
                        row.asset_id,
                        compute_asset_leaf_hash(
                            post_asset.balance,
                            post_asset.offer_canceled_or_finalized,
                        ),
                        version,
                    )?;
                }
                while slot_proofs.len() < NB_ACCOUNT_ASSETS_PER_ACCOUNT {
                    slot_proofs.push(fixed_asset_proof(
                        tree.read().proof(LAST_ACCOUNT_ASSET_ID),
                    )?);
                }

                // Write the updated account leaf over the shifted asset root.
                let mut nonce = witness.nonce;
                let mut collection_nonce = witness.collection_nonce;
                if tx.account_index == Some(account_key) && tx.tx_type.is_l2() {
                    nonce = tx.nonce + 1;
                }
                if tx.account_index == Some(account_key)
                    && tx.tx_type == TxType::CreateCollection
                {
                    collection_nonce += 1;
                }
                let new_asset_root = tree.read().root();
                let leaf = compute_account_leaf_hash(
                    &group.account.l1_address,
                    &group.account.public_key,
                    nonce,
                    collection_nonce,
                    &new_asset_root,
                );
                self.account_tree
                    .write()
                    .set(account_key as u64, leaf, version)?;

                if account_key == GAS_ACCOUNT_INDEX {
                    let mut cached = group.account.clone();
                    cached.nonce = nonce;
                    cached.collection_nonce = collection_nonce;
                    cached.asset_root = new_asset_root;
                    for (account_asset, row) in group.assets.iter().zip(group.rows.iter()) {
                        let post = compute_new_balance(
                            &BalanceSnapshot::Fungible(account_asset.clone()),
                            &row.balance_delta,
                        )?;
                        if let BalanceSnapshot::Fungible(post_asset) = post {
                            cached
                                .asset_info
                                .insert(post_asset.asset_id, post_asset);
                        }
                    }
                    self.gas_account = Some(cached);
                }

                (witness, slot_proofs)
            };

            accounts.push(witness);
            account_proofs.push(account_proof);
            asset_proofs.push(
                slot_proofs
                    .try_into()
                    .map_err(|_| WitnessError::MalformedDetails("asset slot overflow".into()))?,
            );
        }

        // Pad unused account slots with empty-leaf proofs.
        while accounts.len() < NB_ACCOUNTS_PER_TX {
            accounts.push(empty_account.clone());
            account_proofs.push(fixed_account_proof(
                self.account_tree.read().proof(LAST_ACCOUNT_INDEX),
            )?);
            let mut pads: Vec<AssetProof> = Vec::new();
            for _ in 0..NB_ACCOUNT_ASSETS_PER_ACCOUNT {
                pads.push(fixed_asset_proof(EMPTY_ASSET_TREE.proof(0))?);
            }
            asset_proofs.push(
                pads.try_into()
                    .map_err(|_| WitnessError::MalformedDetails("asset slot overflow".into()))?,
            );
        }

        let accounts: [AccountWitness; NB_ACCOUNTS_PER_TX] = accounts
            .try_into()
            .map_err(|_| WitnessError::MalformedDetails("too many account groups".into()))?;
        let account_proofs = account_proofs
            .try_into()
            .map_err(|_| WitnessError::MalformedDetails("too many account proofs".into()))?;
        let asset_proofs = asset_proofs
            .try_into()
            .map_err(|_| WitnessError::MalformedDetails("too many asset proofs".into()))?;
        Ok((accounts, account_proofs, asset_proofs))
    }

    fn construct_nft_witness(
        &mut self,
        nft_group: Option<NftGroup>,
        version: Version,
    ) -> Result<(NftWitness, crate::witness::NftProof), WitnessError> {
        let Some(group) = nft_group else {
            let proof = fixed_nft_proof(self.nft_tree.read().proof(LAST_NFT_INDEX))?;
            return Ok((NftWitness::empty(LAST_NFT_INDEX), proof));
        };

        let proof = fixed_nft_proof(self.nft_tree.read().proof(group.before.nft_index))?;
        let before = NftWitness {
            nft_index: group.before.nft_index,
            creator_account_index: group.before.creator_account_index as u64,
            owner_account_index: group.before.owner_account_index as u64,
            nft_content_hash: group.before.nft_content_hash,
            creator_treasury_rate: group.before.creator_treasury_rate as u64,
            collection_id: group.before.collection_id as u64,
        };

        let BalanceDelta::Nft(after) = &group.row.balance_delta else {
            return Err(WitnessError::MalformedDetails(
                "nft row with non-nft delta".into(),
            ));
        };
        let leaf = compute_nft_leaf_hash(
            after.creator_account_index,
            after.owner_account_index,
            &after.nft_content_hash,
            after.creator_treasury_rate,
            after.collection_id,
        );
        self.nft_tree
            .write()
            .set(group.before.nft_index, leaf, version)?;
        Ok((before, proof))
    }

    /// Per-block gas witness: fee sums per gas asset applied to the gas
    /// account in a single before/after update.
    pub fn construct_gas_witness(
        &mut self,
        txs: &[WitnessTx],
        version: Version,
    ) -> Result<GasWitness, WitnessError> {
        let mut needs_gas = false;
        let mut gas_changes: HashMap<u64, i128> =
            GAS_ASSETS.iter().map(|a| (*a as u64, 0i128)).collect();
        for tx in txs {
            if !tx.tx_type.is_l2() {
                continue;
            }
            needs_gas = true;
            for row in &tx.details {
                if !row.is_gas {
                    continue;
                }
                if let BalanceDelta::Fungible {
                    asset_id,
                    balance_delta,
                    ..
                } = &row.balance_delta
                {
                    *gas_changes.entry(*asset_id as u64).or_insert(0) += balance_delta;
                }
            }
        }

        if !needs_gas {
            let mut account = AccountWitness::empty(GAS_ACCOUNT_INDEX as u64, *NIL_ASSET_ROOT);
            let account_proof = fixed_account_proof(
                self.account_tree.read().proof(GAS_ACCOUNT_INDEX as u64),
            )?;
            let mut asset_proofs = Vec::new();
            for (slot, asset_id) in GAS_ASSETS.iter().enumerate() {
                account.assets[slot] = AccountAssetWitness::empty(*asset_id as u64);
                asset_proofs.push(fixed_asset_proof(EMPTY_ASSET_TREE.proof(*asset_id as u64))?);
            }
            return Ok(GasWitness {
                needs_gas: false,
                account_info_before: account,
                merkle_proofs_account_before: Box::new(account_proof),
                merkle_proofs_account_assets_before: asset_proofs,
            });
        }

        let gas_account = match &self.gas_account {
            Some(a) => a.clone(),
            None => self.provider.confirmed_account(GAS_ACCOUNT_INDEX)?,
        };
        let tree = self.asset_trees.get_adapter(GAS_ACCOUNT_INDEX);
        let account_proof =
            fixed_account_proof(self.account_tree.read().proof(GAS_ACCOUNT_INDEX as u64))?;

        let mut witness = AccountWitness {
            account_index: GAS_ACCOUNT_INDEX as u64,
            l1_address: *gas_account.l1_address.as_bytes(),
            public_key: gas_account.public_key.as_bytes().to_vec(),
            nonce: gas_account.nonce,
            collection_nonce: gas_account.collection_nonce,
            asset_root: tree.read().root(),
            assets: std::array::from_fn(|_| AccountAssetWitness::empty(LAST_ACCOUNT_ASSET_ID)),
        };
        log::debug!(
            "gas witness: old asset root {}",
            hex::encode(witness.asset_root)
        );

        let mut asset_proofs = Vec::new();
        let mut updated = gas_account.clone();
        for (slot, asset_id) in GAS_ASSETS.iter().enumerate() {
            let before = gas_account.asset(*asset_id);
            witness.assets[slot] = AccountAssetWitness {
                asset_id: *asset_id as u64,
                balance: before.balance,
                offer_canceled_or_finalized: before.offer_canceled_or_finalized,
            };
            asset_proofs.push(fixed_asset_proof(tree.read().proof(*asset_id as u64))?);

            let delta = gas_changes.get(&(*asset_id as u64)).copied().unwrap_or(0);
            let after = (before.balance as i128 + delta).max(0) as u128;
            tree.write().set(
                *asset_id as u64,
                compute_asset_leaf_hash(after, before.offer_canceled_or_finalized),
                version,
            )?;
            updated.asset_info.insert(
                *asset_id,
                AccountAsset {
                    asset_id: *asset_id,
                    balance: after,
                    offer_canceled_or_finalized: before.offer_canceled_or_finalized,
                },
            );
        }

        let new_asset_root = tree.read().root();
        log::debug!("gas witness: new asset root {}", hex::encode(new_asset_root));
        let leaf = compute_account_leaf_hash(
            &gas_account.l1_address,
            &gas_account.public_key,
            gas_account.nonce,
            gas_account.collection_nonce,
            &new_asset_root,
        );
        self.account_tree
            .write()
            .set(GAS_ACCOUNT_INDEX as u64, leaf, version)?;
        updated.asset_root = new_asset_root;
        self.gas_account = Some(updated);

        Ok(GasWitness {
            needs_gas: true,
            account_info_before: witness,
            merkle_proofs_account_before: Box::new(account_proof),
            merkle_proofs_account_assets_before: asset_proofs,
        })
    }

    /// Restore the gas-account cache from history after a rollback to
    /// `height`; reprocessing then starts from a clean before-image.
    pub fn reset_cache(&mut self, height: BlockHeight) -> Result<(), WitnessError> {
        self.gas_account = self
            .provider
            .account_history_at(GAS_ACCOUNT_INDEX, height)?;
        Ok(())
    }
}
