//! The tree triad: account tree, per-account asset trees, NFT tree. Leaf
//! hashing is fixed here so that the executor, the witness helper, and the
//! block sealer agree byte for byte.

use crate::account::{Account, AccountAsset};
use crate::address::{L1Address, PublicKey};
use crate::error::StateError;
use crate::merkle::{hash_pair, NodeHash, SparseMerkleTree, Version};
use crate::nft::Nft;
use crate::types::{
    AccountIndex, BlockHeight, ACCOUNT_MERKLE_LEVELS, ASSET_MERKLE_LEVELS, NFT_MERKLE_LEVELS,
};
use lru::LruCache;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use sha3::{Digest, Sha3_256};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

fn hash_fields(fields: &[&[u8]]) -> NodeHash {
    let mut h = Sha3_256::new();
    for f in fields {
        h.update(f);
    }
    let out = h.finalize();
    let mut a = [0u8; 32];
    a.copy_from_slice(&out);
    a
}

/// Asset leaf: H(balance, offerCanceledOrFinalized).
pub fn compute_asset_leaf_hash(balance: u128, offer_canceled_or_finalized: u128) -> NodeHash {
    hash_fields(&[
        &balance.to_be_bytes(),
        &offer_canceled_or_finalized.to_be_bytes(),
    ])
}

pub fn asset_leaf_hash(asset: &AccountAsset) -> NodeHash {
    compute_asset_leaf_hash(asset.balance, asset.offer_canceled_or_finalized)
}

/// Account leaf: H(l1Address, publicKey, nonce, collectionNonce, assetRoot).
pub fn compute_account_leaf_hash(
    l1_address: &L1Address,
    public_key: &PublicKey,
    nonce: u64,
    collection_nonce: u64,
    asset_root: &NodeHash,
) -> NodeHash {
    let mut padded_addr = [0u8; 32];
    padded_addr[12..].copy_from_slice(l1_address.as_bytes());
    hash_fields(&[
        &padded_addr,
        &public_key.to_fixed_bytes(),
        &nonce.to_be_bytes(),
        &collection_nonce.to_be_bytes(),
        asset_root,
    ])
}

pub fn account_leaf_hash(account: &Account, asset_root: &NodeHash) -> NodeHash {
    compute_account_leaf_hash(
        &account.l1_address,
        &account.public_key,
        account.nonce,
        account.collection_nonce,
        asset_root,
    )
}

/// NFT leaf: H(creator, owner, contentHash, treasuryRate, collectionId).
pub fn compute_nft_leaf_hash(
    creator_account_index: AccountIndex,
    owner_account_index: AccountIndex,
    nft_content_hash: &[u8; 32],
    creator_treasury_rate: u16,
    collection_id: u16,
) -> NodeHash {
    hash_fields(&[
        &creator_account_index.to_be_bytes(),
        &owner_account_index.to_be_bytes(),
        nft_content_hash,
        &creator_treasury_rate.to_be_bytes(),
        &collection_id.to_be_bytes(),
    ])
}

pub fn nft_leaf_hash(nft: &Nft) -> NodeHash {
    compute_nft_leaf_hash(
        nft.creator_account_index,
        nft.owner_account_index,
        &nft.nft_content_hash,
        nft.creator_treasury_rate,
        nft.collection_id,
    )
}

/// State root: H(accountTreeRoot, nftTreeRoot) — the single L2 commitment.
pub fn compute_state_root(account_root: &NodeHash, nft_root: &NodeHash) -> NodeHash {
    hash_pair(account_root, nft_root)
}

/// Nil leaf of the asset tree: the empty asset slot.
pub static NIL_ASSET_LEAF: Lazy<NodeHash> = Lazy::new(|| compute_asset_leaf_hash(0, 0));

/// Root of an account's empty asset tree.
pub static NIL_ASSET_ROOT: Lazy<NodeHash> = Lazy::new(|| new_asset_tree().root());

/// Nil leaf of the account tree: the empty account over an empty asset tree.
pub static NIL_ACCOUNT_LEAF: Lazy<NodeHash> = Lazy::new(|| {
    compute_account_leaf_hash(
        &L1Address::default(),
        &PublicKey::empty(),
        0,
        0,
        &NIL_ASSET_ROOT,
    )
});

/// Nil leaf of the NFT tree: the all-zero NFT sentinel.
pub static NIL_NFT_LEAF: Lazy<NodeHash> =
    Lazy::new(|| compute_nft_leaf_hash(0, 0, &[0u8; 32], 0, 0));

pub fn new_account_tree() -> SparseMerkleTree {
    SparseMerkleTree::new(ACCOUNT_MERKLE_LEVELS, *NIL_ACCOUNT_LEAF)
}

pub fn new_asset_tree() -> SparseMerkleTree {
    SparseMerkleTree::new(ASSET_MERKLE_LEVELS, *NIL_ASSET_LEAF)
}

pub fn new_nft_tree() -> SparseMerkleTree {
    SparseMerkleTree::new(NFT_MERKLE_LEVELS, *NIL_NFT_LEAF)
}

/// A memoized empty asset tree for padding witness slots.
pub static EMPTY_ASSET_TREE: Lazy<SparseMerkleTree> = Lazy::new(new_asset_tree);

/// Loader used by the cache to rebuild an account's asset tree from
/// persistent storage at a block height.
pub type AssetTreeLoader =
    Arc<dyn Fn(AccountIndex, BlockHeight) -> SparseMerkleTree + Send + Sync>;

/// LRU of per-account asset trees with lazy reconstruction.
///
/// The LRU bounds memory only; correctness of persistence comes from the
/// write-ahead change set: `get_adapter` records the account index before
/// handing out a writable tree, and the block sealer drains the set. An
/// eviction of a tree whose latest version is past the flushed height
/// re-records the index so the flush cannot miss it.
pub struct AssetTreeCache {
    trees: Mutex<LruCache<AccountIndex, Arc<RwLock<SparseMerkleTree>>>>,
    changes: RwLock<HashSet<AccountIndex>>,
    loader: AssetTreeLoader,
    block_height: RwLock<BlockHeight>,
    next_account_index: RwLock<AccountIndex>,
    flushed_version: RwLock<Version>,
}

impl AssetTreeCache {
    pub fn new(
        capacity: usize,
        next_account_index: AccountIndex,
        block_height: BlockHeight,
        loader: AssetTreeLoader,
    ) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        AssetTreeCache {
            trees: Mutex::new(LruCache::new(cap)),
            changes: RwLock::new(HashSet::new()),
            loader,
            block_height: RwLock::new(block_height),
            next_account_index: RwLock::new(next_account_index),
            flushed_version: RwLock::new(block_height),
        }
    }

    /// Raise the cached block number / account horizon after a block seals.
    pub fn update_cache(&self, account_index: AccountIndex, block_height: BlockHeight) {
        let mut next = self.next_account_index.write();
        if *next < account_index {
            *next = account_index;
        }
        drop(next);
        let mut h = self.block_height.write();
        if *h < block_height {
            *h = block_height;
        }
    }

    pub fn next_account_index(&self) -> AccountIndex {
        *self.next_account_index.read() + 1
    }

    pub fn current_account_index(&self) -> AccountIndex {
        *self.next_account_index.read()
    }

    pub fn get(&self, account_index: AccountIndex) -> Arc<RwLock<SparseMerkleTree>> {
        let mut trees = self.trees.lock();
        if let Some(tree) = trees.get(&account_index) {
            return tree.clone();
        }
        let height = *self.block_height.read();
        let tree = Arc::new(RwLock::new((self.loader)(account_index, height)));
        #[cfg(feature = "metrics")]
        crate::metrics::ASSET_TREE_CACHE_LOADS.inc();
        if let Some((evicted_key, evicted)) = trees.push(account_index, tree.clone()) {
            if evicted_key != account_index {
                #[cfg(feature = "metrics")]
                crate::metrics::ASSET_TREE_CACHE_EVICTIONS.inc();
                self.note_eviction(evicted_key, &evicted);
            }
        }
        tree
    }

    /// Writable access: the account index lands in the change set before the
    /// tree is handed out, so a later flush re-persists it even if the LRU
    /// evicts the tree in between.
    pub fn get_adapter(&self, account_index: AccountIndex) -> Arc<RwLock<SparseMerkleTree>> {
        self.changes.write().insert(account_index);
        self.get(account_index)
    }

    fn note_eviction(&self, key: AccountIndex, tree: &Arc<RwLock<SparseMerkleTree>>) {
        let flushed = *self.flushed_version.read();
        if tree.read().version() > flushed {
            log::info!("asset tree {key} evicted from cache with unflushed changes");
            self.changes.write().insert(key);
        }
    }

    /// Drain the change set, ordered for deterministic flushing.
    pub fn take_changes(&self) -> Vec<AccountIndex> {
        let mut changes = self.changes.write();
        let mut out: Vec<AccountIndex> = changes.drain().collect();
        out.sort_unstable();
        out
    }

    pub fn changes(&self) -> Vec<AccountIndex> {
        let mut out: Vec<AccountIndex> = self.changes.read().iter().copied().collect();
        out.sort_unstable();
        out
    }

    pub fn mark_flushed(&self, version: Version) {
        *self.flushed_version.write() = version;
    }
}

/// Roll back every cached asset tree plus the account and NFT trees to
/// `version`, verifying root continuity afterwards.
pub fn rollback_trees(
    account_tree: &mut SparseMerkleTree,
    nft_tree: &mut SparseMerkleTree,
    cache: &AssetTreeCache,
    version: Version,
) -> Result<(), StateError> {
    account_tree.rollback(version)?;
    nft_tree.rollback(version)?;
    let mut trees = cache.trees.lock();
    for (_, tree) in trees.iter_mut() {
        let mut t = tree.write();
        if t.version() > version {
            t.rollback(version)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_hashes_are_field_sensitive() {
        let a = compute_asset_leaf_hash(1, 0);
        let b = compute_asset_leaf_hash(0, 1);
        assert_ne!(a, b);
        let n1 = compute_nft_leaf_hash(1, 2, &[3u8; 32], 4, 5);
        let n2 = compute_nft_leaf_hash(1, 2, &[3u8; 32], 4, 6);
        assert_ne!(n1, n2);
    }

    #[test]
    fn nil_roots_are_consistent() {
        assert_eq!(new_asset_tree().root(), *NIL_ASSET_ROOT);
        assert_eq!(EMPTY_ASSET_TREE.root(), *NIL_ASSET_ROOT);
    }

    fn cache_with_counter() -> (AssetTreeCache, Arc<std::sync::atomic::AtomicUsize>) {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let cache = AssetTreeCache::new(
            2,
            0,
            0,
            Arc::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                new_asset_tree()
            }),
        );
        (cache, loads)
    }

    #[test]
    fn lazy_loading_and_memoization() {
        use std::sync::atomic::Ordering;
        let (cache, loads) = cache_with_counter();
        cache.get(1);
        cache.get(1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        cache.get(2);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn adapter_records_change() {
        let (cache, _) = cache_with_counter();
        cache.get_adapter(7);
        assert_eq!(cache.changes(), vec![7]);
        assert_eq!(cache.take_changes(), vec![7]);
        assert!(cache.changes().is_empty());
    }

    #[test]
    fn eviction_keeps_unflushed_changes_visible() {
        let (cache, _) = cache_with_counter();
        {
            let tree = cache.get_adapter(1);
            tree.write().set(0, [9u8; 32], 5).unwrap();
        }
        cache.take_changes();
        // Capacity is 2: touching 2 and 3 evicts tree 1, which still holds
        // versions past the flushed mark.
        cache.get(2);
        cache.get(3);
        assert_eq!(cache.changes(), vec![1]);
    }

    #[test]
    fn rollback_restores_cached_roots() {
        let (cache, _) = cache_with_counter();
        let mut account_tree = new_account_tree();
        let mut nft_tree = new_nft_tree();
        let tree = cache.get_adapter(1);
        let base = tree.read().root();
        tree.write().set(0, [1u8; 32], 1).unwrap();
        account_tree.set(1, [2u8; 32], 1).unwrap();
        rollback_trees(&mut account_tree, &mut nft_tree, &cache, 0).unwrap();
        assert_eq!(tree.read().root(), base);
        assert_eq!(account_tree.root(), new_account_tree().root());
    }
}
