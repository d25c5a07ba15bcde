//! Orchestrates block production: executes pooled transactions through the
//! commit processor, recomputes the tree triad from the dirty slots (asset
//! trees fan out in parallel; each account's tree is disjoint), seals the
//! block, and hands the artifact to the persistence pipeline.

use crate::block::{compute_commitment, rounded_block_size, Block};
use crate::pipeline::SealedBlock;
use crate::processor::{CommitProcessor, NonceHintCache, ProcessError};
use crate::statedb::StateDb;
use crate::store::PoolTx;
use keel_ledger::error::{StateError, TxError};
use keel_ledger::merkle::SparseMerkleTree;
use keel_ledger::records::BlockStatus;
use keel_ledger::tree::{
    account_leaf_hash, asset_leaf_hash, compute_state_root, nft_leaf_hash, rollback_trees,
    AssetTreeCache,
};
use keel_ledger::types::{AccountIndex, BlockHeight};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    #[error("block aborted: {0}")]
    Abort(#[from] ProcessError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("tx error during seal: {0}")]
    Tx(#[from] TxError),
}

pub struct BlockProcessor {
    pub state: StateDb,
    account_tree: Arc<RwLock<SparseMerkleTree>>,
    nft_tree: Arc<RwLock<SparseMerkleTree>>,
    asset_trees: Arc<AssetTreeCache>,
    nonce_hints: Arc<dyn NonceHintCache>,
    last_state_root: [u8; 32],
}

impl BlockProcessor {
    pub fn new(
        state: StateDb,
        account_tree: Arc<RwLock<SparseMerkleTree>>,
        nft_tree: Arc<RwLock<SparseMerkleTree>>,
        asset_trees: Arc<AssetTreeCache>,
        nonce_hints: Arc<dyn NonceHintCache>,
    ) -> Self {
        let last_state_root = compute_state_root(&account_tree.read().root(), &nft_tree.read().root());
        BlockProcessor {
            state,
            account_tree,
            nft_tree,
            asset_trees,
            nonce_hints,
            last_state_root,
        }
    }

    pub fn last_state_root(&self) -> [u8; 32] {
        self.last_state_root
    }

    /// Execute one pool tx. A rejection is reported back for pool pruning;
    /// an abort rewinds the offending account's pending-nonce hint
    /// (best-effort) before surfacing the fatal error.
    pub fn execute_tx(&mut self, pool_tx: PoolTx) -> Result<(), ProcessError> {
        let initiator = pool_tx.tx_info.from_account_index();
        match CommitProcessor::process(&mut self.state, pool_tx) {
            Ok(_) => {
                crate::metrics::tx_executed_inc();
                Ok(())
            }
            Err(ProcessError::Reject(e)) => {
                crate::metrics::tx_rejected_inc();
                Err(ProcessError::Reject(e))
            }
            Err(abort) => {
                if let Some(account_index) = initiator {
                    self.rewind_nonce_hint(account_index);
                }
                Err(abort)
            }
        }
    }

    fn rewind_nonce_hint(&self, account_index: AccountIndex) {
        match self.state.get_account(account_index) {
            Ok(account) if account.nonce > 0 => self
                .nonce_hints
                .set_pending_nonce(account_index, account.nonce - 1),
            _ => self.nonce_hints.clear_pending_nonce(account_index),
        }
    }

    /// Process a batch: rejected txs are skipped (and reported), any abort is
    /// fatal. Returns the pool ids that must leave the pool.
    pub fn execute_batch(&mut self, txs: Vec<PoolTx>) -> Result<Vec<u64>, BlockError> {
        let mut consumed = Vec::with_capacity(txs.len());
        for tx in txs {
            let id = tx.pool_tx_id;
            match self.execute_tx(tx) {
                Ok(()) => consumed.push(id),
                Err(ProcessError::Reject(e)) => {
                    log::warn!("tx {id} rejected: {e}");
                    consumed.push(id);
                }
                Err(abort) => return Err(BlockError::Abort(abort)),
            }
        }
        Ok(consumed)
    }

    /// Seal the current block: fold gas, recompute trees, build the block
    /// record, and promote pending state. Returns None when nothing executed.
    pub fn seal_block(
        &mut self,
        height: BlockHeight,
        timestamp_ms: u64,
        pool_tx_ids: Vec<u64>,
    ) -> Result<Option<SealedBlock>, BlockError> {
        if self.state.txs.is_empty() {
            self.state.discard_pending();
            return Ok(None);
        }
        self.state.apply_pending_gas()?;

        // Fan out: every dirty account owns a disjoint asset tree.
        let dirty: Vec<(AccountIndex, Vec<u16>)> = self
            .state
            .dirty_account_assets()
            .iter()
            .map(|(k, v)| (*k, v.iter().copied().collect()))
            .collect();
        let state = &self.state;
        let asset_trees = &self.asset_trees;
        let new_roots: Result<Vec<(AccountIndex, [u8; 32])>, BlockError> = dirty
            .par_iter()
            .map(|(account_index, assets)| {
                let account = state.get_account(*account_index)?;
                let tree = asset_trees.get_adapter(*account_index);
                let mut tree = tree.write();
                for asset_id in assets {
                    tree.set(
                        *asset_id as u64,
                        asset_leaf_hash(&account.asset(*asset_id)),
                        height,
                    )?;
                }
                Ok((*account_index, tree.root()))
            })
            .collect();
        let new_roots = new_roots?;

        // Account leaves over the shifted asset roots, then NFT leaves.
        {
            let mut account_tree = self.account_tree.write();
            for (account_index, asset_root) in new_roots {
                let mut account = self.state.get_account(account_index)?;
                account.asset_root = asset_root;
                self.state.set_pending_account(account_index, account.clone());
                account_tree.set(
                    account_index as u64,
                    account_leaf_hash(&account, &asset_root),
                    height,
                )?;
            }
        }
        {
            let mut nft_tree = self.nft_tree.write();
            for nft_index in self.state.dirty_nfts().clone() {
                let nft = self.state.get_nft(nft_index)?;
                nft_tree.set(nft_index, nft_leaf_hash(&nft), height)?;
            }
        }

        let state_root =
            compute_state_root(&self.account_tree.read().root(), &self.nft_tree.read().root());
        let real_block_size = self.state.txs.len() as u16;
        let commitment = compute_commitment(
            height,
            &self.last_state_root,
            &state_root,
            &self.state.pub_data,
            &self.state.pending_onchain_ops_hash,
            timestamp_ms,
            rounded_block_size(real_block_size as usize),
        );

        let block = Block {
            height,
            state_root,
            commitment,
            pub_data: self.state.pub_data.clone(),
            pub_data_offsets: self.state.pub_data_offsets.clone(),
            priority_operations: self.state.priority_operations,
            pending_onchain_ops_hash: self.state.pending_onchain_ops_hash,
            pending_onchain_ops_pubdata: self.state.pending_onchain_ops_pubdata.clone(),
            real_block_size,
            block_size: rounded_block_size(real_block_size as usize),
            timestamp_ms,
            status: BlockStatus::Pending,
            txs: self.state.txs.clone(),
        };
        let compressed = block.compressed();
        let metadata_history = self.state.pending_metadata_history.clone();

        let (changed_accounts, changed_nfts) = self.state.commit_pending(height);
        self.asset_trees.update_cache(
            changed_accounts
                .iter()
                .map(|a| a.account_index)
                .max()
                .unwrap_or(0),
            height,
        );
        self.asset_trees.mark_flushed(height);
        self.last_state_root = state_root;
        self.state.block_height = height;
        crate::metrics::block_height_set(height as i64);

        log::info!(
            "sealed block {height}: {} txs, root {}",
            real_block_size,
            hex::encode(state_root)
        );
        Ok(Some(SealedBlock {
            block,
            compressed,
            changed_accounts,
            changed_nfts,
            metadata_history,
            pool_tx_ids,
        }))
    }

    /// Roll state and trees back to `height` after a block revert.
    pub fn rollback(&mut self, height: BlockHeight) -> Result<(), BlockError> {
        let mut account_tree = self.account_tree.write();
        let mut nft_tree = self.nft_tree.write();
        rollback_trees(&mut account_tree, &mut nft_tree, &self.asset_trees, height)?;
        drop(account_tree);
        drop(nft_tree);
        self.state.rollback_above(height)?;
        self.last_state_root =
            compute_state_root(&self.account_tree.read().root(), &self.nft_tree.read().root());
        Ok(())
    }
}
