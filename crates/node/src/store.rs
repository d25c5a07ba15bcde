//! Storage traits the core issues its queries through, plus in-memory
//! implementations used by tests and the single-process node. A relational
//! backend satisfies the same traits out of tree.

use keel_ledger::account::Account;
use keel_ledger::nft::Nft;
use keel_ledger::records::{
    BlockStatus, NftMetadataHistory, PriorityRequest, PriorityRequestStatus,
};
use keel_ledger::tx::TxInfo;
use keel_ledger::tx_detail::TxDetail;
use keel_ledger::types::{
    AccountIndex, AssetId, BlockHeight, CollectionId, NftIndex, TxType,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxStatus {
    Pending = 1,
    Executed = 2,
    Packed = 3,
    Failed = 4,
}

/// A submission sitting in the pool, waiting for the block processor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTx {
    pub pool_tx_id: u64,
    pub tx_hash: String,
    pub tx_info: TxInfo,
    pub created_at_ms: u64,
}

/// The persistable record of an executed transaction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutedTx {
    pub pool_tx_id: u64,
    pub tx_hash: String,
    pub tx_type: TxType,
    pub tx_info: TxInfo,
    pub account_index: Option<AccountIndex>,
    pub nonce: Option<u64>,
    pub expired_at: i64,
    pub gas_fee_asset_id: Option<AssetId>,
    pub gas_fee: Option<u128>,
    pub asset_id: Option<u64>,
    pub tx_amount: Option<u128>,
    pub nft_index: Option<NftIndex>,
    pub collection_id: Option<CollectionId>,
    pub block_height: BlockHeight,
    pub tx_index: i64,
    pub status: TxStatus,
    pub details: Vec<TxDetail>,
}

pub trait TxPool: Send + Sync {
    fn push(&self, tx: PoolTx);
    /// Pull up to `limit` txs in pool order (deterministic by id).
    fn pull(&self, limit: usize) -> Vec<PoolTx>;
    fn remove(&self, pool_tx_ids: &[u64]);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait BlockStore: Send + Sync {
    fn save_block(&self, block: crate::block::Block);
    fn save_compressed_block(&self, block: crate::block::CompressedBlock);
    fn block_by_height(&self, height: BlockHeight) -> Option<crate::block::Block>;
    fn blocks_between(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        status: Option<BlockStatus>,
    ) -> Vec<crate::block::Block>;
    fn compressed_between(&self, from: BlockHeight, to: BlockHeight)
        -> Vec<crate::block::CompressedBlock>;
    fn update_status(&self, height: BlockHeight, status: BlockStatus);
    fn current_height(&self) -> BlockHeight;
    /// Rollback support: drop everything above `height`.
    fn delete_above(&self, height: BlockHeight);
}

pub trait AccountHistoryStore: Send + Sync {
    fn save_accounts(&self, height: BlockHeight, accounts: &[Account]);
    fn account_at(&self, index: AccountIndex, height: BlockHeight) -> Option<Account>;
    fn delete_above(&self, height: BlockHeight);
}

pub trait NftHistoryStore: Send + Sync {
    fn save_nfts(&self, height: BlockHeight, nfts: &[Nft]);
    fn save_metadata_history(&self, row: NftMetadataHistory);
    fn deferred_pins(&self) -> Vec<NftMetadataHistory>;
    fn delete_above(&self, height: BlockHeight);
}

pub trait PriorityRequestStore: Send + Sync {
    fn enqueue(&self, request: PriorityRequest);
    fn pending(&self, limit: usize) -> Vec<PriorityRequest>;
    fn mark_handled(&self, request_ids: &[u64]);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemTxPool {
    inner: RwLock<VecDeque<PoolTx>>,
}

impl TxPool for MemTxPool {
    fn push(&self, tx: PoolTx) {
        self.inner.write().push_back(tx);
    }

    fn pull(&self, limit: usize) -> Vec<PoolTx> {
        let pool = self.inner.read();
        pool.iter().take(limit).cloned().collect()
    }

    fn remove(&self, pool_tx_ids: &[u64]) {
        let mut pool = self.inner.write();
        pool.retain(|tx| !pool_tx_ids.contains(&tx.pool_tx_id));
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }
}

#[derive(Default)]
pub struct MemBlockStore {
    blocks: RwLock<BTreeMap<BlockHeight, crate::block::Block>>,
    compressed: RwLock<BTreeMap<BlockHeight, crate::block::CompressedBlock>>,
}

impl BlockStore for MemBlockStore {
    fn save_block(&self, block: crate::block::Block) {
        self.blocks.write().insert(block.height, block);
    }

    fn save_compressed_block(&self, block: crate::block::CompressedBlock) {
        self.compressed.write().insert(block.height, block);
    }

    fn block_by_height(&self, height: BlockHeight) -> Option<crate::block::Block> {
        self.blocks.read().get(&height).cloned()
    }

    fn blocks_between(
        &self,
        from: BlockHeight,
        to: BlockHeight,
        status: Option<BlockStatus>,
    ) -> Vec<crate::block::Block> {
        self.blocks
            .read()
            .range(from..=to)
            .map(|(_, b)| b.clone())
            .filter(|b| status.map(|s| b.status == s).unwrap_or(true))
            .collect()
    }

    fn compressed_between(
        &self,
        from: BlockHeight,
        to: BlockHeight,
    ) -> Vec<crate::block::CompressedBlock> {
        self.compressed
            .read()
            .range(from..=to)
            .map(|(_, b)| b.clone())
            .collect()
    }

    fn update_status(&self, height: BlockHeight, status: BlockStatus) {
        if let Some(b) = self.blocks.write().get_mut(&height) {
            b.status = status;
        }
    }

    fn current_height(&self) -> BlockHeight {
        self.blocks.read().keys().max().copied().unwrap_or(0)
    }

    fn delete_above(&self, height: BlockHeight) {
        self.blocks.write().retain(|h, _| *h <= height);
        self.compressed.write().retain(|h, _| *h <= height);
    }
}

#[derive(Default)]
pub struct MemAccountHistory {
    // (index, height) -> snapshot
    rows: RwLock<HashMap<AccountIndex, BTreeMap<BlockHeight, Account>>>,
}

impl AccountHistoryStore for MemAccountHistory {
    fn save_accounts(&self, height: BlockHeight, accounts: &[Account]) {
        let mut rows = self.rows.write();
        for a in accounts {
            rows.entry(a.account_index)
                .or_default()
                .insert(height, a.clone());
        }
    }

    fn account_at(&self, index: AccountIndex, height: BlockHeight) -> Option<Account> {
        self.rows
            .read()
            .get(&index)
            .and_then(|h| h.range(..=height).next_back().map(|(_, a)| a.clone()))
    }

    fn delete_above(&self, height: BlockHeight) {
        let mut rows = self.rows.write();
        for history in rows.values_mut() {
            history.retain(|h, _| *h <= height);
        }
    }
}

#[derive(Default)]
pub struct MemNftHistory {
    rows: RwLock<HashMap<NftIndex, BTreeMap<BlockHeight, Nft>>>,
    metadata: RwLock<Vec<NftMetadataHistory>>,
}

impl NftHistoryStore for MemNftHistory {
    fn save_nfts(&self, height: BlockHeight, nfts: &[Nft]) {
        let mut rows = self.rows.write();
        for n in nfts {
            rows.entry(n.nft_index).or_default().insert(height, n.clone());
        }
    }

    fn save_metadata_history(&self, row: NftMetadataHistory) {
        self.metadata.write().push(row);
    }

    fn deferred_pins(&self) -> Vec<NftMetadataHistory> {
        self.metadata
            .read()
            .iter()
            .filter(|r| r.status == keel_ledger::records::MetadataPinStatus::Deferred)
            .cloned()
            .collect()
    }

    fn delete_above(&self, height: BlockHeight) {
        let mut rows = self.rows.write();
        for history in rows.values_mut() {
            history.retain(|h, _| *h <= height);
        }
        self.metadata
            .write()
            .retain(|r| r.l2_block_height <= height);
    }
}

#[derive(Default)]
pub struct MemPriorityRequests {
    rows: RwLock<Vec<PriorityRequest>>,
}

impl PriorityRequestStore for MemPriorityRequests {
    fn enqueue(&self, request: PriorityRequest) {
        self.rows.write().push(request);
    }

    fn pending(&self, limit: usize) -> Vec<PriorityRequest> {
        self.rows
            .read()
            .iter()
            .filter(|r| r.status == PriorityRequestStatus::Pending)
            .take(limit)
            .cloned()
            .collect()
    }

    fn mark_handled(&self, request_ids: &[u64]) {
        let mut rows = self.rows.write();
        for r in rows.iter_mut() {
            if request_ids.contains(&r.request_id) {
                r.status = PriorityRequestStatus::Handled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_ledger::address::L1Address;

    #[test]
    fn pool_pull_is_fifo_and_remove_filters() {
        let pool = MemTxPool::default();
        for id in 0..3 {
            pool.push(PoolTx {
                pool_tx_id: id,
                tx_hash: format!("0x{id:02x}"),
                tx_info: TxInfo::Deposit(keel_ledger::tx::DepositTx {
                    account_index: 0,
                    l1_address: L1Address([1; 20]),
                    asset_id: 0,
                    asset_amount: 1,
                }),
                created_at_ms: id,
            });
        }
        let pulled = pool.pull(2);
        assert_eq!(pulled.len(), 2);
        assert_eq!(pulled[0].pool_tx_id, 0);
        pool.remove(&[0, 1]);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn account_history_is_height_versioned() {
        let store = MemAccountHistory::default();
        let mut a = Account::new(2, L1Address([2; 20]), [0u8; 32]);
        store.save_accounts(1, std::slice::from_ref(&a));
        a.nonce = 5;
        store.save_accounts(3, std::slice::from_ref(&a));

        assert_eq!(store.account_at(2, 1).unwrap().nonce, 0);
        assert_eq!(store.account_at(2, 2).unwrap().nonce, 0);
        assert_eq!(store.account_at(2, 9).unwrap().nonce, 5);
        store.delete_above(1);
        assert_eq!(store.account_at(2, 9).unwrap().nonce, 0);
    }
}
