//! Single-process node: in-memory stores, a block loop over the tx pool, and
//! the staged persistence pipeline. The sender runs as its own binary.

use keel_ledger::account::Account;
use keel_ledger::address::L1Address;
use keel_ledger::tree::{new_account_tree, new_asset_tree, new_nft_tree, AssetTreeCache, NIL_ASSET_ROOT};
use keel_ledger::types::GAS_ACCOUNT_INDEX;
use keel_node::{
    BlockPipeline, BlockProcessor, BlockStore, MemAccountHistory, MemBlockStore, MemNftHistory,
    MemTxPool, NoopNonceHints, StateDb, TxPool,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut state = StateDb::new();
    // The gas account exists from genesis.
    let mut gas = Account::new(GAS_ACCOUNT_INDEX, L1Address([0x01; 20]), *NIL_ASSET_ROOT);
    gas.status = keel_ledger::AccountStatus::Confirmed;
    state.insert_confirmed_account(gas);

    let account_tree = Arc::new(RwLock::new(new_account_tree()));
    let nft_tree = Arc::new(RwLock::new(new_nft_tree()));
    let asset_trees = Arc::new(AssetTreeCache::new(
        4096,
        GAS_ACCOUNT_INDEX,
        0,
        Arc::new(|_, _| new_asset_tree()),
    ));

    let block_store = Arc::new(MemBlockStore::default());
    let account_history = Arc::new(MemAccountHistory::default());
    let nft_history = Arc::new(MemNftHistory::default());
    let tx_pool = Arc::new(MemTxPool::default());

    let mut processor = BlockProcessor::new(
        state,
        account_tree,
        nft_tree,
        asset_trees,
        Arc::new(NoopNonceHints),
    );
    let pipeline = BlockPipeline::new(
        64,
        block_store.clone(),
        account_history,
        nft_history,
        tx_pool.clone(),
    );

    log::info!(
        "node started, genesis state root {}",
        hex::encode(processor.last_state_root())
    );

    let block_cfg = keel_ledger::config::BlockCfg::default();
    let mut height = block_store.current_height();
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    loop {
        tick.tick().await;
        let batch = tx_pool.pull(block_cfg.max_block_size);
        if batch.is_empty() {
            continue;
        }
        height += 1;
        let timestamp = now_ms();
        processor.state.block_height = height;
        processor.state.block_timestamp_ms = timestamp as i64;
        let consumed = match processor.execute_batch(batch) {
            Ok(ids) => {
                // Prune immediately so the next tick cannot re-pull them;
                // the pipeline's pool stage is idempotent.
                tx_pool.remove(&ids);
                ids
            }
            Err(e) => {
                log::error!("fatal block error at height {height}: {e}");
                // State may be inconsistent; stop and restart from the last
                // confirmed block.
                std::process::exit(1);
            }
        };
        match processor.seal_block(height, timestamp, consumed.clone()) {
            Ok(Some(sealed)) => pipeline.submit(sealed).await,
            Ok(None) => {
                // All candidates were rejected; nothing sealed this round.
                height -= 1;
            }
            Err(e) => {
                log::error!("fatal seal error at height {height}: {e}");
                std::process::exit(1);
            }
        }
    }
}
