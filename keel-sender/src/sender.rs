//! The two settlement loops and the receipt reconciler.
//!
//! Shared discipline: at most one Pending L1 tx per type; height ranges
//! resume after the last Handled record; submission happens only when one of
//! the three thresholds (tx count, block age, cheap-enough unit gas) says
//! so; a same-nonce retry escalates the gas price by 10% steps under a
//! configured cap and abandons the round past it.

use crate::config::SenderConfig;
use crate::contract::{L1Client, RollupContract};
use crate::monitor::{parse_receipt_events, RollupEvent};
use crate::signer::RollupSigner;
use crate::store::{ProofStore, RollupTxStore};
use anyhow::{anyhow, bail, Context, Result};
use ethers::types::{H256, U256};
use keel_ledger::records::{BlockStatus, L1RollupTx, L1RollupTxStatus, L1RollupTxType};
use keel_node::block::{genesis_stored_block_info, StoredBlockInfo, VerifyAndExecuteBlockInfo};
use keel_node::store::BlockStore;
use keel_witness::pack_proofs;
use std::sync::Arc;
use tracing::{error, info, warn};

pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub struct Sender {
    config: SenderConfig,
    client: Arc<dyn L1Client>,
    contract: RollupContract,
    commit_signer: Arc<dyn RollupSigner>,
    verify_signer: Arc<dyn RollupSigner>,
    rollup_txs: Arc<dyn RollupTxStore>,
    proofs: Arc<dyn ProofStore>,
    blocks: Arc<dyn BlockStore>,
    genesis_state_root: [u8; 32],
    now_ms: Clock,
}

impl Sender {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SenderConfig,
        client: Arc<dyn L1Client>,
        contract: RollupContract,
        commit_signer: Arc<dyn RollupSigner>,
        verify_signer: Arc<dyn RollupSigner>,
        rollup_txs: Arc<dyn RollupTxStore>,
        proofs: Arc<dyn ProofStore>,
        blocks: Arc<dyn BlockStore>,
        genesis_state_root: [u8; 32],
        now_ms: Clock,
    ) -> Self {
        Sender {
            config,
            client,
            contract,
            commit_signer,
            verify_signer,
            rollup_txs,
            proofs,
            blocks,
            genesis_state_root,
            now_ms,
        }
    }

    async fn base_gas_price(&self) -> Result<U256> {
        if self.config.gas_price > 0 {
            return Ok(U256::from(self.config.gas_price));
        }
        self.client
            .suggest_gas_price()
            .await
            .context("failed to fetch gas price")
    }

    fn gas_price_cap(&self, base: U256) -> U256 {
        base + base * U256::from(self.config.max_gas_price_increase_percentage) / U256::from(100)
    }

    /// +10% (floor); None when past the cap, meaning: abandon this round.
    fn bump_gas_price(&self, current: U256, cap: U256) -> Option<U256> {
        let bumped = current + current / U256::from(10);
        if bumped > cap {
            None
        } else {
            Some(bumped)
        }
    }

    fn is_underpriced(err: &anyhow::Error) -> bool {
        let msg = format!("{err:#}").to_ascii_lowercase();
        msg.contains("underpriced")
    }

    /// Load compressed blocks for commit, shrinking the batch while its tx
    /// count sits above the configured limit.
    fn compressed_blocks_for_commit(&self, start: u64) -> Vec<keel_node::block::CompressedBlock> {
        let mut max_count = self.config.max_commit_block_count;
        loop {
            let batch = self.blocks.compressed_between(start, start + max_count - 1);
            let total: u64 = batch.iter().map(|b| b.real_block_size as u64).sum();
            if total < self.config.commit_tx_count_limit || max_count == 1 {
                return batch;
            }
            max_count -= 1;
        }
    }

    fn committed_blocks_for_verify(&self, start: u64) -> Vec<keel_node::block::Block> {
        let mut max_count = self.config.max_verify_block_count;
        loop {
            let batch = self.blocks.blocks_between(
                start,
                start + max_count - 1,
                Some(BlockStatus::Committed),
            );
            let total: u64 = batch.iter().map(|b| b.real_block_size as u64).sum();
            if total < self.config.verify_tx_count_limit || max_count == 1 {
                return batch;
            }
            max_count -= 1;
        }
    }

    fn last_stored_block_info(&self, last_handled: Option<&L1RollupTx>) -> Result<StoredBlockInfo> {
        match last_handled {
            None => Ok(genesis_stored_block_info(self.genesis_state_root)),
            Some(tx) => self
                .blocks
                .block_by_height(tx.l2_block_height)
                .map(|b| b.stored_block_info())
                .ok_or_else(|| anyhow!("handled block {} missing", tx.l2_block_height)),
        }
    }

    pub async fn commit_blocks(&self) -> Result<()> {
        // At most one outstanding commit tx.
        if self.rollup_txs.latest_pending(L1RollupTxType::Commit).is_some() {
            return Ok(());
        }
        let last_handled = self.rollup_txs.latest_handled(L1RollupTxType::Commit);
        let start = last_handled.as_ref().map(|t| t.l2_block_height + 1).unwrap_or(1);

        let batch = self.compressed_blocks_for_commit(start);
        if batch.is_empty() {
            return Ok(());
        }
        let total_tx_count: u64 = batch.iter().map(|b| b.real_block_size as u64).sum();
        let oldest_timestamp = batch[0].timestamp_ms;
        let commit_infos: Vec<_> = batch.iter().map(|b| b.commit_block_info()).collect();
        let last_block_info = self.last_stored_block_info(last_handled.as_ref())?;
        let target_height = batch.last().map(|b| b.height).unwrap_or(start);

        let base = self.base_gas_price().await?;
        let cap = self.gas_price_cap(base);
        let mut gas_price = base;

        let nonce = self
            .client
            .pending_nonce(self.commit_signer.address())
            .await
            .context("failed to get nonce for commit")?;
        if let Some(prior) = self
            .rollup_txs
            .latest_by_nonce(nonce, L1RollupTxType::Commit)
        {
            if prior.l1_nonce == nonce {
                match self.bump_gas_price(U256::from(prior.gas_price), cap) {
                    Some(bumped) => {
                        info!(nonce, %bumped, "speeding up commit under the same nonce");
                        gas_price = bumped;
                    }
                    None => {
                        warn!(nonce, "abandoning commit: escalated gas price exceeds the cap");
                        return Ok(());
                    }
                }
            }
        }

        loop {
            let contract = &self.contract;
            let from = self.commit_signer.address();
            let gas_limit = self.config.gas_limit;
            let last_ref = &last_block_info;
            let infos_ref = &commit_infos;
            let current_gas_price = gas_price;
            let should_commit = self
                .should_submit_now(
                    total_tx_count,
                    oldest_timestamp,
                    self.config.max_commit_tx_count,
                    self.config.max_commit_block_interval_secs,
                    self.config.max_commit_avg_unit_gas,
                    move || async move {
                        contract
                            .estimate_commit_gas(
                                from,
                                last_ref,
                                infos_ref,
                                current_gas_price,
                                gas_limit,
                                nonce,
                            )
                            .await
                    },
                )
                .await;
            if !should_commit {
                info!("deferring commit: no threshold met");
                return Ok(());
            }

            match self
                .contract
                .commit_blocks_with_nonce(
                    self.commit_signer.as_ref(),
                    &last_block_info,
                    &commit_infos,
                    gas_price,
                    self.config.gas_limit,
                    nonce,
                )
                .await
            {
                Ok(tx_hash) => {
                    self.rollup_txs.create(L1RollupTx {
                        l1_tx_hash: format!("{tx_hash:#x}"),
                        tx_type: L1RollupTxType::Commit,
                        tx_status: L1RollupTxStatus::Pending,
                        l2_block_height: target_height,
                        l1_nonce: nonce,
                        gas_price: gas_price.as_u128(),
                        updated_at_ms: (self.now_ms)(),
                    });
                    info!(height = target_height, %tx_hash, "blocks committed");
                    return Ok(());
                }
                Err(e) if Self::is_underpriced(&e) => {
                    let fresh = self
                        .client
                        .pending_nonce(self.commit_signer.address())
                        .await?;
                    if fresh != nonce {
                        bail!("commit retry lost its nonce ({nonce} -> {fresh})");
                    }
                    match self.bump_gas_price(gas_price, cap) {
                        Some(bumped) => {
                            warn!(%bumped, "commit underpriced, retrying with higher gas");
                            gas_price = bumped;
                        }
                        None => {
                            warn!("abandoning commit: gas escalation exhausted");
                            return Ok(());
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn verify_and_execute_blocks(&self) -> Result<()> {
        if self
            .rollup_txs
            .latest_pending(L1RollupTxType::VerifyAndExecute)
            .is_some()
        {
            return Ok(());
        }
        let last_handled = self
            .rollup_txs
            .latest_handled(L1RollupTxType::VerifyAndExecute);
        let start = last_handled.as_ref().map(|t| t.l2_block_height + 1).unwrap_or(1);

        let batch = self.committed_blocks_for_verify(start);
        if batch.is_empty() {
            return Ok(());
        }

        let heights: Vec<u64> = batch.iter().map(|b| b.height).collect();
        let proofs = self
            .proofs
            .proofs_between(start, start + batch.len() as u64 - 1);
        if proofs.len() != batch.len() {
            info!(
                have = proofs.len(),
                need = batch.len(),
                "related proofs not ready"
            );
            return Ok(());
        }
        // One proof per block, bound to its height; 8 words each.
        let packed = pack_proofs(&proofs, &heights)?;

        let verify_infos: Vec<VerifyAndExecuteBlockInfo> = batch
            .iter()
            .map(|b| VerifyAndExecuteBlockInfo {
                block_header: b.stored_block_info(),
                pending_onchain_ops_pubdata: b.pending_onchain_ops_pubdata.clone(),
            })
            .collect();
        let total_tx_count: u64 = batch.iter().map(|b| b.real_block_size as u64).sum();
        let oldest_timestamp = batch[0].timestamp_ms;
        let target_height = heights.last().copied().unwrap_or(start);

        let base = self.base_gas_price().await?;
        let cap = self.gas_price_cap(base);
        let mut gas_price = base;

        let nonce = self
            .client
            .pending_nonce(self.verify_signer.address())
            .await
            .context("failed to get nonce for verify")?;
        if let Some(prior) = self
            .rollup_txs
            .latest_by_nonce(nonce, L1RollupTxType::VerifyAndExecute)
        {
            if prior.l1_nonce == nonce {
                match self.bump_gas_price(U256::from(prior.gas_price), cap) {
                    Some(bumped) => {
                        info!(nonce, %bumped, "speeding up verify under the same nonce");
                        gas_price = bumped;
                    }
                    None => {
                        warn!(nonce, "abandoning verify: escalated gas price exceeds the cap");
                        return Ok(());
                    }
                }
            }
        }

        loop {
            let contract = &self.contract;
            let from = self.verify_signer.address();
            let gas_limit = self.config.gas_limit;
            let infos_ref = &verify_infos;
            let packed_ref = &packed;
            let current_gas_price = gas_price;
            let should_verify = self
                .should_submit_now(
                    total_tx_count,
                    oldest_timestamp,
                    self.config.max_verify_tx_count,
                    self.config.max_verify_block_interval_secs,
                    self.config.max_verify_avg_unit_gas,
                    move || async move {
                        contract
                            .estimate_verify_gas(
                                from,
                                infos_ref,
                                packed_ref,
                                current_gas_price,
                                gas_limit,
                                nonce,
                            )
                            .await
                    },
                )
                .await;
            if !should_verify {
                info!("deferring verify: no threshold met");
                return Ok(());
            }

            match self
                .contract
                .verify_and_execute_blocks_with_nonce(
                    self.verify_signer.as_ref(),
                    &verify_infos,
                    &packed,
                    gas_price,
                    self.config.gas_limit,
                    nonce,
                )
                .await
            {
                Ok(tx_hash) => {
                    self.rollup_txs.create(L1RollupTx {
                        l1_tx_hash: format!("{tx_hash:#x}"),
                        tx_type: L1RollupTxType::VerifyAndExecute,
                        tx_status: L1RollupTxStatus::Pending,
                        l2_block_height: target_height,
                        l1_nonce: nonce,
                        gas_price: gas_price.as_u128(),
                        updated_at_ms: (self.now_ms)(),
                    });
                    info!(height = target_height, %tx_hash, "blocks sent for verification");
                    return Ok(());
                }
                Err(e) if Self::is_underpriced(&e) => {
                    let fresh = self
                        .client
                        .pending_nonce(self.verify_signer.address())
                        .await?;
                    if fresh != nonce {
                        bail!("verify retry lost its nonce ({nonce} -> {fresh})");
                    }
                    match self.bump_gas_price(gas_price, cap) {
                        Some(bumped) => {
                            warn!(%bumped, "verify underpriced, retrying with higher gas");
                            gas_price = bumped;
                        }
                        None => {
                            warn!("abandoning verify: gas escalation exhausted");
                            return Ok(());
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The three submit-now triggers, in order of cost.
    async fn should_submit_now<F, Fut>(
        &self,
        total_tx_count: u64,
        oldest_timestamp_ms: u64,
        max_tx_count: u64,
        max_interval_secs: u64,
        max_avg_unit_gas: u64,
        estimate: F,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<u64>>,
    {
        if total_tx_count > max_tx_count {
            return true;
        }
        let age_secs = ((self.now_ms)().saturating_sub(oldest_timestamp_ms)) / 1000;
        if age_secs > max_interval_secs {
            return true;
        }
        match estimate().await {
            Ok(estimated) => {
                let unit_gas = estimated / total_tx_count.max(1);
                unit_gas <= max_avg_unit_gas
            }
            Err(e) => {
                error!("gas estimation failed, deferring submission: {e:#}");
                false
            }
        }
    }

    /// Poll every Pending L1 tx: reap the timed-out, panic on an included
    /// failure, and on finality mark rollup txs handled (plus proofs
    /// confirmed and block statuses advanced) atomically.
    pub async fn update_sent_txs(&self) -> Result<()> {
        let pending = self.rollup_txs.all_pending();
        if pending.is_empty() {
            return Ok(());
        }
        let latest_l1_height = self
            .client
            .block_number()
            .await
            .context("failed to get l1 height")?;

        let mut handled_hashes = Vec::new();
        let mut confirmed_proof_blocks = Vec::new();
        let mut committed_heights = Vec::new();
        let mut verified_heights = Vec::new();

        for tx in &pending {
            let hash: H256 = tx
                .l1_tx_hash
                .parse()
                .map_err(|_| anyhow!("bad stored tx hash {}", tx.l1_tx_hash))?;
            let receipt = match self.client.transaction_receipt(hash).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(hash = %tx.l1_tx_hash, "receipt query failed: {e:#}");
                    None
                }
            };
            let Some(receipt) = receipt else {
                let age_ms = (self.now_ms)().saturating_sub(tx.updated_at_ms);
                if age_ms > self.config.max_waiting_time_secs * 1000 {
                    // Reap so the next tick can resubmit.
                    warn!(hash = %tx.l1_tx_hash, "deleting timed-out l1 rollup tx");
                    self.rollup_txs.delete(&tx.l1_tx_hash);
                }
                continue;
            };

            if receipt.status == Some(0.into()) {
                self.rollup_txs.delete(&tx.l1_tx_hash);
                error!(hash = %tx.l1_tx_hash, "included l1 tx reverted");
                panic!("unexpected failed l1 tx: {}", tx.l1_tx_hash);
            }

            let receipt_height = receipt.block_number.map(|n| n.as_u64()).unwrap_or(0);
            if latest_l1_height < receipt_height + self.config.confirm_blocks_count {
                continue; // not finalized yet
            }

            let mut valid = false;
            for event in parse_receipt_events(&receipt) {
                match event {
                    RollupEvent::BlockCommit { block_number } => {
                        if block_number as u64 == tx.l2_block_height {
                            valid = true;
                        }
                        committed_heights.push(block_number as u64);
                    }
                    RollupEvent::BlockVerification { block_number } => {
                        if block_number as u64 == tx.l2_block_height {
                            valid = true;
                        }
                        verified_heights.push(block_number as u64);
                        confirmed_proof_blocks.push(block_number as u64);
                    }
                    RollupEvent::BlocksRevert { total_committed, .. } => {
                        warn!(total_committed, "blocks revert observed on l1");
                    }
                    _ => {}
                }
            }
            if valid {
                handled_hashes.push(tx.l1_tx_hash.clone());
            }
        }

        // One atomic status update for rollup txs and proofs.
        self.rollup_txs
            .mark_handled_with_proofs(&handled_hashes, &confirmed_proof_blocks);
        self.proofs.confirm(&confirmed_proof_blocks);
        for height in committed_heights {
            self.blocks.update_status(height, BlockStatus::Committed);
        }
        for height in verified_heights {
            self.blocks.update_status(height, BlockStatus::Verified);
        }
        Ok(())
    }
}
