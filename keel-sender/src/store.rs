//! Storage the sender issues queries through: L1 rollup txs and proofs.
//! Block data comes from `keel_node::store::BlockStore`.

use keel_ledger::records::{L1RollupTx, L1RollupTxStatus, L1RollupTxType, ProofStatus};
use keel_witness::FormattedProof;
use parking_lot::RwLock;
use std::collections::HashMap;

pub trait RollupTxStore: Send + Sync {
    fn create(&self, tx: L1RollupTx);
    fn latest_pending(&self, tx_type: L1RollupTxType) -> Option<L1RollupTx>;
    fn latest_handled(&self, tx_type: L1RollupTxType) -> Option<L1RollupTx>;
    /// Includes soft-deleted rows: a reaped attempt still pins its nonce for
    /// the gas-escalation path.
    fn latest_by_nonce(&self, nonce: u64, tx_type: L1RollupTxType) -> Option<L1RollupTx>;
    fn all_pending(&self) -> Vec<L1RollupTx>;
    /// Soft delete: the row leaves the pending set but stays queryable by
    /// nonce.
    fn delete(&self, l1_tx_hash: &str);
    /// Atomic receipt reconciliation: flip rollup txs to Handled and confirm
    /// the named proofs in one step.
    fn mark_handled_with_proofs(&self, l1_tx_hashes: &[String], confirmed_blocks: &[u64]);
}

pub trait ProofStore: Send + Sync {
    fn save(&self, proof: FormattedProof);
    fn proofs_between(&self, from: u64, to: u64) -> Vec<FormattedProof>;
    fn status(&self, block_number: u64) -> Option<ProofStatus>;
    fn confirm(&self, block_numbers: &[u64]);
}

#[derive(Default)]
pub struct MemRollupTxStore {
    // (row, soft-deleted)
    rows: RwLock<Vec<(L1RollupTx, bool)>>,
    proofs: RwLock<HashMap<u64, ProofStatus>>,
}

impl MemRollupTxStore {
    pub fn rows(&self) -> Vec<L1RollupTx> {
        self.rows.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Seed a soft-deleted attempt (tests for the nonce-reuse path).
    pub fn seed_deleted(&self, tx: L1RollupTx) {
        self.rows.write().push((tx, true));
    }
}

impl RollupTxStore for MemRollupTxStore {
    fn create(&self, tx: L1RollupTx) {
        self.rows.write().push((tx, false));
    }

    fn latest_pending(&self, tx_type: L1RollupTxType) -> Option<L1RollupTx> {
        self.rows
            .read()
            .iter()
            .filter(|(t, deleted)| {
                !deleted && t.tx_type == tx_type && t.tx_status == L1RollupTxStatus::Pending
            })
            .map(|(t, _)| t)
            .max_by_key(|t| t.l2_block_height)
            .cloned()
    }

    fn latest_handled(&self, tx_type: L1RollupTxType) -> Option<L1RollupTx> {
        self.rows
            .read()
            .iter()
            .filter(|(t, deleted)| {
                !deleted && t.tx_type == tx_type && t.tx_status == L1RollupTxStatus::Handled
            })
            .map(|(t, _)| t)
            .max_by_key(|t| t.l2_block_height)
            .cloned()
    }

    fn latest_by_nonce(&self, nonce: u64, tx_type: L1RollupTxType) -> Option<L1RollupTx> {
        self.rows
            .read()
            .iter()
            .filter(|(t, _)| t.tx_type == tx_type && t.l1_nonce == nonce)
            .map(|(t, _)| t)
            .max_by_key(|t| t.l2_block_height)
            .cloned()
    }

    fn all_pending(&self) -> Vec<L1RollupTx> {
        self.rows
            .read()
            .iter()
            .filter(|(t, deleted)| !deleted && t.tx_status == L1RollupTxStatus::Pending)
            .map(|(t, _)| t.clone())
            .collect()
    }

    fn delete(&self, l1_tx_hash: &str) {
        let mut rows = self.rows.write();
        for (row, deleted) in rows.iter_mut() {
            if row.l1_tx_hash == l1_tx_hash {
                *deleted = true;
            }
        }
    }

    fn mark_handled_with_proofs(&self, l1_tx_hashes: &[String], confirmed_blocks: &[u64]) {
        let mut rows = self.rows.write();
        let mut proofs = self.proofs.write();
        for (row, _) in rows.iter_mut() {
            if l1_tx_hashes.contains(&row.l1_tx_hash) {
                row.tx_status = L1RollupTxStatus::Handled;
            }
        }
        for block in confirmed_blocks {
            proofs.insert(*block, ProofStatus::Confirmed);
        }
    }
}

#[derive(Default)]
pub struct MemProofStore {
    rows: RwLock<HashMap<u64, (FormattedProof, ProofStatus)>>,
}

impl ProofStore for MemProofStore {
    fn save(&self, proof: FormattedProof) {
        self.rows
            .write()
            .insert(proof.block_number, (proof, ProofStatus::NotConfirmed));
    }

    fn proofs_between(&self, from: u64, to: u64) -> Vec<FormattedProof> {
        let rows = self.rows.read();
        let mut out: Vec<FormattedProof> = rows
            .values()
            .filter(|(p, _)| p.block_number >= from && p.block_number <= to)
            .map(|(p, _)| p.clone())
            .collect();
        out.sort_by_key(|p| p.block_number);
        out
    }

    fn status(&self, block_number: u64) -> Option<ProofStatus> {
        self.rows.read().get(&block_number).map(|(_, s)| *s)
    }

    fn confirm(&self, block_numbers: &[u64]) {
        let mut rows = self.rows.write();
        for block in block_numbers {
            if let Some(entry) = rows.get_mut(block) {
                entry.1 = ProofStatus::Confirmed;
            }
        }
    }
}
