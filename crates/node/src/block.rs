//! Sealed block records and the on-chain header shapes the sender submits.

use crate::store::ExecutedTx;
use keel_ledger::records::BlockStatus;
use keel_ledger::types::{round_up_block_size, BlockHeight};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub state_root: [u8; 32],
    pub commitment: [u8; 32],
    pub pub_data: Vec<u8>,
    pub pub_data_offsets: Vec<u32>,
    pub priority_operations: u64,
    pub pending_onchain_ops_hash: [u8; 32],
    pub pending_onchain_ops_pubdata: Vec<Vec<u8>>,
    /// Number of txs actually executed.
    pub real_block_size: u16,
    /// `real_block_size` rounded up to a permitted size.
    pub block_size: u16,
    pub timestamp_ms: u64,
    pub status: BlockStatus,
    pub txs: Vec<ExecutedTx>,
}

/// The minimal record needed to replay a commit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompressedBlock {
    pub height: BlockHeight,
    pub state_root: [u8; 32],
    pub public_data: Vec<u8>,
    pub public_data_offsets: Vec<u32>,
    pub real_block_size: u16,
    pub block_size: u16,
    pub timestamp_ms: u64,
    pub priority_operations: u64,
    pub pending_onchain_ops_hash: [u8; 32],
    pub pending_onchain_ops_pubdata: Vec<Vec<u8>>,
    pub commitment: [u8; 32],
}

/// `StoredBlockInfo` as the settlement contract hashes it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlockInfo {
    pub block_size: u16,
    pub block_number: u32,
    pub priority_operations: u64,
    pub pending_onchain_operations_hash: [u8; 32],
    pub timestamp: u64,
    pub state_root: [u8; 32],
    pub commitment: [u8; 32],
}

/// `CommitBlockInfo` for `commitBlocks`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitBlockInfo {
    pub new_state_root: [u8; 32],
    pub public_data: Vec<u8>,
    pub timestamp: u64,
    pub public_data_offsets: Vec<u32>,
    pub block_number: u32,
    pub block_size: u16,
}

/// One entry of `verifyAndExecuteBlocks`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyAndExecuteBlockInfo {
    pub block_header: StoredBlockInfo,
    pub pending_onchain_ops_pubdata: Vec<Vec<u8>>,
}

/// Block commitment: binds height, the previous and new state roots, the
/// pubdata, the on-chain-ops hash, and the timestamp.
pub fn compute_commitment(
    height: BlockHeight,
    old_state_root: &[u8; 32],
    new_state_root: &[u8; 32],
    pub_data: &[u8],
    pending_onchain_ops_hash: &[u8; 32],
    timestamp_ms: u64,
    block_size: u16,
) -> [u8; 32] {
    let mut pubdata_hasher = Keccak256::new();
    pubdata_hasher.update(pub_data);
    let pubdata_hash = pubdata_hasher.finalize();

    let mut h = Keccak256::new();
    h.update(height.to_be_bytes());
    h.update(old_state_root);
    h.update(new_state_root);
    h.update(pubdata_hash);
    h.update(pending_onchain_ops_hash);
    h.update(timestamp_ms.to_be_bytes());
    h.update(block_size.to_be_bytes());
    let out = h.finalize();
    let mut a = [0u8; 32];
    a.copy_from_slice(&out);
    a
}

impl Block {
    pub fn stored_block_info(&self) -> StoredBlockInfo {
        StoredBlockInfo {
            block_size: self.block_size,
            block_number: self.height as u32,
            priority_operations: self.priority_operations,
            pending_onchain_operations_hash: self.pending_onchain_ops_hash,
            timestamp: self.timestamp_ms,
            state_root: self.state_root,
            commitment: self.commitment,
        }
    }

    pub fn compressed(&self) -> CompressedBlock {
        CompressedBlock {
            height: self.height,
            state_root: self.state_root,
            public_data: self.pub_data.clone(),
            public_data_offsets: self.pub_data_offsets.clone(),
            real_block_size: self.real_block_size,
            block_size: self.block_size,
            timestamp_ms: self.timestamp_ms,
            priority_operations: self.priority_operations,
            pending_onchain_ops_hash: self.pending_onchain_ops_hash,
            pending_onchain_ops_pubdata: self.pending_onchain_ops_pubdata.clone(),
            commitment: self.commitment,
        }
    }
}

impl CompressedBlock {
    pub fn commit_block_info(&self) -> CommitBlockInfo {
        CommitBlockInfo {
            new_state_root: self.state_root,
            public_data: self.public_data.clone(),
            timestamp: self.timestamp_ms,
            public_data_offsets: self.public_data_offsets.clone(),
            block_number: self.height as u32,
            block_size: self.block_size,
        }
    }
}

/// The genesis header the first commit builds on.
pub fn genesis_stored_block_info(state_root: [u8; 32]) -> StoredBlockInfo {
    StoredBlockInfo {
        block_size: 0,
        block_number: 0,
        priority_operations: 0,
        pending_onchain_operations_hash: crate::statedb::EMPTY_STRING_KECCAK,
        timestamp: 0,
        state_root,
        commitment: [0u8; 32],
    }
}

pub fn rounded_block_size(real: usize) -> u16 {
    round_up_block_size(real) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_is_sensitive_to_every_input() {
        let base = compute_commitment(1, &[0; 32], &[1; 32], &[1, 2, 3], &[2; 32], 42, 4);
        assert_ne!(
            base,
            compute_commitment(2, &[0; 32], &[1; 32], &[1, 2, 3], &[2; 32], 42, 4)
        );
        assert_ne!(
            base,
            compute_commitment(1, &[0; 32], &[1; 32], &[1, 2, 4], &[2; 32], 42, 4)
        );
        assert_ne!(
            base,
            compute_commitment(1, &[0; 32], &[1; 32], &[1, 2, 3], &[2; 32], 43, 4)
        );
    }

    #[test]
    fn block_size_rounds_to_permitted_set() {
        assert_eq!(rounded_block_size(3), 4);
        assert_eq!(rounded_block_size(5), 8);
    }
}
