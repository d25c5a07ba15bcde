//! Persisted record shapes shared between the node and the sender. The
//! relational backend itself is an external collaborator; these are the rows
//! the core reads and writes.

use crate::types::{BlockHeight, TxType};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum L1RollupTxType {
    Commit = 1,
    VerifyAndExecute = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum L1RollupTxStatus {
    Pending = 1,
    Handled = 2,
}

/// One L1 transaction the sender has submitted and still reconciles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1RollupTx {
    pub l1_tx_hash: String,
    pub tx_type: L1RollupTxType,
    pub tx_status: L1RollupTxStatus,
    pub l2_block_height: BlockHeight,
    pub l1_nonce: u64,
    pub gas_price: u128,
    /// Wall-clock of the last status change, for the timeout reaper.
    pub updated_at_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PriorityRequestStatus {
    Pending = 1,
    Handled = 2,
}

/// A priority operation parsed from an L1 log, waiting to be executed on L2.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRequest {
    pub request_id: u64,
    pub tx_type: TxType,
    pub pubdata: Vec<u8>,
    pub status: PriorityRequestStatus,
    pub l1_tx_hash: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockStatus {
    Pending = 1,
    Committed = 2,
    Verified = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProofStatus {
    NotConfirmed = 0,
    Confirmed = 1,
}

/// Metadata pin lifecycle for minted NFTs; `Deferred` records a mint whose
/// IPFS upload must be retried later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MetadataPinStatus {
    Pinned = 1,
    Deferred = 2,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftMetadataHistory {
    pub nft_index: u64,
    pub metadata: String,
    pub ipns_name: Option<String>,
    pub ipns_id: Option<String>,
    pub status: MetadataPinStatus,
    pub l2_block_height: BlockHeight,
}
