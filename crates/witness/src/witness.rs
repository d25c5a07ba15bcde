//! Fixed-shape witness records. Every tx witness carries the same number of
//! account slots, asset slots, and proof levels; unused slots are padded with
//! empty-leaf sentinels so the circuit shape never varies.

use crate::WitnessError;
use keel_ledger::merkle::NodeHash;
use keel_ledger::tx::TxInfo;
use keel_ledger::types::{
    ACCOUNT_MERKLE_LEVELS, ASSET_MERKLE_LEVELS, LAST_ACCOUNT_ASSET_ID, NFT_MERKLE_LEVELS,
};

/// Account slots reserved per transaction witness.
pub const NB_ACCOUNTS_PER_TX: usize = 4;
/// Asset slots reserved per account in a transaction witness.
pub const NB_ACCOUNT_ASSETS_PER_ACCOUNT: usize = 2;

pub type AccountProof = [NodeHash; ACCOUNT_MERKLE_LEVELS];
pub type AssetProof = [NodeHash; ASSET_MERKLE_LEVELS];
pub type NftProof = [NodeHash; NFT_MERKLE_LEVELS];

pub fn fixed_account_proof(proof: Vec<NodeHash>) -> Result<AccountProof, WitnessError> {
    proof
        .try_into()
        .map_err(|v: Vec<NodeHash>| WitnessError::BadProofDepth {
            expected: ACCOUNT_MERKLE_LEVELS,
            got: v.len(),
        })
}

pub fn fixed_asset_proof(proof: Vec<NodeHash>) -> Result<AssetProof, WitnessError> {
    proof
        .try_into()
        .map_err(|v: Vec<NodeHash>| WitnessError::BadProofDepth {
            expected: ASSET_MERKLE_LEVELS,
            got: v.len(),
        })
}

pub fn fixed_nft_proof(proof: Vec<NodeHash>) -> Result<NftProof, WitnessError> {
    proof
        .try_into()
        .map_err(|v: Vec<NodeHash>| WitnessError::BadProofDepth {
            expected: NFT_MERKLE_LEVELS,
            got: v.len(),
        })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountAssetWitness {
    pub asset_id: u64,
    pub balance: u128,
    pub offer_canceled_or_finalized: u128,
}

impl AccountAssetWitness {
    pub fn empty(asset_id: u64) -> Self {
        AccountAssetWitness {
            asset_id,
            balance: 0,
            offer_canceled_or_finalized: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountWitness {
    pub account_index: u64,
    pub l1_address: [u8; 20],
    pub public_key: Vec<u8>,
    pub nonce: u64,
    pub collection_nonce: u64,
    pub asset_root: NodeHash,
    pub assets: [AccountAssetWitness; NB_ACCOUNT_ASSETS_PER_ACCOUNT],
}

impl AccountWitness {
    pub fn empty(account_index: u64, asset_root: NodeHash) -> Self {
        AccountWitness {
            account_index,
            l1_address: [0u8; 20],
            public_key: Vec::new(),
            nonce: 0,
            collection_nonce: 0,
            asset_root,
            assets: std::array::from_fn(|_| AccountAssetWitness::empty(LAST_ACCOUNT_ASSET_ID)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NftWitness {
    pub nft_index: u64,
    pub creator_account_index: u64,
    pub owner_account_index: u64,
    pub nft_content_hash: [u8; 32],
    pub creator_treasury_rate: u64,
    pub collection_id: u64,
}

impl NftWitness {
    pub fn empty(nft_index: u64) -> Self {
        NftWitness {
            nft_index,
            creator_account_index: 0,
            owner_account_index: 0,
            nft_content_hash: [0u8; 32],
            creator_treasury_rate: 0,
            collection_id: 0,
        }
    }
}

/// One transaction's witness: before-images and Merkle paths for everything
/// the circuit re-executes, plus the after-root it must arrive at.
#[derive(Clone, Debug)]
pub struct TxWitness {
    pub tx_type: u8,
    pub nonce: u64,
    pub expired_at: i64,
    pub signature: Vec<u8>,
    pub tx_info: TxInfo,

    pub account_root_before: NodeHash,
    pub nft_root_before: NodeHash,
    pub state_root_before: NodeHash,
    pub state_root_after: NodeHash,

    pub accounts_info_before: [AccountWitness; NB_ACCOUNTS_PER_TX],
    pub merkle_proofs_account_before: Box<[AccountProof; NB_ACCOUNTS_PER_TX]>,
    pub merkle_proofs_account_assets_before:
        Box<[[AssetProof; NB_ACCOUNT_ASSETS_PER_ACCOUNT]; NB_ACCOUNTS_PER_TX]>,

    pub nft_before: NftWitness,
    pub merkle_proofs_nft_before: Box<NftProof>,
}

/// The per-block gas witness: the gas account's before-image and proofs for
/// each gas asset, or the empty sentinel when no L2 tx paid gas.
#[derive(Clone, Debug)]
pub struct GasWitness {
    pub needs_gas: bool,
    pub account_info_before: AccountWitness,
    pub merkle_proofs_account_before: Box<AccountProof>,
    pub merkle_proofs_account_assets_before: Vec<AssetProof>,
}
