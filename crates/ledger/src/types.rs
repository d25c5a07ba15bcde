//! Core index types and protocol constants shared across the workspace.

use serde::{Deserialize, Serialize};

pub type AccountIndex = u32;
pub type AssetId = u16;
pub type NftIndex = u64;
pub type CollectionId = u16;
pub type Nonce = u64;
pub type OfferId = u64;
pub type BlockHeight = u64;
pub type TreasuryRate = u16;

/// The distinguished account that accumulates L2 fees.
pub const GAS_ACCOUNT_INDEX: AccountIndex = 1;

/// Assets a fee may be paid in.
pub const GAS_ASSETS: [AssetId; 2] = [0, 1];

/// Offer bits live in a 128-bit bitmap per asset slot.
pub const OFFERS_PER_ASSET: u64 = 128;

/// Treasury/royalty rates are expressed in basis points of this base.
pub const FEE_RATE_BASE: u64 = 10_000;

// Tree geometry. Key widths match the index widths of the pubdata layout.
pub const ACCOUNT_MERKLE_LEVELS: usize = 32;
pub const ASSET_MERKLE_LEVELS: usize = 16;
pub const NFT_MERKLE_LEVELS: usize = 40;

pub const LAST_ACCOUNT_INDEX: u64 = (1 << ACCOUNT_MERKLE_LEVELS) - 1;
pub const LAST_ACCOUNT_ASSET_ID: u64 = (1 << ASSET_MERKLE_LEVELS) - 1;
pub const LAST_NFT_INDEX: u64 = (1 << NFT_MERKLE_LEVELS) - 1;

// Pubdata field widths (bytes).
pub const TX_TYPE_BYTES: usize = 1;
pub const ADDRESS_BYTES: usize = 20;
pub const PADDED_ADDRESS_BYTES: usize = 32;
pub const ACCOUNT_INDEX_BYTES: usize = 4;
pub const ASSET_ID_BYTES: usize = 2;
pub const STATE_AMOUNT_BYTES: usize = 16;
pub const NFT_INDEX_BYTES: usize = 5;
pub const NFT_CONTENT_HASH_BYTES: usize = 32;
pub const FEE_RATE_BYTES: usize = 2;
pub const COLLECTION_ID_BYTES: usize = 2;
pub const PACKED_FEE_BYTES: usize = 5;
pub const PUBKEY_BYTES: usize = 65;
pub const OFFER_ID_BYTES: usize = 8;

/// Every tx's pubdata is suffix-padded to this many bytes.
pub const PUBDATA_CHUNK_BYTES: usize = 32;
pub const PUBDATA_CHUNKS_PER_TX: usize = 6;
pub const PUBDATA_BYTES_PER_TX: usize = PUBDATA_CHUNK_BYTES * PUBDATA_CHUNKS_PER_TX;

// Priority-request record sizes, enforced at parse time.
pub const REGISTER_ZNS_PUBDATA_SIZE: usize =
    TX_TYPE_BYTES + ACCOUNT_INDEX_BYTES + ADDRESS_BYTES + PUBKEY_BYTES;
pub const DEPOSIT_PUBDATA_SIZE: usize = TX_TYPE_BYTES
    + ACCOUNT_INDEX_BYTES
    + PADDED_ADDRESS_BYTES
    + ASSET_ID_BYTES
    + STATE_AMOUNT_BYTES;
pub const DEPOSIT_NFT_PUBDATA_SIZE: usize = TX_TYPE_BYTES
    + ACCOUNT_INDEX_BYTES
    + NFT_INDEX_BYTES
    + ACCOUNT_INDEX_BYTES
    + FEE_RATE_BYTES
    + NFT_CONTENT_HASH_BYTES
    + PADDED_ADDRESS_BYTES
    + COLLECTION_ID_BYTES;
pub const FULL_EXIT_PUBDATA_SIZE: usize = DEPOSIT_PUBDATA_SIZE;
pub const FULL_EXIT_NFT_PUBDATA_SIZE: usize = TX_TYPE_BYTES
    + ACCOUNT_INDEX_BYTES
    + ACCOUNT_INDEX_BYTES
    + FEE_RATE_BYTES
    + NFT_INDEX_BYTES
    + COLLECTION_ID_BYTES
    + PADDED_ADDRESS_BYTES
    + PADDED_ADDRESS_BYTES
    + NFT_CONTENT_HASH_BYTES;

/// Closed set of transaction types. The discriminant is the first pubdata byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    Empty = 0,
    RegisterZns = 1,
    Deposit = 2,
    DepositNft = 3,
    Transfer = 4,
    Withdraw = 5,
    CreateCollection = 6,
    MintNft = 7,
    TransferNft = 8,
    AtomicMatch = 9,
    CancelOffer = 10,
    WithdrawNft = 11,
    FullExit = 12,
    FullExitNft = 13,
    Offer = 14,
}

impl TxType {
    pub fn from_u8(b: u8) -> Option<Self> {
        use TxType::*;
        Some(match b {
            0 => Empty,
            1 => RegisterZns,
            2 => Deposit,
            3 => DepositNft,
            4 => Transfer,
            5 => Withdraw,
            6 => CreateCollection,
            7 => MintNft,
            8 => TransferNft,
            9 => AtomicMatch,
            10 => CancelOffer,
            11 => WithdrawNft,
            12 => FullExit,
            13 => FullExitNft,
            14 => Offer,
            _ => return None,
        })
    }

    /// L2-originated txs pay gas, carry a signature, and bump the nonce.
    pub fn is_l2(self) -> bool {
        use TxType::*;
        matches!(
            self,
            Transfer
                | Withdraw
                | CreateCollection
                | MintNft
                | TransferNft
                | AtomicMatch
                | CancelOffer
                | WithdrawNft
        )
    }

    /// Priority operations originate on L1 and must be echoed back in the
    /// block's pending-on-chain-ops hash.
    pub fn is_priority_operation(self) -> bool {
        use TxType::*;
        matches!(self, RegisterZns | Deposit | DepositNft | FullExit | FullExitNft)
    }

    /// On-chain ops contribute their pubdata to `pending_onchain_ops_hash`.
    pub fn is_onchain_operation(self) -> bool {
        use TxType::*;
        matches!(
            self,
            Deposit | DepositNft | Withdraw | WithdrawNft | FullExit | FullExitNft
        )
    }
}

/// Account status lifecycle: registered but unconfirmed accounts stay Pending
/// until the block creating them is verified on L1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Pending,
    Confirmed,
}

/// Side of an offer inside an atomic match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OfferType {
    Buy = 0,
    Sell = 1,
}

/// Permitted sealed block sizes; `real_block_size` is rounded up to one of
/// these so the circuit shape stays in a small closed set.
pub const PERMITTED_BLOCK_SIZES: [usize; 5] = [1, 2, 4, 8, 16];

/// Round a tx count up to the nearest permitted block size.
/// Counts above the largest permitted size are the caller's bug.
pub fn round_up_block_size(real: usize) -> usize {
    for s in PERMITTED_BLOCK_SIZES {
        if real <= s {
            return s;
        }
    }
    PERMITTED_BLOCK_SIZES[PERMITTED_BLOCK_SIZES.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_type_round_trips_through_discriminant() {
        for b in 0u8..=14 {
            let t = TxType::from_u8(b).unwrap();
            assert_eq!(t as u8, b);
        }
        assert_eq!(TxType::from_u8(15), None);
    }

    #[test]
    fn priority_and_l2_sets_are_disjoint() {
        for b in 0u8..=14 {
            let t = TxType::from_u8(b).unwrap();
            assert!(!(t.is_l2() && t.is_priority_operation()));
        }
    }

    #[test]
    fn pubdata_record_sizes() {
        assert_eq!(REGISTER_ZNS_PUBDATA_SIZE, 90);
        assert_eq!(DEPOSIT_PUBDATA_SIZE, 55);
        assert_eq!(DEPOSIT_NFT_PUBDATA_SIZE, 82);
        assert_eq!(FULL_EXIT_PUBDATA_SIZE, 55);
        assert_eq!(FULL_EXIT_NFT_PUBDATA_SIZE, 114);
        // Every record must fit a single tx's per-tx pubdata size.
        assert!(FULL_EXIT_NFT_PUBDATA_SIZE <= PUBDATA_BYTES_PER_TX);
    }

    #[test]
    fn block_size_rounding() {
        assert_eq!(round_up_block_size(1), 1);
        assert_eq!(round_up_block_size(3), 4);
        assert_eq!(round_up_block_size(9), 16);
        assert_eq!(round_up_block_size(16), 16);
    }
}
