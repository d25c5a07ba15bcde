pub mod account;

pub mod address;

pub mod codec;

pub mod collection_meta;

pub mod config;

pub mod error;

pub mod merkle;

pub mod nft;

pub mod nft_meta;

pub mod packed_fee;

pub mod pubdata;

pub mod records;

pub mod sign_body;

pub mod tree;

pub mod tx;

pub mod tx_detail;

pub mod types;

pub use account::{offer_bit_set, offer_slot, set_offer_bit, Account, AccountAsset};

pub use address::{L1Address, PublicKey};

pub use error::{CodecError, StateError, TxError};

pub use merkle::{hash_pair, verify_proof, NodeHash, SparseMerkleTree, Version};

pub use nft::{Collection, Nft};

pub use packed_fee::{normalize_fee, pack_fee, PackedFee};

pub use records::{
    BlockStatus, L1RollupTx, L1RollupTxStatus, L1RollupTxType, MetadataPinStatus,
    NftMetadataHistory, PriorityRequest, PriorityRequestStatus, ProofStatus,
};

pub use tree::{
    account_leaf_hash, asset_leaf_hash, compute_account_leaf_hash, compute_asset_leaf_hash,
    compute_nft_leaf_hash, compute_state_root, new_account_tree, new_asset_tree, new_nft_tree,
    nft_leaf_hash, AssetTreeCache, AssetTreeLoader, EMPTY_ASSET_TREE, NIL_ACCOUNT_LEAF,
    NIL_ASSET_LEAF, NIL_ASSET_ROOT, NIL_NFT_LEAF,
};

pub use tx::{
    AtomicMatchTx, CancelOfferTx, CreateCollectionTx, DepositNftTx, DepositTx, FullExitNftTx,
    FullExitTx, MintNftTx, Offer, RegisterZnsTx, TransferNftTx, TransferTx, TxInfo, TxSignature,
    WithdrawNftTx, WithdrawTx,
};

pub use tx_detail::{
    compute_new_balance, fungible_delta_sum, AssetType, BalanceDelta, BalanceSnapshot, NftSnapshot,
    TxDetail, NIL_ACCOUNT_ORDER,
};

pub use types::{
    AccountIndex, AccountStatus, AssetId, BlockHeight, CollectionId, NftIndex, Nonce, OfferId,
    OfferType, TreasuryRate, TxType, FEE_RATE_BASE, GAS_ACCOUNT_INDEX, GAS_ASSETS,
    LAST_ACCOUNT_ASSET_ID, LAST_ACCOUNT_INDEX, LAST_NFT_INDEX, OFFERS_PER_ASSET,
    PUBDATA_BYTES_PER_TX,
};

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(not(feature = "metrics"))]
pub mod metrics_shim;

#[cfg(not(feature = "metrics"))]
pub use self::metrics_shim as metrics;
