use crate::types::{AccountIndex, AssetId, NftIndex};

/// Errors raised while decoding at-rest or on-wire bytes. Always fatal to the
/// offending record; never retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid pubdata size: expected {expected}, got {got}")]
    InvalidSize { expected: usize, got: usize },
    #[error("buffer too short at offset {offset}, need {need} more bytes")]
    ShortBuffer { offset: usize, need: usize },
    #[error("unknown tx type byte {0}")]
    UnknownTxType(u8),
    #[error("fee amount not representable as packed fee")]
    FeeOverflow,
    #[error("packed fee decodes above u128 range")]
    FeeDecodeOverflow,
    #[error("malformed json payload: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e.to_string())
    }
}

/// Validation errors: the transaction is rejected and dropped from the pool,
/// surfaced to the API as a typed application error.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("invalid tx info")]
    InvalidTxInfo,
    #[error("unsupported tx type")]
    UnsupportedTxType,
    #[error("account {0} not found")]
    AccountNotFound(AccountIndex),
    #[error("account with l1 address {0} not found")]
    AccountByAddressNotFound(String),
    #[error("nft {0} not found")]
    NftNotFound(NftIndex),
    #[error("bad nonce: expected {expected}, got {got}")]
    BadNonce { expected: u64, got: u64 },
    #[error("balance not enough for asset {asset_id}: have {have}, need {need}")]
    BalanceNotEnough { asset_id: AssetId, have: u128, need: u128 },
    #[error("bad signature")]
    BadSignature,
    #[error("tx expired at {expired_at}, now {now}")]
    Expired { expired_at: i64, now: i64 },
    #[error("invalid l1 address")]
    InvalidL1Address,
    #[error("l1 address already registered")]
    L1AddressCollision,
    #[error("account has no registered public key")]
    EmptyPublicKey,
    #[error("invalid to account")]
    InvalidToAccount,
    #[error("account is not the owner of the nft")]
    NotNftOwner,
    #[error("invalid collection id")]
    InvalidCollectionId,
    #[error("invalid treasury rate")]
    InvalidTreasuryRate,
    #[error("offer already canceled or finalized")]
    OfferAlreadyConsumed,
    #[error("invalid offer: {0}")]
    InvalidOffer(String),
    #[error("offer not alive: listed_at {listed_at}, expired_at {expired_at}, now {now}")]
    OfferNotAlive { listed_at: i64, expired_at: i64, now: i64 },
    #[error("buy and sell offers do not match: {0}")]
    OfferMismatch(String),
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("gas fee amount below required minimum")]
    GasFeeTooLow,
    #[error("invalid asset amount")]
    InvalidAssetAmount,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// State-consistency failures. The block processor treats these as fatal:
/// the process must stop and restart from the last confirmed block.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("state root mismatch: expected {expected}, got {got}")]
    RootMismatch { expected: String, got: String },
    #[error("merkle proof has wrong depth: expected {expected}, got {got}")]
    BadProofDepth { expected: usize, got: usize },
    #[error("tree version {requested} not available (latest {latest})")]
    VersionNotFound { requested: u64, latest: u64 },
    #[error("rollback to version {0} would cross a flushed boundary")]
    RollbackTooFar(u64),
    #[error("account {0} missing from state cache")]
    MissingAccount(AccountIndex),
    #[error("nft {0} missing from state cache")]
    MissingNft(NftIndex),
    #[error("tree integrity: {0}")]
    Integrity(String),
}
