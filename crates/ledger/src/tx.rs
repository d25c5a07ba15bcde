//! Typed transaction payloads. `TxInfo` is the closed tagged set the executor
//! framework dispatches on; the variants carry exactly the fields their
//! pubdata layouts and validation rules need.

use crate::address::{L1Address, PublicKey};
use crate::collection_meta::CollectionMetadata;
use crate::error::TxError;
use crate::nft_meta::NftMetadata;
use crate::types::{
    AccountIndex, AssetId, CollectionId, NftIndex, Nonce, OfferId, OfferType, TreasuryRate, TxType,
    FEE_RATE_BASE, LAST_ACCOUNT_INDEX, LAST_NFT_INDEX,
};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// 65-byte r||s||v recoverable signature over the canonical sign body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSignature(pub Vec<u8>);

impl TxSignature {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterZnsTx {
    pub account_index: AccountIndex,
    pub l1_address: L1Address,
    pub public_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTx {
    pub account_index: AccountIndex,
    pub l1_address: L1Address,
    pub asset_id: AssetId,
    pub asset_amount: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositNftTx {
    pub account_index: AccountIndex,
    pub l1_address: L1Address,
    pub nft_index: NftIndex,
    pub creator_account_index: AccountIndex,
    pub creator_treasury_rate: TreasuryRate,
    pub nft_content_hash: [u8; 32],
    pub collection_id: CollectionId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTx {
    pub from_account_index: AccountIndex,
    pub to_account_index: AccountIndex,
    /// Recipient's L1 address; must match the target account.
    pub to_l1_address: L1Address,
    pub asset_id: AssetId,
    pub asset_amount: u128,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawTx {
    pub from_account_index: AccountIndex,
    pub asset_id: AssetId,
    pub asset_amount: u128,
    pub to_address: L1Address,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCollectionTx {
    pub account_index: AccountIndex,
    /// Assigned from the account's collection nonce during Prepare.
    #[serde(default)]
    pub collection_id: CollectionId,
    pub name: String,
    pub metadata: CollectionMetadata,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintNftTx {
    pub creator_account_index: AccountIndex,
    pub to_account_index: AccountIndex,
    pub to_l1_address: L1Address,
    /// Assigned from the state's next NFT index during Prepare.
    #[serde(default)]
    pub nft_index: NftIndex,
    #[serde(default)]
    pub nft_content_hash: [u8; 32],
    pub nft_collection_id: CollectionId,
    pub creator_treasury_rate: TreasuryRate,
    pub meta_data: NftMetadata,
    #[serde(default)]
    pub ipns_name: Option<String>,
    #[serde(default)]
    pub ipns_id: Option<String>,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferNftTx {
    pub from_account_index: AccountIndex,
    pub to_account_index: AccountIndex,
    pub to_l1_address: L1Address,
    pub nft_index: NftIndex,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

/// A signed buy or sell intent consumed by `AtomicMatch`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub offer_type: OfferType,
    pub offer_id: OfferId,
    pub account_index: AccountIndex,
    pub nft_index: NftIndex,
    pub asset_id: AssetId,
    pub asset_amount: u128,
    pub listed_at: i64,
    pub expired_at: i64,
    /// Protocol fee rate in basis points, charged on the sell side.
    pub treasury_rate: TreasuryRate,
    #[serde(default)]
    pub sig: TxSignature,
}

impl Offer {
    pub fn is_alive_at(&self, now: i64) -> bool {
        self.listed_at <= now && now <= self.expired_at
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicMatchTx {
    /// Submitter; pays gas. Usually the seller relaying a matched pair.
    pub account_index: AccountIndex,
    pub buy_offer: Offer,
    pub sell_offer: Offer,
    /// Creator royalty carved out of the sale amount; derived during apply.
    #[serde(default)]
    pub creator_amount: u128,
    /// Protocol fee carved out of the sale amount; derived during apply.
    #[serde(default)]
    pub treasury_amount: u128,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOfferTx {
    pub account_index: AccountIndex,
    pub offer_id: OfferId,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawNftTx {
    pub account_index: AccountIndex,
    /// Filled from the NFT record during Prepare.
    #[serde(default)]
    pub creator_account_index: AccountIndex,
    #[serde(default)]
    pub creator_l1_address: L1Address,
    #[serde(default)]
    pub creator_treasury_rate: TreasuryRate,
    pub nft_index: NftIndex,
    #[serde(default)]
    pub collection_id: CollectionId,
    #[serde(default)]
    pub nft_content_hash: [u8; 32],
    pub to_address: L1Address,
    pub gas_account_index: AccountIndex,
    pub gas_fee_asset_id: AssetId,
    pub gas_fee_asset_amount: u128,
    pub nonce: Nonce,
    pub expired_at: i64,
    #[serde(default)]
    pub sig: TxSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullExitTx {
    /// Resolved from the L1 address during Prepare; zero when absent.
    #[serde(default)]
    pub account_index: AccountIndex,
    pub l1_address: L1Address,
    pub asset_id: AssetId,
    /// Resolved to the full balance during Prepare; zero for the
    /// empty-account path.
    #[serde(default)]
    pub asset_amount: u128,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullExitNftTx {
    #[serde(default)]
    pub account_index: AccountIndex,
    pub l1_address: L1Address,
    #[serde(default)]
    pub creator_account_index: AccountIndex,
    #[serde(default)]
    pub creator_l1_address: L1Address,
    #[serde(default)]
    pub creator_treasury_rate: TreasuryRate,
    pub nft_index: NftIndex,
    #[serde(default)]
    pub collection_id: CollectionId,
    #[serde(default)]
    pub nft_content_hash: [u8; 32],
}

/// The closed transaction set. Executor dispatch matches on this.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tx_type")]
pub enum TxInfo {
    RegisterZns(RegisterZnsTx),
    Deposit(DepositTx),
    DepositNft(DepositNftTx),
    Transfer(TransferTx),
    Withdraw(WithdrawTx),
    CreateCollection(CreateCollectionTx),
    MintNft(MintNftTx),
    TransferNft(TransferNftTx),
    AtomicMatch(AtomicMatchTx),
    CancelOffer(CancelOfferTx),
    WithdrawNft(WithdrawNftTx),
    FullExit(FullExitTx),
    FullExitNft(FullExitNftTx),
}

impl TxInfo {
    pub fn tx_type(&self) -> TxType {
        match self {
            TxInfo::RegisterZns(_) => TxType::RegisterZns,
            TxInfo::Deposit(_) => TxType::Deposit,
            TxInfo::DepositNft(_) => TxType::DepositNft,
            TxInfo::Transfer(_) => TxType::Transfer,
            TxInfo::Withdraw(_) => TxType::Withdraw,
            TxInfo::CreateCollection(_) => TxType::CreateCollection,
            TxInfo::MintNft(_) => TxType::MintNft,
            TxInfo::TransferNft(_) => TxType::TransferNft,
            TxInfo::AtomicMatch(_) => TxType::AtomicMatch,
            TxInfo::CancelOffer(_) => TxType::CancelOffer,
            TxInfo::WithdrawNft(_) => TxType::WithdrawNft,
            TxInfo::FullExit(_) => TxType::FullExit,
            TxInfo::FullExitNft(_) => TxType::FullExitNft,
        }
    }

    /// The initiating L2 account, when the tx is L2-originated.
    pub fn from_account_index(&self) -> Option<AccountIndex> {
        match self {
            TxInfo::Transfer(t) => Some(t.from_account_index),
            TxInfo::Withdraw(t) => Some(t.from_account_index),
            TxInfo::CreateCollection(t) => Some(t.account_index),
            TxInfo::MintNft(t) => Some(t.creator_account_index),
            TxInfo::TransferNft(t) => Some(t.from_account_index),
            TxInfo::AtomicMatch(t) => Some(t.account_index),
            TxInfo::CancelOffer(t) => Some(t.account_index),
            TxInfo::WithdrawNft(t) => Some(t.account_index),
            _ => None,
        }
    }

    pub fn nonce(&self) -> Option<Nonce> {
        match self {
            TxInfo::Transfer(t) => Some(t.nonce),
            TxInfo::Withdraw(t) => Some(t.nonce),
            TxInfo::CreateCollection(t) => Some(t.nonce),
            TxInfo::MintNft(t) => Some(t.nonce),
            TxInfo::TransferNft(t) => Some(t.nonce),
            TxInfo::AtomicMatch(t) => Some(t.nonce),
            TxInfo::CancelOffer(t) => Some(t.nonce),
            TxInfo::WithdrawNft(t) => Some(t.nonce),
            _ => None,
        }
    }

    pub fn expired_at(&self) -> Option<i64> {
        match self {
            TxInfo::Transfer(t) => Some(t.expired_at),
            TxInfo::Withdraw(t) => Some(t.expired_at),
            TxInfo::CreateCollection(t) => Some(t.expired_at),
            TxInfo::MintNft(t) => Some(t.expired_at),
            TxInfo::TransferNft(t) => Some(t.expired_at),
            TxInfo::AtomicMatch(t) => Some(t.expired_at),
            TxInfo::CancelOffer(t) => Some(t.expired_at),
            TxInfo::WithdrawNft(t) => Some(t.expired_at),
            _ => None,
        }
    }

    /// (gas account, fee asset, fee amount) for L2 transactions.
    pub fn gas(&self) -> Option<(AccountIndex, AssetId, u128)> {
        match self {
            TxInfo::Transfer(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            TxInfo::Withdraw(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            TxInfo::CreateCollection(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            TxInfo::MintNft(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            TxInfo::TransferNft(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            TxInfo::AtomicMatch(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            TxInfo::CancelOffer(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            TxInfo::WithdrawNft(t) => {
                Some((t.gas_account_index, t.gas_fee_asset_id, t.gas_fee_asset_amount))
            }
            _ => None,
        }
    }

    pub fn sig(&self) -> Option<&TxSignature> {
        match self {
            TxInfo::Transfer(t) => Some(&t.sig),
            TxInfo::Withdraw(t) => Some(&t.sig),
            TxInfo::CreateCollection(t) => Some(&t.sig),
            TxInfo::MintNft(t) => Some(&t.sig),
            TxInfo::TransferNft(t) => Some(&t.sig),
            TxInfo::AtomicMatch(t) => Some(&t.sig),
            TxInfo::CancelOffer(t) => Some(&t.sig),
            TxInfo::WithdrawNft(t) => Some(&t.sig),
            _ => None,
        }
    }

    /// Stateless field validation. Stateful checks (nonce, balances,
    /// ownership) belong to the executors.
    pub fn validate(&self) -> Result<(), TxError> {
        fn check_index(i: AccountIndex) -> Result<(), TxError> {
            if i as u64 > LAST_ACCOUNT_INDEX {
                return Err(TxError::InvalidTxInfo);
            }
            Ok(())
        }
        fn check_rate(r: TreasuryRate) -> Result<(), TxError> {
            if r as u64 > FEE_RATE_BASE {
                return Err(TxError::InvalidTreasuryRate);
            }
            Ok(())
        }
        fn check_nft_index(i: NftIndex) -> Result<(), TxError> {
            if i > LAST_NFT_INDEX {
                return Err(TxError::InvalidTxInfo);
            }
            Ok(())
        }
        match self {
            TxInfo::RegisterZns(t) => {
                if t.l1_address.is_zero() {
                    return Err(TxError::InvalidL1Address);
                }
                Ok(())
            }
            TxInfo::Deposit(t) => {
                check_index(t.account_index)?;
                if t.l1_address.is_zero() {
                    return Err(TxError::InvalidL1Address);
                }
                Ok(())
            }
            TxInfo::DepositNft(t) => {
                check_index(t.account_index)?;
                check_nft_index(t.nft_index)?;
                check_rate(t.creator_treasury_rate)
            }
            TxInfo::Transfer(t) => {
                check_index(t.from_account_index)?;
                check_index(t.to_account_index)?;
                if t.asset_amount == 0 {
                    return Err(TxError::InvalidAssetAmount);
                }
                Ok(())
            }
            TxInfo::Withdraw(t) => {
                check_index(t.from_account_index)?;
                if t.to_address.is_zero() {
                    return Err(TxError::InvalidL1Address);
                }
                if t.asset_amount == 0 {
                    return Err(TxError::InvalidAssetAmount);
                }
                Ok(())
            }
            TxInfo::CreateCollection(t) => check_index(t.account_index),
            TxInfo::MintNft(t) => {
                check_index(t.creator_account_index)?;
                check_index(t.to_account_index)?;
                check_rate(t.creator_treasury_rate)
            }
            TxInfo::TransferNft(t) => {
                check_index(t.from_account_index)?;
                check_index(t.to_account_index)?;
                check_nft_index(t.nft_index)
            }
            TxInfo::AtomicMatch(t) => {
                check_index(t.account_index)?;
                if t.buy_offer.offer_type != OfferType::Buy {
                    return Err(TxError::InvalidOffer("buy offer has wrong type".into()));
                }
                if t.sell_offer.offer_type != OfferType::Sell {
                    return Err(TxError::InvalidOffer("sell offer has wrong type".into()));
                }
                check_rate(t.sell_offer.treasury_rate)?;
                if t.buy_offer.asset_amount == 0 {
                    return Err(TxError::InvalidAssetAmount);
                }
                Ok(())
            }
            TxInfo::CancelOffer(t) => check_index(t.account_index),
            TxInfo::WithdrawNft(t) => {
                check_index(t.account_index)?;
                check_nft_index(t.nft_index)?;
                if t.to_address.is_zero() {
                    return Err(TxError::InvalidL1Address);
                }
                Ok(())
            }
            TxInfo::FullExit(t) => {
                if t.l1_address.is_zero() {
                    return Err(TxError::InvalidL1Address);
                }
                Ok(())
            }
            TxInfo::FullExitNft(t) => {
                check_nft_index(t.nft_index)?;
                if t.l1_address.is_zero() {
                    return Err(TxError::InvalidL1Address);
                }
                Ok(())
            }
        }
    }

    /// Canonical tx hash: keccak over the type byte and the canonical JSON
    /// encoding. Deterministic because struct fields serialize in declaration
    /// order.
    pub fn hash(&self) -> [u8; 32] {
        let mut h = Keccak256::new();
        h.update([self.tx_type() as u8]);
        h.update(serde_json::to_vec(self).expect("tx info serializes"));
        let out = h.finalize();
        let mut a = [0u8; 32];
        a.copy_from_slice(&out);
        a
    }

    pub fn parse(json: &str) -> Result<Self, TxError> {
        serde_json::from_str(json).map_err(|_| TxError::InvalidTxInfo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer() -> TxInfo {
        TxInfo::Transfer(TransferTx {
            from_account_index: 2,
            to_account_index: 3,
            to_l1_address: L1Address([3u8; 20]),
            asset_id: 0,
            asset_amount: 400_000,
            gas_account_index: 1,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: 1000,
            nonce: 0,
            expired_at: i64::MAX,
            sig: TxSignature::default(),
        })
    }

    #[test]
    fn json_round_trip() {
        let tx = transfer();
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(TxInfo::parse(&json).unwrap(), tx);
    }

    #[test]
    fn hash_is_deterministic_and_type_bound() {
        let tx = transfer();
        assert_eq!(tx.hash(), tx.hash());
        let mut other = tx.clone();
        if let TxInfo::Transfer(t) = &mut other {
            t.asset_amount += 1;
        }
        assert_ne!(tx.hash(), other.hash());
    }

    #[test]
    fn validate_rejects_zero_amount_transfer() {
        let mut tx = transfer();
        if let TxInfo::Transfer(t) = &mut tx {
            t.asset_amount = 0;
        }
        assert_eq!(tx.validate(), Err(TxError::InvalidAssetAmount));
    }

    #[test]
    fn gas_accessor_covers_all_l2_types() {
        let tx = transfer();
        assert!(tx.tx_type().is_l2());
        assert_eq!(tx.gas(), Some((1, 0, 1000)));
        let dep = TxInfo::Deposit(DepositTx {
            account_index: 2,
            l1_address: L1Address([1u8; 20]),
            asset_id: 0,
            asset_amount: 5,
        });
        assert_eq!(dep.gas(), None);
        assert_eq!(dep.nonce(), None);
    }
}
