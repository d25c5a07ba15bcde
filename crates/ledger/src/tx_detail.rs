//! Per-(account, asset) delta rows emitted by every executor. The witness
//! helper replays these rows, so their ordering contract is strict: `order`
//! increments by one per row, `account_order` increments only when the
//! account changes, and the gas credit is always the last row.

use crate::account::AccountAsset;
use crate::address::L1Address;
use crate::error::CodecError;
use crate::nft::Nft;
use crate::types::{AccountIndex, AssetId, BlockHeight, Nonce};
use serde::{Deserialize, Serialize};

pub const NIL_ACCOUNT_ORDER: i64 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AssetType {
    Fungible = 1,
    Nft = 2,
    CollectionNonce = 3,
}

/// NFT fields that participate in hashing and witness replay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftSnapshot {
    pub nft_index: u64,
    pub creator_account_index: AccountIndex,
    pub owner_account_index: AccountIndex,
    pub nft_content_hash: [u8; 32],
    pub creator_treasury_rate: u16,
    pub collection_id: u16,
}

impl NftSnapshot {
    pub fn empty(nft_index: u64) -> Self {
        NftSnapshot {
            nft_index,
            ..Default::default()
        }
    }
}

impl From<&Nft> for NftSnapshot {
    fn from(n: &Nft) -> Self {
        NftSnapshot {
            nft_index: n.nft_index,
            creator_account_index: n.creator_account_index,
            owner_account_index: n.owner_account_index,
            nft_content_hash: n.nft_content_hash,
            creator_treasury_rate: n.creator_treasury_rate,
            collection_id: n.collection_id,
        }
    }
}

/// Pre-state of the touched slot, serialized into the persisted row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BalanceSnapshot {
    Fungible(AccountAsset),
    Nft(NftSnapshot),
    CollectionNonce { nonce: u64 },
}

/// The row's delta. Fungible deltas are signed; an offer bitmap, when
/// present, replaces the old one. NFT and collection-nonce deltas are full
/// replacements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum BalanceDelta {
    Fungible {
        asset_id: AssetId,
        balance_delta: i128,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offer_canceled_or_finalized: Option<u128>,
    },
    Nft(NftSnapshot),
    CollectionNonce { nonce: u64 },
}

impl BalanceDelta {
    pub fn fungible(asset_id: AssetId, balance_delta: i128) -> Self {
        BalanceDelta::Fungible {
            asset_id,
            balance_delta,
            offer_canceled_or_finalized: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDetail {
    /// Asset id for fungible rows; the NFT index for NFT rows.
    pub asset_id: u64,
    pub asset_type: AssetType,
    pub account_index: AccountIndex,
    pub l1_address: L1Address,
    pub balance: BalanceSnapshot,
    pub balance_delta: BalanceDelta,
    pub order: i64,
    pub account_order: i64,
    pub nonce: Nonce,
    pub collection_nonce: u64,
    #[serde(default)]
    pub is_gas: bool,
    #[serde(default)]
    pub block_height: BlockHeight,
    #[serde(default)]
    pub pool_tx_id: u64,
}

/// Apply a delta to a pre-state snapshot. The witness helper uses this to
/// roll each touched slot forward while capturing proofs.
pub fn compute_new_balance(
    balance: &BalanceSnapshot,
    delta: &BalanceDelta,
) -> Result<BalanceSnapshot, CodecError> {
    match (balance, delta) {
        (
            BalanceSnapshot::Fungible(asset),
            BalanceDelta::Fungible {
                asset_id,
                balance_delta,
                offer_canceled_or_finalized,
            },
        ) => {
            let new_balance = (asset.balance as i128)
                .checked_add(*balance_delta)
                .filter(|b| *b >= 0)
                .ok_or_else(|| CodecError::Json("fungible balance underflow".into()))?;
            Ok(BalanceSnapshot::Fungible(AccountAsset {
                asset_id: *asset_id,
                balance: new_balance as u128,
                offer_canceled_or_finalized: offer_canceled_or_finalized
                    .unwrap_or(asset.offer_canceled_or_finalized),
            }))
        }
        (BalanceSnapshot::Nft(_), BalanceDelta::Nft(new)) => Ok(BalanceSnapshot::Nft(new.clone())),
        (BalanceSnapshot::CollectionNonce { .. }, BalanceDelta::CollectionNonce { nonce }) => {
            Ok(BalanceSnapshot::CollectionNonce { nonce: *nonce })
        }
        _ => Err(CodecError::Json("asset type mismatch in tx detail".into())),
    }
}

/// Conservation check over one tx's rows: per fungible asset, credits and
/// debits cancel out. On-chain ops break even against their pubdata instead,
/// so callers exclude those tx types.
pub fn fungible_delta_sum(details: &[TxDetail]) -> std::collections::BTreeMap<AssetId, i128> {
    let mut sums = std::collections::BTreeMap::new();
    for d in details {
        if let BalanceDelta::Fungible {
            asset_id,
            balance_delta,
            ..
        } = &d.balance_delta
        {
            *sums.entry(*asset_id).or_insert(0i128) += *balance_delta;
        }
    }
    sums
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fungible_delta_applies() {
        let before = BalanceSnapshot::Fungible(AccountAsset::with_balance(0, 100));
        let after =
            compute_new_balance(&before, &BalanceDelta::fungible(0, -40)).unwrap();
        assert_eq!(
            after,
            BalanceSnapshot::Fungible(AccountAsset::with_balance(0, 60))
        );
    }

    #[test]
    fn fungible_underflow_rejected() {
        let before = BalanceSnapshot::Fungible(AccountAsset::with_balance(0, 10));
        assert!(compute_new_balance(&before, &BalanceDelta::fungible(0, -11)).is_err());
    }

    #[test]
    fn offer_bitmap_replacement() {
        let before = BalanceSnapshot::Fungible(AccountAsset {
            asset_id: 0,
            balance: 5,
            offer_canceled_or_finalized: 0b01,
        });
        let after = compute_new_balance(
            &before,
            &BalanceDelta::Fungible {
                asset_id: 0,
                balance_delta: 0,
                offer_canceled_or_finalized: Some(0b11),
            },
        )
        .unwrap();
        match after {
            BalanceSnapshot::Fungible(a) => assert_eq!(a.offer_canceled_or_finalized, 0b11),
            _ => panic!("wrong snapshot kind"),
        }
    }

    #[test]
    fn type_mismatch_is_a_decode_error() {
        let before = BalanceSnapshot::CollectionNonce { nonce: 1 };
        assert!(compute_new_balance(&before, &BalanceDelta::fungible(0, 1)).is_err());
    }
}
