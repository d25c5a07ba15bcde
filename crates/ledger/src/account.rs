use crate::address::{L1Address, PublicKey};
use crate::error::TxError;
use crate::types::{
    AccountIndex, AccountStatus, AssetId, BlockHeight, Nonce, OfferId, OFFERS_PER_ASSET,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balance and offer bitmap for one asset slot of one account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAsset {
    pub asset_id: AssetId,
    pub balance: u128,
    /// 128-bit bitmap of consumed offers addressed at `offer_id % 128`.
    pub offer_canceled_or_finalized: u128,
}

impl AccountAsset {
    pub fn new(asset_id: AssetId) -> Self {
        AccountAsset {
            asset_id,
            balance: 0,
            offer_canceled_or_finalized: 0,
        }
    }

    pub fn with_balance(asset_id: AssetId, balance: u128) -> Self {
        AccountAsset {
            asset_id,
            balance,
            offer_canceled_or_finalized: 0,
        }
    }
}

/// Which asset slot and bit an offer id addresses.
pub fn offer_slot(offer_id: OfferId) -> (AssetId, u32) {
    ((offer_id / OFFERS_PER_ASSET) as AssetId, (offer_id % OFFERS_PER_ASSET) as u32)
}

pub fn offer_bit_set(bitmap: u128, bit: u32) -> bool {
    bitmap & (1u128 << bit) != 0
}

pub fn set_offer_bit(bitmap: u128, bit: u32) -> u128 {
    bitmap | (1u128 << bit)
}

/// In-memory account record. `asset_info` is a BTreeMap so iteration is
/// ordered by asset id before any hashing step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_index: AccountIndex,
    pub l1_address: L1Address,
    pub public_key: PublicKey,
    pub nonce: Nonce,
    pub collection_nonce: u64,
    pub asset_info: BTreeMap<AssetId, AccountAsset>,
    /// Root of this account's asset tree after the last sealed block.
    pub asset_root: [u8; 32],
    pub status: AccountStatus,
    /// Last block that mutated this account.
    pub l2_block_height: BlockHeight,
}

impl Account {
    pub fn new(account_index: AccountIndex, l1_address: L1Address, asset_root: [u8; 32]) -> Self {
        Account {
            account_index,
            l1_address,
            public_key: PublicKey::empty(),
            nonce: 0,
            collection_nonce: 0,
            asset_info: BTreeMap::new(),
            asset_root,
            status: AccountStatus::Pending,
            l2_block_height: 0,
        }
    }

    pub fn asset(&self, asset_id: AssetId) -> AccountAsset {
        self.asset_info
            .get(&asset_id)
            .cloned()
            .unwrap_or_else(|| AccountAsset::new(asset_id))
    }

    pub fn balance_of(&self, asset_id: AssetId) -> u128 {
        self.asset_info.get(&asset_id).map(|a| a.balance).unwrap_or(0)
    }

    fn asset_mut(&mut self, asset_id: AssetId) -> &mut AccountAsset {
        self.asset_info
            .entry(asset_id)
            .or_insert_with(|| AccountAsset::new(asset_id))
    }

    pub fn credit(&mut self, asset_id: AssetId, amount: u128) {
        let a = self.asset_mut(asset_id);
        a.balance = a.balance.saturating_add(amount);
    }

    /// Debit exactly; fails without mutating when the balance is short.
    pub fn debit(&mut self, asset_id: AssetId, amount: u128) -> Result<(), TxError> {
        let have = self.balance_of(asset_id);
        if have < amount {
            return Err(TxError::BalanceNotEnough {
                asset_id,
                have,
                need: amount,
            });
        }
        self.asset_mut(asset_id).balance = have - amount;
        Ok(())
    }

    pub fn is_offer_consumed(&self, offer_id: OfferId) -> bool {
        let (asset_id, bit) = offer_slot(offer_id);
        offer_bit_set(self.asset(asset_id).offer_canceled_or_finalized, bit)
    }

    /// Flip the offer bit; fails when already set.
    pub fn consume_offer(&mut self, offer_id: OfferId) -> Result<AssetId, TxError> {
        let (asset_id, bit) = offer_slot(offer_id);
        let slot = self.asset_mut(asset_id);
        if offer_bit_set(slot.offer_canceled_or_finalized, bit) {
            return Err(TxError::OfferAlreadyConsumed);
        }
        slot.offer_canceled_or_finalized = set_offer_bit(slot.offer_canceled_or_finalized, bit);
        Ok(asset_id)
    }

    pub fn can_originate_l2_tx(&self) -> bool {
        !self.public_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct() -> Account {
        Account::new(2, L1Address([1u8; 20]), [0u8; 32])
    }

    #[test]
    fn debit_fails_without_mutation() {
        let mut a = acct();
        a.credit(0, 100);
        assert!(a.debit(0, 101).is_err());
        assert_eq!(a.balance_of(0), 100);
        a.debit(0, 40).unwrap();
        assert_eq!(a.balance_of(0), 60);
    }

    #[test]
    fn offer_addressing() {
        assert_eq!(offer_slot(0), (0, 0));
        assert_eq!(offer_slot(127), (0, 127));
        assert_eq!(offer_slot(128), (1, 0));
        assert_eq!(offer_slot(300), (2, 44));
    }

    #[test]
    fn consume_offer_is_single_shot() {
        let mut a = acct();
        a.consume_offer(130).unwrap();
        assert!(a.is_offer_consumed(130));
        assert_eq!(a.consume_offer(130), Err(TxError::OfferAlreadyConsumed));
        // Neighbouring bit untouched.
        assert!(!a.is_offer_consumed(131));
    }

    #[test]
    fn asset_info_iterates_in_asset_id_order() {
        let mut a = acct();
        a.credit(7, 1);
        a.credit(0, 1);
        a.credit(3, 1);
        let ids: Vec<_> = a.asset_info.keys().copied().collect();
        assert_eq!(ids, vec![0, 3, 7]);
    }
}
