use crate::types::{AccountIndex, CollectionId, NftIndex, TreasuryRate};
use serde::{Deserialize, Serialize};

/// L2 NFT record. An all-zero record is the empty-leaf sentinel used for
/// proofs against absent leaves.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nft {
    pub nft_index: NftIndex,
    pub creator_account_index: AccountIndex,
    pub owner_account_index: AccountIndex,
    pub nft_content_hash: [u8; 32],
    /// Creator royalty in basis points, at most `FEE_RATE_BASE`.
    pub creator_treasury_rate: TreasuryRate,
    pub collection_id: CollectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipns_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipns_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
}

impl Nft {
    pub fn empty(nft_index: NftIndex) -> Self {
        Nft {
            nft_index,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.creator_account_index == 0
            && self.owner_account_index == 0
            && self.nft_content_hash == [0u8; 32]
            && self.creator_treasury_rate == 0
            && self.collection_id == 0
    }
}

/// Collections are addressed by `(account_index, collection_id)`; a valid id
/// is strictly below the creator's collection nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub account_index: AccountIndex,
    pub collection_id: CollectionId,
    pub name: String,
    #[serde(default)]
    pub metadata: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sentinel() {
        let n = Nft::empty(9);
        assert!(n.is_empty());
        let mut owned = n.clone();
        owned.owner_account_index = 3;
        assert!(!owned.is_empty());
    }
}
