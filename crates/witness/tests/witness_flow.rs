//! End-to-end witness construction over a seeded tree triad: a transfer's
//! detail rows produce before-proofs that verify against the pre-state root,
//! and the gas witness accumulates the block's fees.

use keel_ledger::account::{Account, AccountAsset};
use keel_ledger::address::L1Address;
use keel_ledger::merkle::verify_proof;
use keel_ledger::tree::{
    account_leaf_hash, asset_leaf_hash, compute_state_root, new_account_tree, new_asset_tree,
    new_nft_tree, AssetTreeCache,
};
use keel_ledger::tx::{TransferTx, TxInfo, TxSignature};
use keel_ledger::tx_detail::{AssetType, BalanceDelta, BalanceSnapshot, TxDetail};
use keel_ledger::types::{AccountIndex, BlockHeight, TxType, GAS_ACCOUNT_INDEX};
use keel_witness::{AccountProvider, WitnessHelper, WitnessTx};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct MapProvider {
    accounts: HashMap<AccountIndex, Account>,
}

impl AccountProvider for MapProvider {
    fn confirmed_account(&self, index: AccountIndex) -> Result<Account, keel_witness::WitnessError> {
        self.accounts
            .get(&index)
            .cloned()
            .ok_or(keel_witness::WitnessError::AccountNotFound(index))
    }

    fn account_history_at(
        &self,
        index: AccountIndex,
        _height: BlockHeight,
    ) -> Result<Option<Account>, keel_witness::WitnessError> {
        Ok(self.accounts.get(&index).cloned())
    }
}

fn account(index: AccountIndex, balance: u128) -> Account {
    let mut a = Account::new(index, L1Address([index as u8; 20]), [0u8; 32]);
    if balance > 0 {
        a.credit(0, balance);
    }
    a
}

fn detail(
    account_index: AccountIndex,
    asset_id: u64,
    pre: AccountAsset,
    delta: i128,
    order: i64,
    account_order: i64,
    nonce: u64,
    is_gas: bool,
) -> TxDetail {
    TxDetail {
        asset_id,
        asset_type: AssetType::Fungible,
        account_index,
        l1_address: L1Address([account_index as u8; 20]),
        balance: BalanceSnapshot::Fungible(pre),
        balance_delta: BalanceDelta::fungible(asset_id as u16, delta),
        order,
        account_order,
        nonce,
        collection_nonce: 0,
        is_gas,
        block_height: 1,
        pool_tx_id: 1,
    }
}

#[test]
fn transfer_witness_round_trip() {
    let sender = account(2, 401_000);
    let recipient = account(3, 0);
    let gas = account(GAS_ACCOUNT_INDEX, 0);

    // Seed asset trees and the account tree with the pre-state.
    let cache = Arc::new(AssetTreeCache::new(
        16,
        3,
        0,
        Arc::new(|_, _| new_asset_tree()),
    ));
    let account_tree = Arc::new(RwLock::new(new_account_tree()));
    let nft_tree = Arc::new(RwLock::new(new_nft_tree()));

    let mut leaves = HashMap::new();
    for acct in [&gas, &sender, &recipient] {
        let tree = cache.get(acct.account_index);
        for asset in acct.asset_info.values() {
            tree.write()
                .set(asset.asset_id as u64, asset_leaf_hash(asset), 0)
                .unwrap();
        }
        let root = tree.read().root();
        let leaf = account_leaf_hash(acct, &root);
        leaves.insert(acct.account_index, leaf);
        account_tree
            .write()
            .set(acct.account_index as u64, leaf, 0)
            .unwrap();
    }
    let root_before = account_tree.read().root();
    let state_root_before = compute_state_root(&root_before, &nft_tree.read().root());

    let provider = Arc::new(MapProvider {
        accounts: HashMap::from([
            (2, sender.clone()),
            (3, recipient.clone()),
            (GAS_ACCOUNT_INDEX, gas.clone()),
        ]),
    });
    let mut helper = WitnessHelper::new(
        account_tree.clone(),
        nft_tree.clone(),
        cache.clone(),
        provider,
    );

    let tx_info = TxInfo::Transfer(TransferTx {
        from_account_index: 2,
        to_account_index: 3,
        to_l1_address: L1Address([3u8; 20]),
        asset_id: 0,
        asset_amount: 400_000,
        gas_account_index: GAS_ACCOUNT_INDEX,
        gas_fee_asset_id: 0,
        gas_fee_asset_amount: 1_000,
        nonce: 0,
        expired_at: i64::MAX,
        sig: TxSignature::default(),
    });
    let tx = WitnessTx {
        tx_type: TxType::Transfer,
        account_index: Some(2),
        nonce: 0,
        expired_at: i64::MAX,
        signature: Vec::new(),
        tx_info,
        details: vec![
            detail(2, 0, sender.asset(0), -400_000, 0, 0, 0, false),
            detail(
                2,
                0,
                AccountAsset::with_balance(0, 1_000),
                -1_000,
                1,
                0,
                0,
                false,
            ),
            detail(3, 0, recipient.asset(0), 400_000, 2, 1, 0, false),
            detail(GAS_ACCOUNT_INDEX, 0, gas.asset(0), 1_000, 3, 2, 0, true),
        ],
    };

    let witness = helper.construct_tx_witness(&tx, 1).unwrap();

    assert_eq!(witness.state_root_before, state_root_before);
    assert_ne!(witness.state_root_after, witness.state_root_before);

    // Slot 0 is the sender: pre-nonce and pre-balance, proof against the
    // pre-state account root.
    let w0 = &witness.accounts_info_before[0];
    assert_eq!(w0.account_index, 2);
    assert_eq!(w0.nonce, 0);
    assert_eq!(w0.assets[0].balance, 401_000);
    assert!(verify_proof(
        &witness.account_root_before,
        2,
        &leaves[&2],
        witness.merkle_proofs_account_before[0].as_slice(),
    ));

    // Gas rows are excluded from the account slots, so the order is
    // sender, recipient, then padding.
    let w1 = &witness.accounts_info_before[1];
    assert_eq!(w1.account_index, 3);
    let w2 = &witness.accounts_info_before[2];
    assert_eq!(w2.account_index, keel_ledger::LAST_ACCOUNT_INDEX);

    // The sender's asset tree now reflects both debits.
    let sender_tree = cache.get(2);
    let expected_leaf = asset_leaf_hash(&AccountAsset::with_balance(0, 0));
    assert_eq!(sender_tree.read().get(0), expected_leaf);

    // Gas witness over the block: fee lands on the gas account.
    let gas_witness = helper.construct_gas_witness(std::slice::from_ref(&tx), 1).unwrap();
    assert!(gas_witness.needs_gas);
    assert_eq!(gas_witness.account_info_before.assets[0].balance, 0);
    let gas_tree = cache.get(GAS_ACCOUNT_INDEX);
    assert_eq!(
        gas_tree.read().get(0),
        asset_leaf_hash(&AccountAsset::with_balance(0, 1_000))
    );
}

#[test]
fn no_gas_block_uses_empty_sentinel() {
    let cache = Arc::new(AssetTreeCache::new(
        4,
        1,
        0,
        Arc::new(|_, _| new_asset_tree()),
    ));
    let account_tree = Arc::new(RwLock::new(new_account_tree()));
    let nft_tree = Arc::new(RwLock::new(new_nft_tree()));
    let provider = Arc::new(MapProvider {
        accounts: HashMap::new(),
    });
    let mut helper = WitnessHelper::new(account_tree.clone(), nft_tree, cache, provider);

    let root_before = account_tree.read().root();
    let gas_witness = helper.construct_gas_witness(&[], 1).unwrap();
    assert!(!gas_witness.needs_gas);
    assert_eq!(gas_witness.merkle_proofs_account_assets_before.len(), 2);
    // No write happened.
    assert_eq!(account_tree.read().root(), root_before);
}
