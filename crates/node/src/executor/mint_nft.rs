use crate::executor::{copied, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::ipfs::{content_hash_from_cid, content_hash_from_metadata};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::error::TxError;
use keel_ledger::nft::Nft;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::records::{MetadataPinStatus, NftMetadataHistory};
use keel_ledger::tx::{MintNftTx, TxInfo};
use keel_ledger::tx_detail::{NftSnapshot, TxDetail};
use uuid::Uuid;

/// Mints a fresh NFT at the next free index. Metadata is pinned to IPFS when
/// a client is injected and reachable; otherwise the mint proceeds with the
/// content hash taken over the raw metadata and the pin deferred.
pub struct MintNftExecutor {
    base: BaseExecutor,
    tx_info: MintNftTx,
    pin_status: MetadataPinStatus,
    metadata_json: String,
}

impl MintNftExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: MintNftTx) -> Self {
        MintNftExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
            pin_status: MetadataPinStatus::Deferred,
            metadata_json: String::new(),
        }
    }

    fn new_nft(&self) -> Nft {
        let t = &self.tx_info;
        Nft {
            nft_index: t.nft_index,
            creator_account_index: t.creator_account_index,
            owner_account_index: t.to_account_index,
            nft_content_hash: t.nft_content_hash,
            creator_treasury_rate: t.creator_treasury_rate,
            collection_id: t.nft_collection_id,
            ipns_name: t.ipns_name.clone(),
            ipns_id: t.ipns_id.clone(),
            metadata: Some(self.metadata_json.clone()),
        }
    }
}

impl TxExecutor for MintNftExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        self.tx_info.nft_index = state.next_nft_index();
        self.metadata_json = serde_json::to_string(&self.tx_info.meta_data)
            .map_err(|_| TxError::InvalidTxInfo)?;

        if !state.dry_run {
            // Best effort pinning: an unreachable daemon defers the pin, it
            // never fails the mint.
            let pinned = state.ipfs().and_then(|ipfs| {
                let ipns_name = format!("{}-{}", Uuid::new_v4(), self.tx_info.nft_index);
                let ipns_id = ipfs.generate_ipns_key(&ipns_name).ok()?;
                let cid = ipfs
                    .upload(self.metadata_json.as_bytes(), self.tx_info.nft_index)
                    .ok()?;
                Some((ipns_name, ipns_id, cid))
            });
            match pinned {
                Some((ipns_name, ipns_id, cid)) => {
                    self.tx_info.nft_content_hash = content_hash_from_cid(&cid);
                    self.tx_info.ipns_name = Some(ipns_name);
                    self.tx_info.ipns_id = Some(ipns_id);
                    self.pin_status = MetadataPinStatus::Pinned;
                }
                None => {
                    log::warn!(
                        "ipfs unreachable, deferring metadata pin for nft {}",
                        self.tx_info.nft_index
                    );
                    self.tx_info.nft_content_hash =
                        content_hash_from_metadata(self.metadata_json.as_bytes());
                    self.pin_status = MetadataPinStatus::Deferred;
                }
            }
        }

        let t = &self.tx_info;
        self.base.mark_nft_dirty(t.nft_index);
        self.base
            .mark_account_assets_dirty(t.creator_account_index, &[t.gas_fee_asset_id]);
        self.base
            .mark_account_assets_dirty(t.gas_account_index, &[t.gas_fee_asset_id]);
        self.base.mark_account_assets_dirty(t.to_account_index, &[]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError> {
        self.tx_info.meta_data.validate()?;
        let t = &self.tx_info;
        // The creator mints to themselves; third-party recipients go through
        // a follow-up transfer.
        if t.creator_account_index != t.to_account_index {
            return Err(TxError::InvalidToAccount);
        }
        self.base.verify_inputs(state, opts)?;

        let creator = state.get_account(t.creator_account_index)?;
        if t.nft_collection_id as u64 >= creator.collection_nonce {
            return Err(TxError::InvalidCollectionId);
        }
        let have = creator.balance_of(t.gas_fee_asset_id);
        if have < t.gas_fee_asset_amount {
            return Err(TxError::BalanceNotEnough {
                asset_id: t.gas_fee_asset_id,
                have,
                need: t.gas_fee_asset_amount,
            });
        }
        let to_account = state.get_account(t.to_account_index)?;
        if to_account.l1_address != t.to_l1_address {
            return Err(TxError::InvalidToAccount);
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = &self.tx_info;
        let mut creator = state.get_account(t.creator_account_index)?;
        creator.debit(t.gas_fee_asset_id, t.gas_fee_asset_amount)?;
        creator.nonce += 1;

        state.set_pending_account(t.creator_account_index, creator);
        state.set_pending_nft(t.nft_index, self.new_nft());
        state.set_pending_gas(t.gas_fee_asset_id, t.gas_fee_asset_amount);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::MintNft(self.tx_info.clone()))?;
        self.base.append_pubdata(state, record);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::MintNft(self.tx_info.clone());
        tx.nft_index = Some(self.tx_info.nft_index);
        tx.collection_id = Some(self.tx_info.nft_collection_id);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let mut copies = state.deep_copy_accounts(&[
            t.creator_account_index,
            t.to_account_index,
            t.gas_account_index,
        ])?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);
        builder.fungible(
            copied(&mut copies, t.creator_account_index)?,
            t.gas_fee_asset_id,
            -(t.gas_fee_asset_amount as i128),
            None,
            false,
        )?;
        builder.fungible(
            copied(&mut copies, t.to_account_index)?,
            t.gas_fee_asset_id,
            0,
            None,
            false,
        )?;
        let to_account = copied(&mut copies, t.to_account_index)?.clone();
        builder.nft(
            &to_account,
            NftSnapshot::empty(t.nft_index),
            NftSnapshot::from(&self.new_nft()),
        );
        builder.fungible(
            copied(&mut copies, t.gas_account_index)?,
            t.gas_fee_asset_id,
            t.gas_fee_asset_amount as i128,
            None,
            true,
        )?;
        Ok(builder.build())
    }

    fn finalize(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        state.advance_nft_index();
        state.pending_metadata_history.push(NftMetadataHistory {
            nft_index: self.tx_info.nft_index,
            metadata: self.metadata_json.clone(),
            ipns_name: self.tx_info.ipns_name.clone(),
            ipns_id: self.tx_info.ipns_id.clone(),
            status: self.pin_status,
            l2_block_height: state.block_height,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipfs::StaticIpfsClient;
    use keel_ledger::account::Account;
    use keel_ledger::address::L1Address;
    use keel_ledger::nft_meta::NftMetadata;
    use keel_ledger::tree::NIL_ASSET_ROOT;
    use keel_ledger::tx::TxSignature;
    use keel_ledger::types::GAS_ACCOUNT_INDEX;
    use std::sync::Arc;

    fn seeded_state() -> StateDb {
        let mut state = StateDb::new();
        state.block_height = 1;
        state.insert_confirmed_account(Account::new(
            GAS_ACCOUNT_INDEX,
            L1Address([1; 20]),
            *NIL_ASSET_ROOT,
        ));
        let mut creator = Account::new(2, L1Address([2; 20]), *NIL_ASSET_ROOT);
        creator.credit(0, 10_000);
        creator.collection_nonce = 1;
        state.insert_confirmed_account(creator);
        state
    }

    fn mint_tx() -> MintNftTx {
        MintNftTx {
            creator_account_index: 2,
            to_account_index: 2,
            to_l1_address: L1Address([2; 20]),
            nft_index: 0,
            nft_content_hash: [0; 32],
            nft_collection_id: 0,
            creator_treasury_rate: 250,
            meta_data: NftMetadata {
                name: "piece".into(),
                image: "ipfs://bafy".into(),
                description: None,
                attributes: None,
            },
            ipns_name: None,
            ipns_id: None,
            gas_account_index: GAS_ACCOUNT_INDEX,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: 1_000,
            nonce: 0,
            expired_at: i64::MAX,
            sig: TxSignature::default(),
        }
    }

    fn pool_tx(info: MintNftTx) -> PoolTx {
        PoolTx {
            pool_tx_id: 1,
            tx_hash: String::new(),
            tx_info: keel_ledger::tx::TxInfo::MintNft(info),
            created_at_ms: 0,
        }
    }

    #[test]
    fn pinned_mint_takes_content_hash_from_cid() {
        let mut state = seeded_state().with_ipfs(Arc::new(StaticIpfsClient {
            cid: "bafyexample".into(),
            ipns_id: "k51example".into(),
        }));
        let tx = mint_tx();
        let mut executor = MintNftExecutor::new(pool_tx(tx.clone()), tx);
        executor.prepare(&mut state).unwrap();
        assert_eq!(
            executor.tx_info.nft_content_hash,
            content_hash_from_cid("bafyexample")
        );
        assert_eq!(executor.tx_info.ipns_id.as_deref(), Some("k51example"));
        assert_eq!(executor.pin_status, MetadataPinStatus::Pinned);

        executor
            .verify_inputs(&state, crate::executor::VerifyOpts::commit())
            .unwrap();
        executor.apply_transaction(&mut state).unwrap();
        executor.finalize(&mut state).unwrap();
        assert_eq!(state.next_nft_index(), 1);
        assert_eq!(state.get_nft(0).unwrap().owner_account_index, 2);
    }

    #[test]
    fn unreachable_ipfs_defers_the_pin() {
        let mut state = seeded_state(); // no client injected
        let tx = mint_tx();
        let mut executor = MintNftExecutor::new(pool_tx(tx.clone()), tx);
        executor.prepare(&mut state).unwrap();
        assert_eq!(executor.pin_status, MetadataPinStatus::Deferred);
        assert_eq!(
            executor.tx_info.nft_content_hash,
            content_hash_from_metadata(executor.metadata_json.as_bytes())
        );
        assert!(executor.tx_info.ipns_id.is_none());

        executor.apply_transaction(&mut state).unwrap();
        executor.finalize(&mut state).unwrap();
        let rows = &state.pending_metadata_history;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, MetadataPinStatus::Deferred);
    }

    #[test]
    fn third_party_recipient_is_rejected() {
        let mut state = seeded_state();
        state.insert_confirmed_account(Account::new(3, L1Address([3; 20]), *NIL_ASSET_ROOT));
        let mut tx = mint_tx();
        tx.to_account_index = 3;
        tx.to_l1_address = L1Address([3; 20]);
        let mut executor = MintNftExecutor::new(pool_tx(tx.clone()), tx);
        executor.prepare(&mut state).unwrap();
        assert_eq!(
            executor.verify_inputs(&state, crate::executor::VerifyOpts::commit()),
            Err(TxError::InvalidToAccount)
        );
    }
}
