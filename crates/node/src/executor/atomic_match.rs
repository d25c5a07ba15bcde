use crate::executor::{copied, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};
use crate::sig::verify_offer_signature;
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::account::{offer_slot, set_offer_bit};
use keel_ledger::error::TxError;
use keel_ledger::pubdata::encode_tx_pubdata;
use keel_ledger::tx::{AtomicMatchTx, TxInfo};
use keel_ledger::tx_detail::{NftSnapshot, TxDetail};
use keel_ledger::types::FEE_RATE_BASE;

/// Consumes a matched buy/sell offer pair: the NFT moves to the buyer, the
/// sale amount moves to the seller minus the creator royalty and the
/// protocol fee, and both offer bits are set.
pub struct AtomicMatchExecutor {
    base: BaseExecutor,
    tx_info: AtomicMatchTx,
}

impl AtomicMatchExecutor {
    pub fn new(pool_tx: PoolTx, tx_info: AtomicMatchTx) -> Self {
        AtomicMatchExecutor {
            base: BaseExecutor::new(pool_tx),
            tx_info,
        }
    }

    fn seller_proceeds(&self) -> u128 {
        self.tx_info.buy_offer.asset_amount
            - self.tx_info.creator_amount
            - self.tx_info.treasury_amount
    }
}

impl TxExecutor for AtomicMatchExecutor {
    fn prepare(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        // Royalty and protocol fee are carved out of the sale amount here so
        // every later step sees consistent figures.
        let amount = self.tx_info.buy_offer.asset_amount;
        let nft = state.get_nft(self.tx_info.sell_offer.nft_index)?;
        self.tx_info.creator_amount =
            amount * nft.creator_treasury_rate as u128 / FEE_RATE_BASE as u128;
        self.tx_info.treasury_amount =
            amount * self.tx_info.sell_offer.treasury_rate as u128 / FEE_RATE_BASE as u128;

        let t = &self.tx_info;
        let (buy_bit_asset, _) = offer_slot(t.buy_offer.offer_id);
        let (sell_bit_asset, _) = offer_slot(t.sell_offer.offer_id);
        self.base.mark_nft_dirty(t.sell_offer.nft_index);
        self.base
            .mark_account_assets_dirty(t.account_index, &[t.gas_fee_asset_id]);
        self.base
            .mark_account_assets_dirty(t.buy_offer.account_index, &[t.buy_offer.asset_id, buy_bit_asset]);
        self.base.mark_account_assets_dirty(
            t.sell_offer.account_index,
            &[t.sell_offer.asset_id, sell_bit_asset],
        );
        self.base
            .mark_account_assets_dirty(nft.creator_account_index, &[t.sell_offer.asset_id]);
        self.base
            .mark_account_assets_dirty(t.gas_account_index, &[t.gas_fee_asset_id, t.sell_offer.asset_id]);
        self.base.prepare(state)
    }

    fn verify_inputs(&mut self, state: &StateDb, opts: VerifyOpts) -> Result<(), TxError> {
        self.base.verify_inputs(state, opts)?;
        let t = &self.tx_info;
        let buy = &t.buy_offer;
        let sell = &t.sell_offer;

        if buy.nft_index != sell.nft_index {
            return Err(TxError::OfferMismatch("nft index differs".into()));
        }
        if buy.asset_id != sell.asset_id {
            return Err(TxError::OfferMismatch("asset differs".into()));
        }
        if buy.asset_amount != sell.asset_amount {
            return Err(TxError::OfferMismatch("price differs".into()));
        }
        let now = state.block_timestamp_ms;
        for offer in [buy, sell] {
            if !offer.is_alive_at(now) {
                return Err(TxError::OfferNotAlive {
                    listed_at: offer.listed_at,
                    expired_at: offer.expired_at,
                    now,
                });
            }
        }

        let nft = state.get_nft(sell.nft_index)?;
        if nft.owner_account_index != sell.account_index {
            return Err(TxError::NotNftOwner);
        }

        let buyer = state.get_account(buy.account_index)?;
        let seller = state.get_account(sell.account_index)?;
        if !opts.skip_sig_check {
            verify_offer_signature(buy, &buyer.l1_address)?;
            verify_offer_signature(sell, &seller.l1_address)?;
        }
        if buyer.is_offer_consumed(buy.offer_id) || seller.is_offer_consumed(sell.offer_id) {
            return Err(TxError::OfferAlreadyConsumed);
        }

        // Buyer funds; when the buyer also submits and pays the fee in the
        // sale asset, both must fit.
        let mut need = buy.asset_amount;
        if buy.account_index == t.account_index && buy.asset_id == t.gas_fee_asset_id {
            need += t.gas_fee_asset_amount;
        }
        let have = buyer.balance_of(buy.asset_id);
        if have < need {
            return Err(TxError::BalanceNotEnough {
                asset_id: buy.asset_id,
                have,
                need,
            });
        }

        let submitter = state.get_account(t.account_index)?;
        let have_fee = submitter.balance_of(t.gas_fee_asset_id);
        if have_fee < t.gas_fee_asset_amount {
            return Err(TxError::BalanceNotEnough {
                asset_id: t.gas_fee_asset_id,
                have: have_fee,
                need: t.gas_fee_asset_amount,
            });
        }
        Ok(())
    }

    fn apply_transaction(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let t = self.tx_info.clone();

        // Pending-first reads chain the updates even when the submitter is
        // also the seller or buyer.
        let mut submitter = state.get_account(t.account_index)?;
        submitter.debit(t.gas_fee_asset_id, t.gas_fee_asset_amount)?;
        submitter.nonce += 1;
        state.set_pending_account(t.account_index, submitter);

        let mut buyer = state.get_account(t.buy_offer.account_index)?;
        buyer.debit(t.buy_offer.asset_id, t.buy_offer.asset_amount)?;
        buyer.consume_offer(t.buy_offer.offer_id)?;
        state.set_pending_account(t.buy_offer.account_index, buyer);

        let mut seller = state.get_account(t.sell_offer.account_index)?;
        seller.credit(t.sell_offer.asset_id, self.seller_proceeds());
        seller.consume_offer(t.sell_offer.offer_id)?;
        state.set_pending_account(t.sell_offer.account_index, seller);

        let mut nft = state.get_nft(t.sell_offer.nft_index)?;
        let mut creator = state.get_account(nft.creator_account_index)?;
        creator.credit(t.sell_offer.asset_id, t.creator_amount);
        state.set_pending_account(nft.creator_account_index, creator);

        nft.owner_account_index = t.buy_offer.account_index;
        state.set_pending_nft(t.sell_offer.nft_index, nft);

        state.set_pending_gas(t.gas_fee_asset_id, t.gas_fee_asset_amount);
        state.set_pending_gas(t.sell_offer.asset_id, t.treasury_amount);
        self.base.sync_dirty_to_state_cache(state);
        Ok(())
    }

    fn generate_pub_data(&mut self, state: &mut StateDb) -> Result<(), TxError> {
        let record = encode_tx_pubdata(&TxInfo::AtomicMatch(self.tx_info.clone()))?;
        self.base.append_pubdata(state, record);
        Ok(())
    }

    fn get_executed_tx(&mut self, state: &StateDb, from_api: bool) -> Result<ExecutedTx, TxError> {
        let mut tx = self.base.build_executed_tx(state, from_api);
        tx.tx_info = TxInfo::AtomicMatch(self.tx_info.clone());
        tx.nft_index = Some(self.tx_info.sell_offer.nft_index);
        tx.asset_id = Some(self.tx_info.sell_offer.asset_id as u64);
        tx.tx_amount = Some(self.tx_info.buy_offer.asset_amount);
        Ok(tx)
    }

    fn generate_tx_details(&mut self, state: &StateDb) -> Result<Vec<TxDetail>, TxError> {
        let t = &self.tx_info;
        let nft = state.get_nft(t.sell_offer.nft_index)?;
        let mut copies = state.deep_copy_accounts(&[
            t.account_index,
            t.buy_offer.account_index,
            t.sell_offer.account_index,
            nft.creator_account_index,
            t.gas_account_index,
        ])?;

        let mut builder = DetailBuilder::new(state, self.base.pool_tx.pool_tx_id);

        // Submitter's fee.
        builder.fungible(
            copied(&mut copies, t.account_index)?,
            t.gas_fee_asset_id,
            -(t.gas_fee_asset_amount as i128),
            None,
            false,
        )?;

        // Buyer pays and spends their offer bit.
        let (buy_bit_asset, buy_bit) = offer_slot(t.buy_offer.offer_id);
        {
            let buyer = copied(&mut copies, t.buy_offer.account_index)?;
            let bitmap = set_offer_bit(
                buyer.asset(buy_bit_asset).offer_canceled_or_finalized,
                buy_bit,
            );
            if buy_bit_asset == t.buy_offer.asset_id {
                builder.fungible(
                    buyer,
                    t.buy_offer.asset_id,
                    -(t.buy_offer.asset_amount as i128),
                    Some(bitmap),
                    false,
                )?;
            } else {
                builder.fungible(
                    buyer,
                    t.buy_offer.asset_id,
                    -(t.buy_offer.asset_amount as i128),
                    None,
                    false,
                )?;
                builder.fungible(buyer, buy_bit_asset, 0, Some(bitmap), false)?;
            }
        }

        // Seller collects net proceeds and spends their offer bit.
        let (sell_bit_asset, sell_bit) = offer_slot(t.sell_offer.offer_id);
        {
            let seller = copied(&mut copies, t.sell_offer.account_index)?;
            let bitmap = set_offer_bit(
                seller.asset(sell_bit_asset).offer_canceled_or_finalized,
                sell_bit,
            );
            if sell_bit_asset == t.sell_offer.asset_id {
                builder.fungible(
                    seller,
                    t.sell_offer.asset_id,
                    self.seller_proceeds() as i128,
                    Some(bitmap),
                    false,
                )?;
            } else {
                builder.fungible(
                    seller,
                    t.sell_offer.asset_id,
                    self.seller_proceeds() as i128,
                    None,
                    false,
                )?;
                builder.fungible(seller, sell_bit_asset, 0, Some(bitmap), false)?;
            }
        }

        // Creator royalty.
        builder.fungible(
            copied(&mut copies, nft.creator_account_index)?,
            t.sell_offer.asset_id,
            t.creator_amount as i128,
            None,
            false,
        )?;

        // Ownership change.
        let old = NftSnapshot::from(&nft);
        let mut new = old.clone();
        new.owner_account_index = t.buy_offer.account_index;
        let buyer_copy = copied(&mut copies, t.buy_offer.account_index)?.clone();
        builder.nft(&buyer_copy, old, new);

        // Gas credits last: protocol fee, then the submitter fee.
        let gas = copied(&mut copies, t.gas_account_index)?;
        if t.treasury_amount > 0 {
            builder.fungible(
                gas,
                t.sell_offer.asset_id,
                t.treasury_amount as i128,
                None,
                true,
            )?;
        }
        builder.fungible(
            gas,
            t.gas_fee_asset_id,
            t.gas_fee_asset_amount as i128,
            None,
            true,
        )?;
        Ok(builder.build())
    }

    fn finalize(&mut self, _state: &mut StateDb) -> Result<(), TxError> {
        Ok(())
    }
}
