//! Bit-exact pubdata layouts. One encoder per tx type, one parser per
//! priority-request type. Integers are big-endian fixed width; 20-byte
//! addresses inside priority records occupy a left-padded 32-byte word; each
//! record is zero-suffixed to the per-tx pubdata size by the caller.

use crate::codec::{
    read_bytes20, read_bytes32, read_padded_address, read_u128, read_u16, read_u32, read_u40,
    read_u8, write_padded_address, write_u128, write_u16, write_u32, write_u40, write_u64,
};
use crate::error::CodecError;
use crate::packed_fee::pack_fee;
use crate::tx::{
    AtomicMatchTx, CancelOfferTx, CreateCollectionTx, DepositNftTx, DepositTx, FullExitNftTx,
    FullExitTx, MintNftTx, RegisterZnsTx, TransferNftTx, TransferTx, TxInfo, WithdrawNftTx,
    WithdrawTx,
};
use crate::types::{
    TxType, DEPOSIT_NFT_PUBDATA_SIZE, DEPOSIT_PUBDATA_SIZE, FULL_EXIT_NFT_PUBDATA_SIZE,
    FULL_EXIT_PUBDATA_SIZE, PUBKEY_BYTES, REGISTER_ZNS_PUBDATA_SIZE,
};
use crate::address::{L1Address, PublicKey};

fn expect_size(pubdata: &[u8], expected: usize) -> Result<(), CodecError> {
    if pubdata.len() != expected {
        return Err(CodecError::InvalidSize {
            expected,
            got: pubdata.len(),
        });
    }
    Ok(())
}

fn expect_tx_type(got: u8, want: TxType) -> Result<(), CodecError> {
    if got != want as u8 {
        return Err(CodecError::UnknownTxType(got));
    }
    Ok(())
}

/// Encode the unpadded pubdata record for any tx type. Fee fields go through
/// the packed encoding, so a non-representable fee is an error here.
pub fn encode_tx_pubdata(tx: &TxInfo) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(128);
    buf.push(tx.tx_type() as u8);
    match tx {
        TxInfo::RegisterZns(t) => {
            write_u32(&mut buf, t.account_index);
            buf.extend_from_slice(t.l1_address.as_bytes());
            buf.extend_from_slice(&t.public_key.to_fixed_bytes());
        }
        TxInfo::Deposit(t) => {
            write_u32(&mut buf, t.account_index);
            write_padded_address(&mut buf, &t.l1_address);
            write_u16(&mut buf, t.asset_id);
            write_u128(&mut buf, t.asset_amount);
        }
        TxInfo::DepositNft(t) => {
            write_u32(&mut buf, t.account_index);
            write_u40(&mut buf, t.nft_index);
            write_u32(&mut buf, t.creator_account_index);
            write_u16(&mut buf, t.creator_treasury_rate);
            buf.extend_from_slice(&t.nft_content_hash);
            write_padded_address(&mut buf, &t.l1_address);
            write_u16(&mut buf, t.collection_id);
        }
        TxInfo::Transfer(t) => {
            write_u32(&mut buf, t.from_account_index);
            write_u32(&mut buf, t.to_account_index);
            write_u16(&mut buf, t.asset_id);
            write_u128(&mut buf, t.asset_amount);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
        }
        TxInfo::Withdraw(t) => {
            write_u32(&mut buf, t.from_account_index);
            buf.extend_from_slice(t.to_address.as_bytes());
            write_u16(&mut buf, t.asset_id);
            write_u128(&mut buf, t.asset_amount);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
        }
        TxInfo::CreateCollection(t) => {
            write_u32(&mut buf, t.account_index);
            write_u16(&mut buf, t.collection_id);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
        }
        TxInfo::MintNft(t) => {
            write_u32(&mut buf, t.creator_account_index);
            write_u32(&mut buf, t.to_account_index);
            write_u40(&mut buf, t.nft_index);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
            write_u16(&mut buf, t.creator_treasury_rate);
            write_u16(&mut buf, t.nft_collection_id);
            buf.extend_from_slice(&t.nft_content_hash);
        }
        TxInfo::TransferNft(t) => {
            write_u32(&mut buf, t.from_account_index);
            write_u32(&mut buf, t.to_account_index);
            write_u40(&mut buf, t.nft_index);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
        }
        TxInfo::AtomicMatch(t) => {
            write_u32(&mut buf, t.account_index);
            write_u32(&mut buf, t.buy_offer.account_index);
            write_u32(&mut buf, t.sell_offer.account_index);
            write_u40(&mut buf, t.sell_offer.nft_index);
            write_u16(&mut buf, t.sell_offer.asset_id);
            write_u128(&mut buf, t.buy_offer.asset_amount);
            write_u128(&mut buf, t.creator_amount);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
        }
        TxInfo::CancelOffer(t) => {
            write_u32(&mut buf, t.account_index);
            write_u64(&mut buf, t.offer_id);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
        }
        TxInfo::WithdrawNft(t) => {
            write_u32(&mut buf, t.account_index);
            write_u32(&mut buf, t.creator_account_index);
            write_u16(&mut buf, t.creator_treasury_rate);
            write_u40(&mut buf, t.nft_index);
            write_u16(&mut buf, t.collection_id);
            write_padded_address(&mut buf, &t.to_address);
            buf.extend_from_slice(&t.nft_content_hash);
            write_u16(&mut buf, t.gas_fee_asset_id);
            buf.extend_from_slice(&pack_fee(t.gas_fee_asset_amount)?.to_bytes());
        }
        TxInfo::FullExit(t) => {
            write_u32(&mut buf, t.account_index);
            write_padded_address(&mut buf, &t.l1_address);
            write_u16(&mut buf, t.asset_id);
            write_u128(&mut buf, t.asset_amount);
        }
        TxInfo::FullExitNft(t) => {
            write_u32(&mut buf, t.account_index);
            write_u32(&mut buf, t.creator_account_index);
            write_u16(&mut buf, t.creator_treasury_rate);
            write_u40(&mut buf, t.nft_index);
            write_u16(&mut buf, t.collection_id);
            write_padded_address(&mut buf, &t.l1_address);
            write_padded_address(&mut buf, &t.creator_l1_address);
            buf.extend_from_slice(&t.nft_content_hash);
        }
    }
    Ok(buf)
}

pub fn parse_register_zns_pubdata(pubdata: &[u8]) -> Result<RegisterZnsTx, CodecError> {
    expect_size(pubdata, REGISTER_ZNS_PUBDATA_SIZE)?;
    let (offset, tx_type) = read_u8(pubdata, 0)?;
    expect_tx_type(tx_type, TxType::RegisterZns)?;
    let (offset, account_index) = read_u32(pubdata, offset)?;
    let (offset, addr) = read_bytes20(pubdata, offset)?;
    let key = pubdata[offset..offset + PUBKEY_BYTES].to_vec();
    Ok(RegisterZnsTx {
        account_index,
        l1_address: L1Address(addr),
        public_key: PublicKey(key),
    })
}

pub fn parse_deposit_pubdata(pubdata: &[u8]) -> Result<DepositTx, CodecError> {
    expect_size(pubdata, DEPOSIT_PUBDATA_SIZE)?;
    let (offset, tx_type) = read_u8(pubdata, 0)?;
    expect_tx_type(tx_type, TxType::Deposit)?;
    let (offset, account_index) = read_u32(pubdata, offset)?;
    let (offset, l1_address) = read_padded_address(pubdata, offset)?;
    let (offset, asset_id) = read_u16(pubdata, offset)?;
    let (_, asset_amount) = read_u128(pubdata, offset)?;
    Ok(DepositTx {
        account_index,
        l1_address,
        asset_id,
        asset_amount,
    })
}

pub fn parse_deposit_nft_pubdata(pubdata: &[u8]) -> Result<DepositNftTx, CodecError> {
    expect_size(pubdata, DEPOSIT_NFT_PUBDATA_SIZE)?;
    let (offset, tx_type) = read_u8(pubdata, 0)?;
    expect_tx_type(tx_type, TxType::DepositNft)?;
    let (offset, account_index) = read_u32(pubdata, offset)?;
    let (offset, nft_index) = read_u40(pubdata, offset)?;
    let (offset, creator_account_index) = read_u32(pubdata, offset)?;
    let (offset, creator_treasury_rate) = read_u16(pubdata, offset)?;
    let (offset, nft_content_hash) = read_bytes32(pubdata, offset)?;
    let (offset, l1_address) = read_padded_address(pubdata, offset)?;
    let (_, collection_id) = read_u16(pubdata, offset)?;
    Ok(DepositNftTx {
        account_index,
        l1_address,
        nft_index,
        creator_account_index,
        creator_treasury_rate,
        nft_content_hash,
        collection_id,
    })
}

pub fn parse_full_exit_pubdata(pubdata: &[u8]) -> Result<FullExitTx, CodecError> {
    expect_size(pubdata, FULL_EXIT_PUBDATA_SIZE)?;
    let (offset, tx_type) = read_u8(pubdata, 0)?;
    expect_tx_type(tx_type, TxType::FullExit)?;
    let (offset, account_index) = read_u32(pubdata, offset)?;
    let (offset, l1_address) = read_padded_address(pubdata, offset)?;
    let (offset, asset_id) = read_u16(pubdata, offset)?;
    let (_, asset_amount) = read_u128(pubdata, offset)?;
    Ok(FullExitTx {
        account_index,
        l1_address,
        asset_id,
        asset_amount,
    })
}

pub fn parse_full_exit_nft_pubdata(pubdata: &[u8]) -> Result<FullExitNftTx, CodecError> {
    expect_size(pubdata, FULL_EXIT_NFT_PUBDATA_SIZE)?;
    let (offset, tx_type) = read_u8(pubdata, 0)?;
    expect_tx_type(tx_type, TxType::FullExitNft)?;
    let (offset, account_index) = read_u32(pubdata, offset)?;
    let (offset, creator_account_index) = read_u32(pubdata, offset)?;
    let (offset, creator_treasury_rate) = read_u16(pubdata, offset)?;
    let (offset, nft_index) = read_u40(pubdata, offset)?;
    let (offset, collection_id) = read_u16(pubdata, offset)?;
    let (offset, l1_address) = read_padded_address(pubdata, offset)?;
    let (offset, creator_l1_address) = read_padded_address(pubdata, offset)?;
    let (_, nft_content_hash) = read_bytes32(pubdata, offset)?;
    Ok(FullExitNftTx {
        account_index,
        l1_address,
        creator_account_index,
        creator_l1_address,
        creator_treasury_rate,
        nft_index,
        collection_id,
        nft_content_hash,
    })
}

/// Parse a priority request's pubdata by its leading type byte.
pub fn parse_priority_pubdata(pubdata: &[u8]) -> Result<TxInfo, CodecError> {
    let (_, tx_type) = read_u8(pubdata, 0)?;
    match TxType::from_u8(tx_type) {
        Some(TxType::RegisterZns) => Ok(TxInfo::RegisterZns(parse_register_zns_pubdata(pubdata)?)),
        Some(TxType::Deposit) => Ok(TxInfo::Deposit(parse_deposit_pubdata(pubdata)?)),
        Some(TxType::DepositNft) => Ok(TxInfo::DepositNft(parse_deposit_nft_pubdata(pubdata)?)),
        Some(TxType::FullExit) => Ok(TxInfo::FullExit(parse_full_exit_pubdata(pubdata)?)),
        Some(TxType::FullExitNft) => Ok(TxInfo::FullExitNft(parse_full_exit_nft_pubdata(pubdata)?)),
        _ => Err(CodecError::UnknownTxType(tx_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PUBDATA_BYTES_PER_TX;
    use proptest::prelude::*;

    #[test]
    fn deposit_round_trip() {
        let tx = DepositTx {
            account_index: 2,
            l1_address: L1Address([0x11; 20]),
            asset_id: 0,
            asset_amount: 1_000_000,
        };
        let bytes = encode_tx_pubdata(&TxInfo::Deposit(tx.clone())).unwrap();
        assert_eq!(bytes.len(), DEPOSIT_PUBDATA_SIZE);
        assert_eq!(parse_deposit_pubdata(&bytes).unwrap(), tx);
    }

    #[test]
    fn register_zns_round_trip() {
        let tx = RegisterZnsTx {
            account_index: 7,
            l1_address: L1Address([0x22; 20]),
            public_key: PublicKey(vec![4u8; PUBKEY_BYTES]),
        };
        let bytes = encode_tx_pubdata(&TxInfo::RegisterZns(tx.clone())).unwrap();
        assert_eq!(bytes.len(), REGISTER_ZNS_PUBDATA_SIZE);
        assert_eq!(parse_register_zns_pubdata(&bytes).unwrap(), tx);
    }

    #[test]
    fn full_exit_nft_round_trip() {
        let tx = FullExitNftTx {
            account_index: 5,
            l1_address: L1Address([0x33; 20]),
            creator_account_index: 2,
            creator_l1_address: L1Address([0x44; 20]),
            creator_treasury_rate: 250,
            nft_index: 1 << 33,
            collection_id: 3,
            nft_content_hash: [0xAA; 32],
        };
        let bytes = encode_tx_pubdata(&TxInfo::FullExitNft(tx.clone())).unwrap();
        assert_eq!(bytes.len(), FULL_EXIT_NFT_PUBDATA_SIZE);
        assert_eq!(parse_full_exit_nft_pubdata(&bytes).unwrap(), tx);
    }

    #[test]
    fn wrong_size_is_a_hard_error() {
        let tx = DepositTx {
            account_index: 2,
            l1_address: L1Address([0x11; 20]),
            asset_id: 0,
            asset_amount: 1,
        };
        let mut bytes = encode_tx_pubdata(&TxInfo::Deposit(tx)).unwrap();
        bytes.push(0);
        assert!(matches!(
            parse_deposit_pubdata(&bytes),
            Err(CodecError::InvalidSize { .. })
        ));
    }

    #[test]
    fn every_record_fits_the_per_tx_size() {
        use crate::tx::*;
        let txs: Vec<TxInfo> = vec![
            TxInfo::Transfer(TransferTx {
                from_account_index: 2,
                to_account_index: 3,
                to_l1_address: L1Address([3; 20]),
                asset_id: 0,
                asset_amount: 10,
                gas_account_index: 1,
                gas_fee_asset_id: 0,
                gas_fee_asset_amount: 1000,
                nonce: 0,
                expired_at: i64::MAX,
                sig: Default::default(),
            }),
            TxInfo::WithdrawNft(WithdrawNftTx {
                account_index: 2,
                creator_account_index: 2,
                creator_l1_address: L1Address([2; 20]),
                creator_treasury_rate: 0,
                nft_index: 1,
                collection_id: 0,
                nft_content_hash: [1; 32],
                to_address: L1Address([9; 20]),
                gas_account_index: 1,
                gas_fee_asset_id: 0,
                gas_fee_asset_amount: 1000,
                nonce: 0,
                expired_at: i64::MAX,
                sig: Default::default(),
            }),
        ];
        for tx in txs {
            let bytes = encode_tx_pubdata(&tx).unwrap();
            assert!(bytes.len() <= PUBDATA_BYTES_PER_TX, "{:?}", tx.tx_type());
        }
    }

    proptest! {
        #[test]
        fn deposit_pubdata_round_trips(
            account_index in 0u32..u32::MAX,
            addr in proptest::array::uniform20(any::<u8>()),
            asset_id in 0u16..u16::MAX,
            amount in any::<u128>(),
        ) {
            let tx = DepositTx {
                account_index,
                l1_address: L1Address(addr),
                asset_id,
                asset_amount: amount,
            };
            let bytes = encode_tx_pubdata(&TxInfo::Deposit(tx.clone())).unwrap();
            prop_assert_eq!(parse_deposit_pubdata(&bytes).unwrap(), tx);
        }
    }
}
