//! Canonical human-readable signature bodies. Users with plain L1 wallets
//! sign these strings (EIP-191 personal-sign) instead of structured data, so
//! the byte-for-byte layout here is part of the protocol.

use crate::error::TxError;
use crate::tx::TxInfo;

const WEI_PER_ETHER: u128 = 1_000_000_000_000_000_000;

/// Wei amount rendered in ether with trailing zeros trimmed ("1.5", "0.000001").
pub fn format_wei_to_ether(amount: u128) -> String {
    let whole = amount / WEI_PER_ETHER;
    let frac = amount % WEI_PER_ETHER;
    if frac == 0 {
        return whole.to_string();
    }
    let frac_str = format!("{frac:018}");
    let trimmed = frac_str.trim_end_matches('0');
    format!("{whole}.{trimmed}")
}

/// The message a user signs for a given transaction.
pub fn generate_signature_body(tx: &TxInfo) -> Result<String, TxError> {
    let body = match tx {
        TxInfo::Withdraw(t) => format!(
            "Withdrawal {} to: {}\nFee: {} {}\nNonce: {}",
            format_wei_to_ether(t.asset_amount),
            t.to_address.to_hex(),
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        TxInfo::Transfer(t) => format!(
            "Transfer {} {} to: {}\nFee: {} {}\nNonce: {}",
            format_wei_to_ether(t.asset_amount),
            t.asset_id,
            t.to_account_index,
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        TxInfo::CreateCollection(t) => format!(
            "CreateCollection {} {} \nFee: {} {}\nNonce: {}",
            t.account_index,
            t.name,
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        TxInfo::MintNft(t) => format!(
            "MintNFT 0x{} for: {}\nFee: {} {}\nNonce: {}",
            hex::encode(t.nft_content_hash),
            t.to_account_index,
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        TxInfo::TransferNft(t) => format!(
            "TransferNFT {} {} to {} \nFee: {} {}\nNonce: {}",
            t.nft_index,
            t.from_account_index,
            t.to_account_index,
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        TxInfo::WithdrawNft(t) => format!(
            "Withdrawal {} to: {}\nFee: {} {}\nNonce: {}",
            t.nft_index,
            t.to_address.to_hex(),
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        TxInfo::CancelOffer(t) => format!(
            "CancelOffer {} by: {} \nFee: {} {}\nNonce: {}",
            t.offer_id,
            t.account_index,
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        TxInfo::AtomicMatch(t) => format!(
            "AtomicMatch {} {} {} {} \nFee: {} {}\nNonce: {}",
            format_wei_to_ether(t.buy_offer.asset_amount),
            t.sell_offer.offer_id,
            t.sell_offer.nft_index,
            t.account_index,
            format_wei_to_ether(t.gas_fee_asset_amount),
            t.gas_fee_asset_id,
            t.nonce
        ),
        _ => return Err(TxError::UnsupportedTxType),
    };
    Ok(body)
}

/// Account-scoped message used for NFT metadata mutation requests.
pub fn generate_account_signature_body(account_index: u32, nft_index: u64, nonce: u64) -> String {
    format!("AccountIndex:{account_index}\nNftIndex:{nft_index}\nNonce:{nonce}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::L1Address;
    use crate::tx::{TransferTx, TxSignature, WithdrawTx};

    #[test]
    fn ether_formatting() {
        assert_eq!(format_wei_to_ether(0), "0");
        assert_eq!(format_wei_to_ether(WEI_PER_ETHER), "1");
        assert_eq!(format_wei_to_ether(WEI_PER_ETHER + WEI_PER_ETHER / 2), "1.5");
        assert_eq!(format_wei_to_ether(1_000), "0.000000000000001");
    }

    #[test]
    fn withdraw_body_layout() {
        let tx = TxInfo::Withdraw(WithdrawTx {
            from_account_index: 2,
            asset_id: 0,
            asset_amount: 2 * WEI_PER_ETHER,
            to_address: L1Address([0xaa; 20]),
            gas_account_index: 1,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: WEI_PER_ETHER / 1000,
            nonce: 3,
            expired_at: i64::MAX,
            sig: TxSignature::default(),
        });
        let body = generate_signature_body(&tx).unwrap();
        assert_eq!(
            body,
            format!(
                "Withdrawal 2 to: 0x{}\nFee: 0.001 0\nNonce: 3",
                "aa".repeat(20)
            )
        );
    }

    #[test]
    fn priority_txs_have_no_body() {
        let tx = TxInfo::Transfer(TransferTx {
            from_account_index: 2,
            to_account_index: 3,
            to_l1_address: L1Address([1; 20]),
            asset_id: 0,
            asset_amount: 1,
            gas_account_index: 1,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: 1,
            nonce: 0,
            expired_at: 0,
            sig: TxSignature::default(),
        });
        assert!(generate_signature_body(&tx).is_ok());
        let dep = TxInfo::Deposit(crate::tx::DepositTx {
            account_index: 1,
            l1_address: L1Address([1; 20]),
            asset_id: 0,
            asset_amount: 1,
        });
        assert_eq!(generate_signature_body(&dep), Err(TxError::UnsupportedTxType));
    }
}
