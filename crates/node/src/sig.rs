//! L2 transaction signature verification. Users sign the canonical
//! human-readable body (EIP-191 personal-sign) with their L1 key; we recover
//! the signer and match it against the initiating account's L1 address.

use ethers_core::types::{Address as EthAddress, Signature};
use keel_ledger::address::L1Address;
use keel_ledger::error::TxError;
use keel_ledger::sign_body::generate_signature_body;
use keel_ledger::tx::{Offer, TxInfo, TxSignature};

fn recover(body: &str, sig: &TxSignature) -> Result<EthAddress, TxError> {
    let signature = Signature::try_from(sig.0.as_slice()).map_err(|_| TxError::BadSignature)?;
    signature
        .recover(body.to_string())
        .map_err(|_| TxError::BadSignature)
}

fn matches_address(recovered: EthAddress, expected: &L1Address) -> bool {
    recovered.as_bytes() == expected.as_bytes()
}

/// Verify the tx-level signature against the initiator's L1 address.
pub fn verify_tx_signature(tx: &TxInfo, expected: &L1Address) -> Result<(), TxError> {
    let sig = tx.sig().ok_or(TxError::BadSignature)?;
    if sig.is_empty() {
        return Err(TxError::BadSignature);
    }
    let body = generate_signature_body(tx)?;
    if !matches_address(recover(&body, sig)?, expected) {
        return Err(TxError::BadSignature);
    }
    Ok(())
}

/// Canonical body an offer owner signs.
pub fn offer_signature_body(offer: &Offer) -> String {
    format!(
        "Offer {} {} {} {} by: {}\nValid: {} to {}",
        offer.offer_type as u8,
        offer.offer_id,
        offer.nft_index,
        offer.asset_amount,
        offer.account_index,
        offer.listed_at,
        offer.expired_at
    )
}

/// Verify an offer's signature against its owner's L1 address.
pub fn verify_offer_signature(offer: &Offer, expected: &L1Address) -> Result<(), TxError> {
    if offer.sig.is_empty() {
        return Err(TxError::BadSignature);
    }
    let body = offer_signature_body(offer);
    if !matches_address(recover(&body, &offer.sig)?, expected) {
        return Err(TxError::BadSignature);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::rand::thread_rng;
    use ethers_core::types::H160;
    use ethers_core::utils::hash_message;
    use keel_ledger::tx::{TransferTx, TxInfo};
    use keel_ledger::types::OfferType;

    fn signing_key() -> (ethers_core::k256::ecdsa::SigningKey, L1Address) {
        use ethers_core::k256::ecdsa::SigningKey;
        use ethers_core::utils::secret_key_to_address;
        let key = SigningKey::random(&mut thread_rng());
        let addr: H160 = secret_key_to_address(&key);
        let mut a = [0u8; 20];
        a.copy_from_slice(addr.as_bytes());
        (key, L1Address(a))
    }

    fn sign_body(key: &ethers_core::k256::ecdsa::SigningKey, body: &str) -> TxSignature {
        use ethers_core::k256::ecdsa::signature::hazmat::PrehashSigner;
        let digest = hash_message(body);
        let (sig, rec_id) = PrehashSigner::<(
            ethers_core::k256::ecdsa::Signature,
            ethers_core::k256::ecdsa::RecoveryId,
        )>::sign_prehash(key, digest.as_bytes())
        .unwrap();
        let mut out = sig.to_vec();
        out.push(27 + u8::from(rec_id));
        TxSignature(out)
    }

    fn transfer(sig: TxSignature) -> TxInfo {
        TxInfo::Transfer(TransferTx {
            from_account_index: 2,
            to_account_index: 3,
            to_l1_address: L1Address([3; 20]),
            asset_id: 0,
            asset_amount: 10,
            gas_account_index: 1,
            gas_fee_asset_id: 0,
            gas_fee_asset_amount: 1000,
            nonce: 4,
            expired_at: i64::MAX,
            sig,
        })
    }

    #[test]
    fn valid_signature_recovers_the_signer() {
        let (key, addr) = signing_key();
        let unsigned = transfer(TxSignature::default());
        let body = generate_signature_body(&unsigned).unwrap();
        let tx = transfer(sign_body(&key, &body));
        assert!(verify_tx_signature(&tx, &addr).is_ok());
        // A different expected address fails.
        assert_eq!(
            verify_tx_signature(&tx, &L1Address([0xFF; 20])),
            Err(TxError::BadSignature)
        );
    }

    #[test]
    fn empty_signature_rejected() {
        let tx = transfer(TxSignature::default());
        assert_eq!(
            verify_tx_signature(&tx, &L1Address([1; 20])),
            Err(TxError::BadSignature)
        );
    }

    #[test]
    fn offer_signature_round_trip() {
        let (key, addr) = signing_key();
        let mut offer = Offer {
            offer_type: OfferType::Sell,
            offer_id: 130,
            account_index: 2,
            nft_index: 7,
            asset_id: 0,
            asset_amount: 100,
            listed_at: 0,
            expired_at: i64::MAX,
            treasury_rate: 200,
            sig: TxSignature::default(),
        };
        offer.sig = sign_body(&key, &offer_signature_body(&offer));
        assert!(verify_offer_signature(&offer, &addr).is_ok());
        offer.asset_amount = 101;
        assert!(verify_offer_signature(&offer, &addr).is_err());
    }
}
