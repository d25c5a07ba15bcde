use crate::error::TxError;
use crate::types::PUBKEY_BYTES;
use serde::{Deserialize, Serialize};

/// 20-byte L1 address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct L1Address(pub [u8; 20]);

impl L1Address {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Parse a `0x`-prefixed, 40-hex-digit address string.
    pub fn parse(s: &str) -> Result<Self, TxError> {
        let h = s.strip_prefix("0x").ok_or(TxError::InvalidL1Address)?;
        if h.len() != 40 {
            return Err(TxError::InvalidL1Address);
        }
        let bytes = hex::decode(h).map_err(|_| TxError::InvalidL1Address)?;
        let mut a = [0u8; 20];
        a.copy_from_slice(&bytes);
        Ok(L1Address(a))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Display for L1Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Uncompressed secp256k1 public key (65 bytes). An account registered by a
/// Deposit before its owner ever signed anything carries the empty key and
/// cannot originate L2 transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    pub fn empty() -> Self {
        PublicKey(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TxError> {
        if bytes.len() != PUBKEY_BYTES {
            return Err(TxError::InvalidTxInfo);
        }
        Ok(PublicKey(bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty() || self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Fixed-width encoding for pubdata: the empty key encodes as zeroes.
    pub fn to_fixed_bytes(&self) -> [u8; PUBKEY_BYTES] {
        let mut out = [0u8; PUBKEY_BYTES];
        if self.0.len() == PUBKEY_BYTES {
            out.copy_from_slice(&self.0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_bad_addresses() {
        assert!(L1Address::parse("0x01").is_err());
        assert!(L1Address::parse("1234").is_err());
        assert!(L1Address::parse("0xzz00000000000000000000000000000000000000").is_err());
        let a = L1Address::parse("0x0101010101010101010101010101010101010101").unwrap();
        assert_eq!(a.0, [1u8; 20]);
        assert_eq!(a.to_hex(), "0x0101010101010101010101010101010101010101");
    }

    #[test]
    fn empty_pubkey_detection() {
        assert!(PublicKey::empty().is_empty());
        assert!(PublicKey(vec![0u8; PUBKEY_BYTES]).is_empty());
        let mut k = vec![0u8; PUBKEY_BYTES];
        k[0] = 4;
        assert!(!PublicKey(k).is_empty());
    }
}
