//! Signer address determination. Two modes: a local private key or an
//! external KMS. Both sit behind one trait so the sender composes them
//! without branching at call sites.

use anyhow::{anyhow, Result};
use ethers::core::k256::ecdsa::SigningKey;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Signature, H160, H256};
use ethers::utils::secret_key_to_address;
use std::sync::Arc;

pub trait RollupSigner: Send + Sync {
    fn address(&self) -> H160;
    /// Sign a 32-byte transaction sighash, returning the recoverable
    /// signature with `v` already folded for the chain id.
    fn sign_hash(&self, hash: H256, chain_id: u64) -> Result<Signature>;
}

/// Private-key mode, backed by an in-process wallet.
pub struct PrivateKeySigner {
    wallet: LocalWallet,
}

impl PrivateKeySigner {
    pub fn from_hex(sk_hex: &str, chain_id: u64) -> Result<Self> {
        let sk = sk_hex.strip_prefix("0x").unwrap_or(sk_hex);
        let wallet: LocalWallet = sk
            .parse::<LocalWallet>()
            .map_err(|e| anyhow!("bad private key: {e}"))?
            .with_chain_id(chain_id);
        Ok(PrivateKeySigner { wallet })
    }
}

impl RollupSigner for PrivateKeySigner {
    fn address(&self) -> H160 {
        self.wallet.address()
    }

    fn sign_hash(&self, hash: H256, chain_id: u64) -> Result<Signature> {
        let mut sig = self.wallet.sign_hash(hash)?;
        // EIP-155 v for legacy transactions.
        sig.v = to_eip155_v(sig.v, chain_id);
        Ok(sig)
    }
}

fn to_eip155_v(v: u64, chain_id: u64) -> u64 {
    match v {
        0 | 1 => v + 35 + chain_id * 2,
        27 | 28 => v - 27 + 35 + chain_id * 2,
        _ => v,
    }
}

/// External key store: the KMS boundary. Implementations talk to the actual
/// service; the core only needs a digest signature and the derived address.
pub trait ExternalKeyStore: Send + Sync {
    fn public_address(&self, key_id: &str) -> Result<H160>;
    /// Raw (r, s, recovery id) over the digest.
    fn sign_digest(&self, key_id: &str, digest: [u8; 32]) -> Result<(H256, H256, u8)>;
}

/// KMS mode: address and signatures come from the external key store.
pub struct KmsSigner {
    store: Arc<dyn ExternalKeyStore>,
    key_id: String,
    address: H160,
}

impl KmsSigner {
    pub fn new(store: Arc<dyn ExternalKeyStore>, key_id: impl Into<String>) -> Result<Self> {
        let key_id = key_id.into();
        let address = store.public_address(&key_id)?;
        Ok(KmsSigner {
            store,
            key_id,
            address,
        })
    }
}

impl RollupSigner for KmsSigner {
    fn address(&self) -> H160 {
        self.address
    }

    fn sign_hash(&self, hash: H256, chain_id: u64) -> Result<Signature> {
        let (r, s, rec_id) = self.store.sign_digest(&self.key_id, hash.0)?;
        Ok(Signature {
            r: ethers::types::U256::from_big_endian(r.as_bytes()),
            s: ethers::types::U256::from_big_endian(s.as_bytes()),
            v: to_eip155_v(rec_id as u64, chain_id),
        })
    }
}

/// Test-only deterministic key store built on a local signing key.
pub struct LocalKeyStore {
    key: SigningKey,
}

impl LocalKeyStore {
    pub fn random() -> Self {
        LocalKeyStore {
            key: SigningKey::random(&mut ethers::core::rand::thread_rng()),
        }
    }
}

impl ExternalKeyStore for LocalKeyStore {
    fn public_address(&self, _key_id: &str) -> Result<H160> {
        Ok(secret_key_to_address(&self.key))
    }

    fn sign_digest(&self, _key_id: &str, digest: [u8; 32]) -> Result<(H256, H256, u8)> {
        use ethers::core::k256::ecdsa::signature::hazmat::PrehashSigner;
        let (sig, rec_id): (ethers::core::k256::ecdsa::Signature, _) = self
            .key
            .sign_prehash(&digest)
            .map_err(|e| anyhow!("sign failed: {e}"))?;
        let r = H256::from_slice(&sig.r().to_bytes());
        let s = H256::from_slice(&sig.s().to_bytes());
        Ok((r, s, u8::from(rec_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kms_signer_address_matches_store() {
        let store = Arc::new(LocalKeyStore::random());
        let expected = store.public_address("ignored").unwrap();
        let signer = KmsSigner::new(store, "commit-key").unwrap();
        assert_eq!(signer.address(), expected);
    }

    #[test]
    fn kms_signature_recovers_to_signer() {
        let store = Arc::new(LocalKeyStore::random());
        let signer = KmsSigner::new(store, "k").unwrap();
        let hash = H256::from_low_u64_be(42);
        let sig = signer.sign_hash(hash, 97).unwrap();
        let recovered = sig.recover(hash).unwrap();
        assert_eq!(recovered, signer.address());
    }
}
