//! L1 access: the RPC client boundary and the rollup-contract call
//! composition. Calldata is ABI-encoded explicitly so the exact wire shape
//! of `commitBlocks` / `verifyAndExecuteBlocks` sits in one place.

use crate::signer::RollupSigner;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Bytes, TransactionReceipt, TransactionRequest, H160, H256, U256,
};
use ethers::utils::keccak256;
use keel_node::block::{CommitBlockInfo, StoredBlockInfo, VerifyAndExecuteBlockInfo};
use std::sync::Arc;

pub const COMMIT_BLOCKS_SIG: &str =
    "commitBlocks((uint16,uint32,uint64,bytes32,uint256,bytes32,bytes32),(bytes32,bytes,uint256,uint32[],uint32,uint16)[])";
pub const VERIFY_AND_EXECUTE_BLOCKS_SIG: &str =
    "verifyAndExecuteBlocks(((uint16,uint32,uint64,bytes32,uint256,bytes32,bytes32),bytes[])[],uint256[])";

/// The node-facing slice of the L1 RPC surface.
#[async_trait]
pub trait L1Client: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;
    async fn block_number(&self) -> Result<u64>;
    async fn suggest_gas_price(&self) -> Result<U256>;
    async fn pending_nonce(&self, address: H160) -> Result<u64>;
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256>;
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;
    async fn balance(&self, address: H160) -> Result<U256>;
}

pub struct EthersL1Client {
    provider: Provider<Http>,
}

impl EthersL1Client {
    pub fn new(rpc_url: &str) -> Result<Self> {
        Ok(EthersL1Client {
            provider: Provider::<Http>::try_from(rpc_url).context("bad L1 RPC url")?,
        })
    }
}

#[async_trait]
impl L1Client for EthersL1Client {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chainid().await?.as_u64())
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn suggest_gas_price(&self) -> Result<U256> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn pending_nonce(&self, address: H160) -> Result<u64> {
        Ok(self
            .provider
            .get_transaction_count(address, Some(ethers::types::BlockNumber::Pending.into()))
            .await?
            .as_u64())
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        Ok(self.provider.estimate_gas(tx, None).await?)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        Ok(self.provider.get_transaction_receipt(hash).await?)
    }

    async fn balance(&self, address: H160) -> Result<U256> {
        Ok(self.provider.get_balance(address, None).await?)
    }
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn stored_block_token(info: &StoredBlockInfo) -> Token {
    Token::Tuple(vec![
        Token::Uint(U256::from(info.block_size)),
        Token::Uint(U256::from(info.block_number)),
        Token::Uint(U256::from(info.priority_operations)),
        Token::FixedBytes(info.pending_onchain_operations_hash.to_vec()),
        Token::Uint(U256::from(info.timestamp)),
        Token::FixedBytes(info.state_root.to_vec()),
        Token::FixedBytes(info.commitment.to_vec()),
    ])
}

fn commit_block_token(info: &CommitBlockInfo) -> Token {
    Token::Tuple(vec![
        Token::FixedBytes(info.new_state_root.to_vec()),
        Token::Bytes(info.public_data.clone()),
        Token::Uint(U256::from(info.timestamp)),
        Token::Array(
            info.public_data_offsets
                .iter()
                .map(|o| Token::Uint(U256::from(*o)))
                .collect(),
        ),
        Token::Uint(U256::from(info.block_number)),
        Token::Uint(U256::from(info.block_size)),
    ])
}

fn verify_block_token(info: &VerifyAndExecuteBlockInfo) -> Token {
    Token::Tuple(vec![
        stored_block_token(&info.block_header),
        Token::Array(
            info.pending_onchain_ops_pubdata
                .iter()
                .map(|p| Token::Bytes(p.clone()))
                .collect(),
        ),
    ])
}

pub fn encode_commit_calldata(
    last_block: &StoredBlockInfo,
    new_blocks: &[CommitBlockInfo],
) -> Vec<u8> {
    let mut data = selector(COMMIT_BLOCKS_SIG).to_vec();
    data.extend(ethers::abi::encode(&[
        stored_block_token(last_block),
        Token::Array(new_blocks.iter().map(commit_block_token).collect()),
    ]));
    data
}

pub fn encode_verify_calldata(
    blocks: &[VerifyAndExecuteBlockInfo],
    proofs: &[[u8; 32]],
) -> Vec<u8> {
    let mut data = selector(VERIFY_AND_EXECUTE_BLOCKS_SIG).to_vec();
    data.extend(ethers::abi::encode(&[
        Token::Array(blocks.iter().map(verify_block_token).collect()),
        Token::Array(
            proofs
                .iter()
                .map(|word| Token::Uint(U256::from_big_endian(word)))
                .collect(),
        ),
    ]));
    data
}

/// Composes, signs, and submits the two settlement calls.
pub struct RollupContract {
    client: Arc<dyn L1Client>,
    address: H160,
    chain_id: u64,
}

impl RollupContract {
    pub fn new(client: Arc<dyn L1Client>, address: H160, chain_id: u64) -> Self {
        RollupContract {
            client,
            address,
            chain_id,
        }
    }

    pub fn address(&self) -> H160 {
        self.address
    }

    fn legacy_tx(
        &self,
        from: H160,
        calldata: Vec<u8>,
        gas_price: U256,
        gas_limit: u64,
        nonce: u64,
    ) -> TypedTransaction {
        TransactionRequest::new()
            .from(from)
            .to(self.address)
            .data(calldata)
            .gas_price(gas_price)
            .gas(gas_limit)
            .nonce(nonce)
            .chain_id(self.chain_id)
            .into()
    }

    async fn sign_and_send(
        &self,
        signer: &dyn RollupSigner,
        tx: TypedTransaction,
    ) -> Result<H256> {
        let sighash = tx.sighash();
        let signature = signer.sign_hash(sighash, self.chain_id)?;
        let raw = tx.rlp_signed(&signature);
        self.client.send_raw_transaction(raw).await
    }

    pub async fn estimate_commit_gas(
        &self,
        from: H160,
        last_block: &StoredBlockInfo,
        new_blocks: &[CommitBlockInfo],
        gas_price: U256,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<u64> {
        let tx = self.legacy_tx(
            from,
            encode_commit_calldata(last_block, new_blocks),
            gas_price,
            gas_limit,
            nonce,
        );
        Ok(self.client.estimate_gas(&tx).await?.as_u64())
    }

    pub async fn commit_blocks_with_nonce(
        &self,
        signer: &dyn RollupSigner,
        last_block: &StoredBlockInfo,
        new_blocks: &[CommitBlockInfo],
        gas_price: U256,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<H256> {
        let tx = self.legacy_tx(
            signer.address(),
            encode_commit_calldata(last_block, new_blocks),
            gas_price,
            gas_limit,
            nonce,
        );
        self.sign_and_send(signer, tx).await
    }

    pub async fn estimate_verify_gas(
        &self,
        from: H160,
        blocks: &[VerifyAndExecuteBlockInfo],
        proofs: &[[u8; 32]],
        gas_price: U256,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<u64> {
        let tx = self.legacy_tx(
            from,
            encode_verify_calldata(blocks, proofs),
            gas_price,
            gas_limit,
            nonce,
        );
        Ok(self.client.estimate_gas(&tx).await?.as_u64())
    }

    pub async fn verify_and_execute_blocks_with_nonce(
        &self,
        signer: &dyn RollupSigner,
        blocks: &[VerifyAndExecuteBlockInfo],
        proofs: &[[u8; 32]],
        gas_price: U256,
        gas_limit: u64,
        nonce: u64,
    ) -> Result<H256> {
        let tx = self.legacy_tx(
            signer.address(),
            encode_verify_calldata(blocks, proofs),
            gas_price,
            gas_limit,
            nonce,
        );
        self.sign_and_send(signer, tx).await
    }
}

pub fn parse_address(hex_addr: &str) -> Result<H160> {
    hex_addr
        .parse::<H160>()
        .map_err(|_| anyhow!("bad contract address: {hex_addr}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_distinct_and_deterministic() {
        assert_eq!(selector(COMMIT_BLOCKS_SIG), selector(COMMIT_BLOCKS_SIG));
        assert_ne!(
            selector(COMMIT_BLOCKS_SIG),
            selector(VERIFY_AND_EXECUTE_BLOCKS_SIG)
        );
    }

    #[test]
    fn commit_calldata_embeds_pubdata() {
        let last = StoredBlockInfo {
            block_size: 1,
            block_number: 0,
            priority_operations: 0,
            pending_onchain_operations_hash: [0; 32],
            timestamp: 0,
            state_root: [1; 32],
            commitment: [2; 32],
        };
        let info = CommitBlockInfo {
            new_state_root: [3; 32],
            public_data: vec![0xAB; 16],
            timestamp: 9,
            public_data_offsets: vec![0],
            block_number: 1,
            block_size: 1,
        };
        let data = encode_commit_calldata(&last, std::slice::from_ref(&info));
        assert_eq!(&data[..4], &selector(COMMIT_BLOCKS_SIG));
        // The pubdata bytes appear verbatim in the encoding.
        assert!(data
            .windows(16)
            .any(|w| w == [0xAB; 16]));
    }
}
