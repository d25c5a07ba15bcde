//! Sender pipeline against a scripted L1: the commit / verify round-trip
//! with receipt reconciliation, and the gas-escalation-then-abandon path.

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, Log, TransactionReceipt, H160, H256, U256};
use keel_ledger::records::{BlockStatus, L1RollupTx, L1RollupTxStatus, L1RollupTxType, ProofStatus};
use keel_node::block::Block;
use keel_node::store::{BlockStore, MemBlockStore};
use keel_sender::monitor::{BLOCK_COMMIT_TOPIC, BLOCK_VERIFICATION_TOPIC};
use keel_sender::signer::{KmsSigner, LocalKeyStore};
use keel_sender::store::{MemProofStore, MemRollupTxStore, ProofStore, RollupTxStore};
use keel_sender::{L1Client, RollupContract, Sender, SenderConfig};
use keel_witness::FormattedProof;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

enum SendOutcome {
    Accept(H256),
    Underpriced,
}

#[derive(Default)]
struct MockL1 {
    gas_price: u64,
    nonce: Mutex<u64>,
    block_number: Mutex<u64>,
    estimate: u64,
    script: Mutex<VecDeque<SendOutcome>>,
    sends: Mutex<Vec<Bytes>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
}

impl MockL1 {
    fn send_count(&self) -> usize {
        self.sends.lock().len()
    }

    fn install_receipt(&self, hash: H256, receipt: TransactionReceipt) {
        self.receipts.lock().insert(hash, receipt);
    }
}

#[async_trait]
impl L1Client for MockL1 {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(97)
    }

    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(*self.block_number.lock())
    }

    async fn suggest_gas_price(&self) -> anyhow::Result<U256> {
        Ok(U256::from(self.gas_price))
    }

    async fn pending_nonce(&self, _address: H160) -> anyhow::Result<u64> {
        Ok(*self.nonce.lock())
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> anyhow::Result<U256> {
        Ok(U256::from(self.estimate))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> anyhow::Result<H256> {
        self.sends.lock().push(raw);
        match self.script.lock().pop_front() {
            Some(SendOutcome::Accept(hash)) => Ok(hash),
            Some(SendOutcome::Underpriced) => {
                Err(anyhow::anyhow!("replacement transaction underpriced"))
            }
            None => Ok(H256::from_low_u64_be(0xAA)),
        }
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> anyhow::Result<Option<TransactionReceipt>> {
        Ok(self.receipts.lock().get(&hash).cloned())
    }

    async fn balance(&self, _address: H160) -> anyhow::Result<U256> {
        Ok(U256::zero())
    }
}

fn block(height: u64, txs: u16) -> Block {
    Block {
        height,
        state_root: [height as u8; 32],
        commitment: [height as u8 + 0x40; 32],
        pub_data: vec![0u8; 192],
        pub_data_offsets: vec![0],
        priority_operations: 0,
        pending_onchain_ops_hash: [0x33; 32],
        pending_onchain_ops_pubdata: vec![],
        real_block_size: txs,
        block_size: txs.next_power_of_two(),
        timestamp_ms: 1_000,
        status: BlockStatus::Pending,
        txs: vec![],
    }
}

fn proof(height: u64) -> FormattedProof {
    FormattedProof {
        a: ["1".into(), "2".into()],
        b: [["3".into(), "4".into()], ["5".into(), "6".into()]],
        c: ["7".into(), "8".into()],
        block_number: height,
    }
}

fn abi_word(v: u64) -> Vec<u8> {
    let mut w = vec![0u8; 32];
    w[24..].copy_from_slice(&v.to_be_bytes());
    w
}

fn receipt_with(topic: H256, block_numbers: &[u64], l1_height: u64) -> TransactionReceipt {
    TransactionReceipt {
        status: Some(1.into()),
        block_number: Some(l1_height.into()),
        logs: block_numbers
            .iter()
            .map(|n| Log {
                topics: vec![topic],
                data: Bytes::from(abi_word(*n)),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

struct Fixture {
    client: Arc<MockL1>,
    rollup_txs: Arc<MemRollupTxStore>,
    proofs: Arc<MemProofStore>,
    blocks: Arc<MemBlockStore>,
    sender: Sender,
}

fn fixture(client: MockL1, config: SenderConfig) -> Fixture {
    let client = Arc::new(client);
    let rollup_txs = Arc::new(MemRollupTxStore::default());
    let proofs = Arc::new(MemProofStore::default());
    let blocks = Arc::new(MemBlockStore::default());
    let store = Arc::new(LocalKeyStore::random());
    let commit_signer = Arc::new(KmsSigner::new(store.clone(), "commit").unwrap());
    let verify_signer = Arc::new(KmsSigner::new(store, "verify").unwrap());
    let contract = RollupContract::new(
        client.clone() as Arc<dyn L1Client>,
        H160::from_low_u64_be(0x1234),
        97,
    );
    let sender = Sender::new(
        config,
        client.clone(),
        contract,
        commit_signer,
        verify_signer,
        rollup_txs.clone(),
        proofs.clone(),
        blocks.clone(),
        [0u8; 32],
        Arc::new(|| 2_000_000),
    );
    Fixture {
        client,
        rollup_txs,
        proofs,
        blocks,
        sender,
    }
}

#[tokio::test]
async fn commit_then_verify_round_trip() {
    let commit_hash = H256::from_low_u64_be(0xC0);
    let verify_hash = H256::from_low_u64_be(0xFE);
    let client = MockL1 {
        gas_price: 20,
        estimate: 100_000,
        ..Default::default()
    };
    client
        .script
        .lock()
        .push_back(SendOutcome::Accept(commit_hash));
    client
        .script
        .lock()
        .push_back(SendOutcome::Accept(verify_hash));
    *client.block_number.lock() = 110;

    let f = fixture(client, SenderConfig::for_tests());
    // Two sealed blocks, 8 txs each: above the submit-now tx-count bar.
    for h in [1, 2] {
        let b = block(h, 8);
        f.blocks.save_compressed_block(b.compressed());
        f.blocks.save_block(b);
    }

    f.sender.commit_blocks().await.unwrap();
    let pending = f
        .rollup_txs
        .latest_pending(L1RollupTxType::Commit)
        .expect("commit tx recorded");
    assert_eq!(pending.l2_block_height, 2);
    assert_eq!(f.client.send_count(), 1);

    // A second tick does nothing while the commit is outstanding.
    f.sender.commit_blocks().await.unwrap();
    assert_eq!(f.client.send_count(), 1);

    // The finalized receipt flips the commit to Handled and the blocks to
    // Committed.
    f.client.install_receipt(
        commit_hash,
        receipt_with(*BLOCK_COMMIT_TOPIC, &[1, 2], 100),
    );
    f.sender.update_sent_txs().await.unwrap();
    assert!(f.rollup_txs.latest_pending(L1RollupTxType::Commit).is_none());
    assert_eq!(
        f.rollup_txs
            .latest_handled(L1RollupTxType::Commit)
            .unwrap()
            .l2_block_height,
        2
    );
    assert_eq!(
        f.blocks.block_by_height(2).unwrap().status,
        BlockStatus::Committed
    );

    // Verify defers until both proofs exist.
    f.sender.verify_and_execute_blocks().await.unwrap();
    assert_eq!(f.client.send_count(), 1);
    f.proofs.save(proof(1));
    f.proofs.save(proof(2));
    f.sender.verify_and_execute_blocks().await.unwrap();
    assert_eq!(f.client.send_count(), 2);
    let pending_verify = f
        .rollup_txs
        .latest_pending(L1RollupTxType::VerifyAndExecute)
        .expect("verify tx recorded");
    assert_eq!(pending_verify.l2_block_height, 2);

    // Finalized verification confirms proofs and finishes the lifecycle.
    f.client.install_receipt(
        verify_hash,
        receipt_with(*BLOCK_VERIFICATION_TOPIC, &[1, 2], 100),
    );
    f.sender.update_sent_txs().await.unwrap();
    assert_eq!(
        f.blocks.block_by_height(1).unwrap().status,
        BlockStatus::Verified
    );
    assert_eq!(f.proofs.status(1), Some(ProofStatus::Confirmed));
    assert_eq!(f.proofs.status(2), Some(ProofStatus::Confirmed));

    // Sender monotonicity: handled heights strictly increase per type.
    let handled: Vec<_> = f
        .rollup_txs
        .rows()
        .into_iter()
        .filter(|t| t.tx_status == L1RollupTxStatus::Handled)
        .collect();
    assert_eq!(handled.len(), 2);
}

#[tokio::test]
async fn gas_bump_then_abandon() {
    let client = MockL1 {
        gas_price: 20,
        estimate: 10_000,
        ..Default::default()
    };
    *client.nonce.lock() = 5;
    // Every attempt is rejected as underpriced.
    for _ in 0..16 {
        client.script.lock().push_back(SendOutcome::Underpriced);
    }

    let f = fixture(client, SenderConfig::for_tests());
    let b = block(1, 20);
    f.blocks.save_compressed_block(b.compressed());
    f.blocks.save_block(b);

    // A reaped earlier attempt pins nonce 5 at gas price 20.
    f.rollup_txs.seed_deleted(L1RollupTx {
        l1_tx_hash: format!("{:#x}", H256::from_low_u64_be(0xDEAD)),
        tx_type: L1RollupTxType::Commit,
        tx_status: L1RollupTxStatus::Pending,
        l2_block_height: 1,
        l1_nonce: 5,
        gas_price: 20,
        updated_at_ms: 0,
    });

    // Cap is 20 * 1.5 = 30; the escalation runs 22, 24, 26, 28, 30 and then
    // abandons the round without recording a new rollup tx.
    f.sender.commit_blocks().await.unwrap();
    assert_eq!(f.client.send_count(), 5);
    assert!(f.rollup_txs.latest_pending(L1RollupTxType::Commit).is_none());

    // The next tick starts over rather than erroring out.
    f.sender.commit_blocks().await.unwrap();
}
