//! keel-sender binary: wires the L1 client, signer modes, and stores, then
//! runs the commit / verify / reconcile loops on a jittered interval.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use keel_node::store::MemBlockStore;
use keel_sender::contract::parse_address;
use keel_sender::{
    EthersL1Client, L1Client, MemProofStore, MemRollupTxStore, PrivateKeySigner, RollupContract,
    RollupSigner, Sender, SenderConfig,
};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn jittered(secs: u64) -> Duration {
    let jitter: u64 = rand::thread_rng().gen_range(0..=500);
    Duration::from_millis(secs * 1000 + jitter)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = SenderConfig::from_env()?;
    let client = Arc::new(EthersL1Client::new(&config.rpc_url)?);
    let chain_id = client.chain_id().await.context("failed to query chain id")?;
    let rollup_address = parse_address(&config.rollup_address)?;

    let commit_signer = Arc::new(PrivateKeySigner::from_hex(&config.commit_sk, chain_id)?);
    let verify_signer = Arc::new(PrivateKeySigner::from_hex(&config.verify_sk, chain_id)?);
    info!(
        commit = %commit_signer.address(),
        verify = %verify_signer.address(),
        "sender signers ready"
    );

    let contract = RollupContract::new(client.clone() as Arc<dyn keel_sender::L1Client>, rollup_address, chain_id);

    // Single-process wiring uses the in-memory stores; a deployment points
    // these traits at the shared database instead.
    let rollup_txs = Arc::new(MemRollupTxStore::default());
    let proofs = Arc::new(MemProofStore::default());
    let blocks = Arc::new(MemBlockStore::default());

    let sender = Sender::new(
        config.clone(),
        client,
        contract,
        commit_signer,
        verify_signer,
        rollup_txs,
        proofs,
        blocks,
        [0u8; 32],
        Arc::new(now_ms),
    );

    info!(poll = config.poll_secs, "sender loops starting");
    loop {
        if let Err(e) = sender.commit_blocks().await {
            error!("commit loop error: {e:#}");
        }
        if let Err(e) = sender.verify_and_execute_blocks().await {
            error!("verify loop error: {e:#}");
        }
        if let Err(e) = sender.update_sent_txs().await {
            error!("update loop error: {e:#}");
        }
        tokio::time::sleep(jittered(config.poll_secs)).await;
    }
}
