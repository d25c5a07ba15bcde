use anyhow::{Context, Result};
use std::env;

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Clone, Debug)]
pub struct SenderConfig {
    pub rpc_url: String,
    pub rollup_address: String,
    /// Hex private keys for the two signing roles; empty when KMS mode is on.
    pub commit_sk: String,
    pub verify_sk: String,
    pub poll_secs: u64,

    /// Fixed gas price in wei; zero means ask the node.
    pub gas_price: u64,
    pub gas_limit: u64,
    /// Cap on escalation: `gasPrice * (1 + pct/100)`.
    pub max_gas_price_increase_percentage: u64,

    pub max_commit_block_count: u64,
    pub max_verify_block_count: u64,
    /// Shrink the batch while its tx count stays above this.
    pub commit_tx_count_limit: u64,
    pub verify_tx_count_limit: u64,

    // Submit-now thresholds.
    pub max_commit_tx_count: u64,
    pub max_verify_tx_count: u64,
    pub max_commit_block_interval_secs: u64,
    pub max_verify_block_interval_secs: u64,
    pub max_commit_avg_unit_gas: u64,
    pub max_verify_avg_unit_gas: u64,

    /// Receipts older than this with no inclusion are abandoned for resubmit.
    pub max_waiting_time_secs: u64,
    /// Confirmations before a receipt counts as final.
    pub confirm_blocks_count: u64,
}

impl SenderConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = SenderConfig {
            rpc_url: env::var("KEEL_L1_RPC").context("KEEL_L1_RPC env var missing")?,
            rollup_address: env::var("KEEL_ROLLUP_ADDRESS")
                .context("KEEL_ROLLUP_ADDRESS env var missing")?,
            commit_sk: env::var("KEEL_COMMIT_SK").unwrap_or_default(),
            verify_sk: env::var("KEEL_VERIFY_SK").unwrap_or_default(),
            poll_secs: env_u64("KEEL_SENDER_POLL_SECS", 10),
            gas_price: env_u64("KEEL_GAS_PRICE", 0),
            gas_limit: env_u64("KEEL_GAS_LIMIT", 5_000_000),
            max_gas_price_increase_percentage: env_u64("KEEL_MAX_GAS_PRICE_INCREASE_PCT", 0),
            max_commit_block_count: env_u64("KEEL_MAX_COMMIT_BLOCK_COUNT", 4),
            max_verify_block_count: env_u64("KEEL_MAX_VERIFY_BLOCK_COUNT", 4),
            commit_tx_count_limit: env_u64("KEEL_COMMIT_TX_COUNT_LIMIT", 100),
            verify_tx_count_limit: env_u64("KEEL_VERIFY_TX_COUNT_LIMIT", 100),
            max_commit_tx_count: env_u64("KEEL_MAX_COMMIT_TX_COUNT", 10),
            max_verify_tx_count: env_u64("KEEL_MAX_VERIFY_TX_COUNT", 10),
            max_commit_block_interval_secs: env_u64("KEEL_MAX_COMMIT_BLOCK_INTERVAL", 300),
            max_verify_block_interval_secs: env_u64("KEEL_MAX_VERIFY_BLOCK_INTERVAL", 300),
            max_commit_avg_unit_gas: env_u64("KEEL_MAX_COMMIT_AVG_UNIT_GAS", 200_000),
            max_verify_avg_unit_gas: env_u64("KEEL_MAX_VERIFY_AVG_UNIT_GAS", 200_000),
            max_waiting_time_secs: env_u64("KEEL_MAX_WAITING_TIME", 600),
            confirm_blocks_count: env_u64("KEEL_CONFIRM_BLOCKS_COUNT", 6),
        };
        if cfg.max_gas_price_increase_percentage == 0 {
            // Percentage = ((maxGasPrice - gasPrice) / gasPrice) * 100
            cfg.max_gas_price_increase_percentage = 50;
        }
        Ok(cfg)
    }

    /// Fixed configuration for tests and local dry runs.
    pub fn for_tests() -> Self {
        SenderConfig {
            rpc_url: "http://127.0.0.1:8545".into(),
            rollup_address: format!("0x{}", "11".repeat(20)),
            commit_sk: String::new(),
            verify_sk: String::new(),
            poll_secs: 1,
            gas_price: 0,
            gas_limit: 5_000_000,
            max_gas_price_increase_percentage: 50,
            max_commit_block_count: 4,
            max_verify_block_count: 4,
            commit_tx_count_limit: 100,
            verify_tx_count_limit: 100,
            max_commit_tx_count: 10,
            max_verify_tx_count: 10,
            max_commit_block_interval_secs: 300,
            max_verify_block_interval_secs: 300,
            max_commit_avg_unit_gas: 200_000,
            max_verify_avg_unit_gas: 200_000,
            max_waiting_time_secs: 600,
            confirm_blocks_count: 6,
        }
    }
}
