//! Drives one transaction through the executor state machine and classifies
//! failures: Prepare/VerifyInputs/GenerateTxDetails errors reject the tx,
//! anything later aborts the whole block (the state cache may already carry
//! partial effects, so the process must not continue).

use crate::executor::{new_tx_executor, VerifyOpts};
use crate::statedb::StateDb;
use crate::store::{ExecutedTx, PoolTx};
use keel_ledger::error::TxError;
use keel_ledger::types::AccountIndex;
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// Drop the tx from the pool and continue with the block.
    #[error("tx rejected: {0}")]
    Reject(#[source] TxError),
    /// The block is unsalvageable; the operator restarts from the last
    /// confirmed block.
    #[error("block aborted at stage {stage}: {source}")]
    AbortBlock {
        stage: &'static str,
        #[source]
        source: TxError,
    },
}

/// Advisory cache of per-account pending nonces (Redis in production). Never
/// the source of truth; rewound best-effort when a commit aborts.
pub trait NonceHintCache: Send + Sync {
    fn set_pending_nonce(&self, account_index: AccountIndex, nonce: u64);
    fn clear_pending_nonce(&self, account_index: AccountIndex);
}

pub struct NoopNonceHints;

impl NonceHintCache for NoopNonceHints {
    fn set_pending_nonce(&self, _account_index: AccountIndex, _nonce: u64) {}
    fn clear_pending_nonce(&self, _account_index: AccountIndex) {}
}

/// Commit-path processor: fully executes the tx and records it in the state
/// cache.
pub struct CommitProcessor;

impl CommitProcessor {
    pub fn process(state: &mut StateDb, pool_tx: PoolTx) -> Result<ExecutedTx, ProcessError> {
        let mut executor = new_tx_executor(pool_tx).map_err(ProcessError::Reject)?;

        let start = Instant::now();
        executor.prepare(state).map_err(ProcessError::Reject)?;
        crate::metrics::stage_observe("prepare", start.elapsed());

        let start = Instant::now();
        executor
            .verify_inputs(state, VerifyOpts::commit())
            .map_err(ProcessError::Reject)?;
        crate::metrics::stage_observe("verify_inputs", start.elapsed());

        let start = Instant::now();
        let details = executor
            .generate_tx_details(state)
            .map_err(ProcessError::Reject)?;
        crate::metrics::stage_observe("generate_tx_details", start.elapsed());

        let start = Instant::now();
        executor
            .apply_transaction(state)
            .map_err(|e| ProcessError::AbortBlock {
                stage: "apply_transaction",
                source: e,
            })?;
        crate::metrics::stage_observe("apply_transaction", start.elapsed());

        let start = Instant::now();
        executor
            .generate_pub_data(state)
            .map_err(|e| ProcessError::AbortBlock {
                stage: "generate_pub_data",
                source: e,
            })?;
        crate::metrics::stage_observe("generate_pub_data", start.elapsed());

        let mut executed = executor
            .get_executed_tx(state, false)
            .map_err(|e| ProcessError::AbortBlock {
                stage: "get_executed_tx",
                source: e,
            })?;
        executor
            .finalize(state)
            .map_err(|e| ProcessError::AbortBlock {
                stage: "finalize",
                source: e,
            })?;

        executed.details = details;
        state.txs.push(executed.clone());
        Ok(executed)
    }
}

/// API-path processor: validates and prices a submission without mutating
/// the live state.
pub struct ApiProcessor;

impl ApiProcessor {
    pub fn process(state: &mut StateDb, pool_tx: PoolTx) -> Result<ExecutedTx, TxError> {
        let was_dry_run = state.dry_run;
        state.dry_run = true;
        let result = (|| {
            let mut executor = new_tx_executor(pool_tx)?;
            executor.prepare(state)?;
            executor.verify_inputs(state, VerifyOpts::api())?;
            executor.get_executed_tx(state, true)
        })();
        state.dry_run = was_dry_run;
        state.discard_pending();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PoolTx;
    use keel_ledger::account::Account;
    use keel_ledger::address::L1Address;
    use keel_ledger::tree::NIL_ASSET_ROOT;
    use keel_ledger::tx::{DepositTx, TransferTx, TxInfo, TxSignature};
    use keel_ledger::types::GAS_ACCOUNT_INDEX;

    fn seeded_state() -> StateDb {
        let mut state = StateDb::new();
        state.block_height = 1;
        state.block_timestamp_ms = 1_000;
        state.insert_confirmed_account(Account::new(0, L1Address([0xEE; 20]), *NIL_ASSET_ROOT));
        state.insert_confirmed_account(Account::new(
            GAS_ACCOUNT_INDEX,
            L1Address([0x01; 20]),
            *NIL_ASSET_ROOT,
        ));
        let mut sender = Account::new(2, L1Address([0x02; 20]), *NIL_ASSET_ROOT);
        sender.credit(0, 1_000_000);
        state.insert_confirmed_account(sender);
        state.insert_confirmed_account(Account::new(3, L1Address([0x03; 20]), *NIL_ASSET_ROOT));
        state
    }

    fn pool_tx(id: u64, info: TxInfo) -> PoolTx {
        PoolTx {
            pool_tx_id: id,
            tx_hash: String::new(),
            tx_info: info,
            created_at_ms: 0,
        }
    }

    #[test]
    fn transfer_executes_and_records() {
        let mut state = seeded_state();
        let tx = pool_tx(
            1,
            TxInfo::Transfer(TransferTx {
                from_account_index: 2,
                to_account_index: 3,
                to_l1_address: L1Address([0x03; 20]),
                asset_id: 0,
                asset_amount: 400_000,
                gas_account_index: GAS_ACCOUNT_INDEX,
                gas_fee_asset_id: 0,
                gas_fee_asset_amount: 1_000,
                nonce: 0,
                expired_at: i64::MAX,
                sig: TxSignature::default(),
            }),
        );
        let executed = CommitProcessor::process(&mut state, tx).unwrap();
        assert_eq!(executed.details.len(), 4);
        assert_eq!(state.get_account(2).unwrap().balance_of(0), 599_000);
        assert_eq!(state.get_account(3).unwrap().balance_of(0), 400_000);
        assert_eq!(state.get_account(2).unwrap().nonce, 1);
        assert_eq!(state.pending_gas().get(&0), Some(&1_000));
        assert_eq!(state.txs.len(), 1);
        // The tx hash was assigned during prepare.
        assert!(executed.tx_hash.starts_with("0x"));
    }

    #[test]
    fn bad_nonce_is_a_reject_not_an_abort() {
        let mut state = seeded_state();
        let tx = pool_tx(
            1,
            TxInfo::Transfer(TransferTx {
                from_account_index: 2,
                to_account_index: 3,
                to_l1_address: L1Address([0x03; 20]),
                asset_id: 0,
                asset_amount: 1,
                gas_account_index: GAS_ACCOUNT_INDEX,
                gas_fee_asset_id: 0,
                gas_fee_asset_amount: 1,
                nonce: 7,
                expired_at: i64::MAX,
                sig: TxSignature::default(),
            }),
        );
        match CommitProcessor::process(&mut state, tx) {
            Err(ProcessError::Reject(TxError::BadNonce { expected: 0, got: 7 })) => {}
            other => panic!("unexpected result: {other:?}"),
        }
        // No partial state.
        assert_eq!(state.get_account(2).unwrap().balance_of(0), 1_000_000);
        assert!(state.txs.is_empty());
    }

    #[test]
    fn deposit_advances_priority_bookkeeping() {
        let mut state = seeded_state();
        let before_hash = state.pending_onchain_ops_hash;
        let tx = pool_tx(
            2,
            TxInfo::Deposit(DepositTx {
                account_index: 0,
                l1_address: L1Address([0x02; 20]),
                asset_id: 0,
                asset_amount: 5,
            }),
        );
        CommitProcessor::process(&mut state, tx).unwrap();
        assert_eq!(state.priority_operations, 1);
        assert_eq!(state.pub_data_offsets, vec![0]);
        assert_ne!(state.pending_onchain_ops_hash, before_hash);
        assert_eq!(state.get_account(2).unwrap().balance_of(0), 1_000_005);
    }

    #[test]
    fn api_processor_leaves_state_untouched() {
        let mut state = seeded_state();
        let tx = pool_tx(
            3,
            TxInfo::Deposit(DepositTx {
                account_index: 0,
                l1_address: L1Address([0x44; 20]),
                asset_id: 0,
                asset_amount: 5,
            }),
        );
        ApiProcessor::process(&mut state, tx).unwrap();
        assert!(state
            .get_account_by_l1_address(&L1Address([0x44; 20]))
            .is_err());
        assert_eq!(state.priority_operations, 0);
    }
}
