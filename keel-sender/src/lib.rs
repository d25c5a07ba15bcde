//! keel-sender — settlement pipeline against the L1 rollup contract.
//!
//! Two independent loops share one discipline: at most one outstanding L1 tx
//! per type, height ranges resumed from the last handled record, and a gas
//! escalation path capped by configuration. `update_sent_txs` reconciles
//! receipts and drives the block lifecycle Pending -> Committed -> Verified.

pub mod config;

pub mod contract;

pub mod monitor;

pub mod sender;

pub mod signer;

pub mod store;

pub use config::SenderConfig;

pub use contract::{EthersL1Client, L1Client, RollupContract};

pub use monitor::{parse_priority_request, parse_receipt_events, EventType, RollupEvent};

pub use sender::Sender;

pub use signer::{ExternalKeyStore, KmsSigner, PrivateKeySigner, RollupSigner};

pub use store::{MemProofStore, MemRollupTxStore, ProofStore, RollupTxStore};
