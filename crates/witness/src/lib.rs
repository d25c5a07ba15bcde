//! Witness construction for the prover: per-transaction before-state Merkle
//! proofs with fixed slot counts, the per-block gas witness, and the packed
//! proof format handed to the settlement pipeline.

pub mod helper;

pub mod proof;

pub mod witness;

pub use helper::{AccountProvider, WitnessHelper, WitnessTx};

pub use proof::{pack_proofs, FormattedProof};

pub use witness::{
    AccountAssetWitness, AccountWitness, GasWitness, NftWitness, TxWitness,
    NB_ACCOUNTS_PER_TX, NB_ACCOUNT_ASSETS_PER_ACCOUNT,
};

use keel_ledger::types::{AccountIndex, NftIndex};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WitnessError {
    #[error("account {0} not found")]
    AccountNotFound(AccountIndex),
    #[error("nft {0} not found")]
    NftNotFound(NftIndex),
    #[error("merkle proof has wrong depth: expected {expected}, got {got}")]
    BadProofDepth { expected: usize, got: usize },
    #[error("register must target the next account index (expected {expected}, got {got})")]
    UnexpectedRegisterIndex { expected: AccountIndex, got: AccountIndex },
    #[error("tx detail stream malformed: {0}")]
    MalformedDetails(String),
    #[error("proof for block {proof} paired with block {block}")]
    ProofBlockMismatch { proof: u64, block: u64 },
    #[error("state error: {0}")]
    State(String),
}

impl From<keel_ledger::StateError> for WitnessError {
    fn from(e: keel_ledger::StateError) -> Self {
        WitnessError::State(e.to_string())
    }
}

impl From<keel_ledger::CodecError> for WitnessError {
    fn from(e: keel_ledger::CodecError) -> Self {
        WitnessError::MalformedDetails(e.to_string())
    }
}
