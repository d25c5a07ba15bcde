pub mod block;

pub mod block_processor;

pub mod executor;

pub mod ipfs;

pub mod metrics;

pub mod pipeline;

pub mod processor;

pub mod sig;

pub mod statedb;

pub mod store;

pub use block::{
    compute_commitment, genesis_stored_block_info, Block, CommitBlockInfo, CompressedBlock,
    StoredBlockInfo, VerifyAndExecuteBlockInfo,
};

pub use block_processor::{BlockError, BlockProcessor};

pub use executor::{new_tx_executor, BaseExecutor, DetailBuilder, TxExecutor, VerifyOpts};

pub use ipfs::{HttpIpfsClient, IpfsClient, IpfsError};

pub use pipeline::{BlockPipeline, SealedBlock, Worker};

pub use processor::{ApiProcessor, CommitProcessor, NonceHintCache, NoopNonceHints, ProcessError};

pub use sig::{offer_signature_body, verify_offer_signature, verify_tx_signature};

pub use statedb::{concat_keccak, GasFeeSchedule, StateDb, EMPTY_STRING_KECCAK};

pub use store::{
    AccountHistoryStore, BlockStore, ExecutedTx, MemAccountHistory, MemBlockStore, MemNftHistory,
    MemPriorityRequests, MemTxPool, NftHistoryStore, PoolTx, PriorityRequestStore, TxPool,
    TxStatus,
};
