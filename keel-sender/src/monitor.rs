//! L1 event taxonomy. Topic hashes are keccak over the canonical event
//! signatures; receipt logs are classified into typed events, and
//! `NewPriorityRequest` logs yield priority-request records for the pool.

use anyhow::{anyhow, Result};
use ethers::types::{Log, TransactionReceipt, H256, U256};
use ethers::utils::keccak256;
use keel_ledger::pubdata::parse_priority_pubdata;
use keel_ledger::records::{PriorityRequest, PriorityRequestStatus};
use keel_ledger::types::TxType;
use once_cell::sync::Lazy;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EventType {
    NewPriorityRequest = 0,
    CommittedBlock = 1,
    VerifiedBlock = 2,
    RevertedBlock = 3,
    Desert = 4,
    NewAsset = 5,
    NewGovernor = 6,
    NewAssetGovernance = 7,
    ValidatorStatusUpdate = 8,
    AssetPausedUpdate = 9,
}

pub const EVENT_NEW_PRIORITY_REQUEST: &str =
    "NewPriorityRequest(address,uint64,uint8,bytes,uint256)";
pub const EVENT_BLOCK_COMMIT: &str = "BlockCommit(uint32)";
pub const EVENT_BLOCK_VERIFICATION: &str = "BlockVerification(uint32)";
pub const EVENT_BLOCKS_REVERT: &str = "BlocksRevert(uint32,uint32)";
pub const EVENT_DESERT_MODE: &str = "DesertMode()";
pub const EVENT_NEW_ASSET: &str = "NewAsset(address,uint16)";
pub const EVENT_NEW_GOVERNOR: &str = "NewGovernor(address)";
pub const EVENT_NEW_ASSET_GOVERNANCE: &str = "NewAssetGovernance(address)";
pub const EVENT_VALIDATOR_STATUS_UPDATE: &str = "ValidatorStatusUpdate(address,bool)";
pub const EVENT_ASSET_PAUSED_UPDATE: &str = "AssetPausedUpdate(address,bool)";

fn topic(signature: &str) -> H256 {
    H256::from(keccak256(signature.as_bytes()))
}

pub static NEW_PRIORITY_REQUEST_TOPIC: Lazy<H256> =
    Lazy::new(|| topic(EVENT_NEW_PRIORITY_REQUEST));
pub static BLOCK_COMMIT_TOPIC: Lazy<H256> = Lazy::new(|| topic(EVENT_BLOCK_COMMIT));
pub static BLOCK_VERIFICATION_TOPIC: Lazy<H256> = Lazy::new(|| topic(EVENT_BLOCK_VERIFICATION));
pub static BLOCKS_REVERT_TOPIC: Lazy<H256> = Lazy::new(|| topic(EVENT_BLOCKS_REVERT));
pub static DESERT_MODE_TOPIC: Lazy<H256> = Lazy::new(|| topic(EVENT_DESERT_MODE));
pub static NEW_ASSET_TOPIC: Lazy<H256> = Lazy::new(|| topic(EVENT_NEW_ASSET));
pub static NEW_GOVERNOR_TOPIC: Lazy<H256> = Lazy::new(|| topic(EVENT_NEW_GOVERNOR));
pub static NEW_ASSET_GOVERNANCE_TOPIC: Lazy<H256> =
    Lazy::new(|| topic(EVENT_NEW_ASSET_GOVERNANCE));
pub static VALIDATOR_STATUS_UPDATE_TOPIC: Lazy<H256> =
    Lazy::new(|| topic(EVENT_VALIDATOR_STATUS_UPDATE));
pub static ASSET_PAUSED_UPDATE_TOPIC: Lazy<H256> = Lazy::new(|| topic(EVENT_ASSET_PAUSED_UPDATE));

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RollupEvent {
    NewPriorityRequest {
        request_id: u64,
        tx_type: TxType,
        pubdata: Vec<u8>,
    },
    BlockCommit {
        block_number: u32,
    },
    BlockVerification {
        block_number: u32,
    },
    BlocksRevert {
        total_committed: u32,
        total_verified: u32,
    },
    DesertMode,
    Governance {
        event_type: EventType,
    },
}

fn word(data: &[u8], index: usize) -> Result<&[u8]> {
    data.get(index * 32..(index + 1) * 32)
        .ok_or_else(|| anyhow!("log data too short for word {index}"))
}

fn word_u64(data: &[u8], index: usize) -> Result<u64> {
    let w = word(data, index)?;
    Ok(U256::from_big_endian(w).low_u64())
}

/// Decode `NewPriorityRequest(address sender, uint64 serialId,
/// uint8 txType, bytes pubData, uint256 expirationBlock)`.
pub fn parse_new_priority_request(log: &Log) -> Result<RollupEvent> {
    let data = log.data.as_ref();
    let request_id = word_u64(data, 1)?;
    let tx_type_raw = word_u64(data, 2)? as u8;
    let tx_type =
        TxType::from_u8(tx_type_raw).ok_or_else(|| anyhow!("unknown tx type {tx_type_raw}"))?;
    if !tx_type.is_priority_operation() {
        return Err(anyhow!("tx type {tx_type_raw} is not a priority operation"));
    }
    // bytes head points at the tail; length word precedes the payload.
    let offset = word_u64(data, 3)? as usize;
    let len = U256::from_big_endian(
        data.get(offset..offset + 32)
            .ok_or_else(|| anyhow!("bad pubdata offset"))?,
    )
    .as_usize();
    let pubdata = data
        .get(offset + 32..offset + 32 + len)
        .ok_or_else(|| anyhow!("bad pubdata length"))?
        .to_vec();
    Ok(RollupEvent::NewPriorityRequest {
        request_id,
        tx_type,
        pubdata,
    })
}

/// Classify one log by its topic; None for unrelated contracts' noise.
pub fn parse_log(log: &Log) -> Result<Option<RollupEvent>> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let event = if *topic0 == *NEW_PRIORITY_REQUEST_TOPIC {
        parse_new_priority_request(log)?
    } else if *topic0 == *BLOCK_COMMIT_TOPIC {
        RollupEvent::BlockCommit {
            block_number: word_u64(log.data.as_ref(), 0)? as u32,
        }
    } else if *topic0 == *BLOCK_VERIFICATION_TOPIC {
        RollupEvent::BlockVerification {
            block_number: word_u64(log.data.as_ref(), 0)? as u32,
        }
    } else if *topic0 == *BLOCKS_REVERT_TOPIC {
        RollupEvent::BlocksRevert {
            total_committed: word_u64(log.data.as_ref(), 0)? as u32,
            total_verified: word_u64(log.data.as_ref(), 1)? as u32,
        }
    } else if *topic0 == *DESERT_MODE_TOPIC {
        RollupEvent::DesertMode
    } else if *topic0 == *NEW_ASSET_TOPIC {
        RollupEvent::Governance {
            event_type: EventType::NewAsset,
        }
    } else if *topic0 == *NEW_GOVERNOR_TOPIC {
        RollupEvent::Governance {
            event_type: EventType::NewGovernor,
        }
    } else if *topic0 == *NEW_ASSET_GOVERNANCE_TOPIC {
        RollupEvent::Governance {
            event_type: EventType::NewAssetGovernance,
        }
    } else if *topic0 == *VALIDATOR_STATUS_UPDATE_TOPIC {
        RollupEvent::Governance {
            event_type: EventType::ValidatorStatusUpdate,
        }
    } else if *topic0 == *ASSET_PAUSED_UPDATE_TOPIC {
        RollupEvent::Governance {
            event_type: EventType::AssetPausedUpdate,
        }
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

/// All recognized events in a receipt, in log order.
pub fn parse_receipt_events(receipt: &TransactionReceipt) -> Vec<RollupEvent> {
    receipt
        .logs
        .iter()
        .filter_map(|log| parse_log(log).ok().flatten())
        .collect()
}

/// Turn a `NewPriorityRequest` event into the pool record, decoding the
/// embedded pubdata to enforce its size up front.
pub fn parse_priority_request(event: &RollupEvent, l1_tx_hash: H256) -> Result<PriorityRequest> {
    let RollupEvent::NewPriorityRequest {
        request_id,
        tx_type,
        pubdata,
    } = event
    else {
        return Err(anyhow!("not a priority request event"));
    };
    // Hard decode error on any size mismatch.
    parse_priority_pubdata(pubdata).map_err(|e| anyhow!("bad priority pubdata: {e}"))?;
    Ok(PriorityRequest {
        request_id: *request_id,
        tx_type: *tx_type,
        pubdata: pubdata.clone(),
        status: PriorityRequestStatus::Pending,
        l1_tx_hash: format!("{l1_tx_hash:#x}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Bytes;
    use keel_ledger::address::L1Address;
    use keel_ledger::pubdata::encode_tx_pubdata;
    use keel_ledger::tx::{DepositTx, TxInfo};

    fn log_with(topic0: H256, data: Vec<u8>) -> Log {
        Log {
            topics: vec![topic0],
            data: Bytes::from(data),
            ..Default::default()
        }
    }

    fn abi_word(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    #[test]
    fn block_commit_log_parses() {
        let log = log_with(*BLOCK_COMMIT_TOPIC, abi_word(7).to_vec());
        assert_eq!(
            parse_log(&log).unwrap(),
            Some(RollupEvent::BlockCommit { block_number: 7 })
        );
    }

    #[test]
    fn unknown_topic_is_ignored() {
        let log = log_with(H256::from_low_u64_be(1), vec![]);
        assert_eq!(parse_log(&log).unwrap(), None);
    }

    #[test]
    fn priority_request_round_trips_through_log_encoding() {
        let deposit = TxInfo::Deposit(DepositTx {
            account_index: 2,
            l1_address: L1Address([0x02; 20]),
            asset_id: 0,
            asset_amount: 1_000_000,
        });
        let pubdata = encode_tx_pubdata(&deposit).unwrap();

        // ABI layout: sender, serialId, txType, offset(bytes), expiration,
        // then the tail with length-prefixed pubdata.
        let mut data = Vec::new();
        data.extend(abi_word(0)); // sender (unused)
        data.extend(abi_word(5)); // serial id
        data.extend(abi_word(2)); // tx type: deposit
        data.extend(abi_word(5 * 32)); // offset of bytes tail
        data.extend(abi_word(0)); // expiration
        data.extend(abi_word(pubdata.len() as u64));
        data.extend(&pubdata);
        data.resize(data.len().div_ceil(32) * 32, 0);

        let log = log_with(*NEW_PRIORITY_REQUEST_TOPIC, data);
        let event = parse_log(&log).unwrap().unwrap();
        let request = parse_priority_request(&event, H256::from_low_u64_be(9)).unwrap();
        assert_eq!(request.request_id, 5);
        assert_eq!(request.tx_type, TxType::Deposit);
        assert_eq!(request.pubdata, pubdata);

        // The decoded pubdata parses back into the original deposit.
        let parsed = keel_ledger::pubdata::parse_priority_pubdata(&request.pubdata).unwrap();
        assert_eq!(parsed, deposit);
    }
}
