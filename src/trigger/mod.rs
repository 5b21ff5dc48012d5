//! Trigger adapter: decodes the market-creation log into a `MarketEvent`
//! and encodes the final decision into a `settleTwitterMarket` call.
//!
//! Decoding is strict. A log that does not carry exactly the expected
//! signature and indexed fields is rejected with a `DecodeError` rather
//! than producing a zero-valued event.

pub mod abi;

use alloy::primitives::{Address, Bytes, Log as PrimitiveLog, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolCall;
use thiserror::Error;

use self::abi::PnpMarket;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topic0")]
    MissingTopic0,
    #[error("unexpected event signature {0}")]
    WrongSignature(B256),
    #[error("expected {expected} topics, found {found}")]
    TopicCount { expected: usize, found: usize },
    #[error("address topic has non-zero padding: {0}")]
    MalformedAddress(B256),
    #[error("unexpected non-indexed data ({0} bytes)")]
    UnexpectedData(usize),
    #[error("event emitted by {found}, expected market {expected}")]
    UnexpectedEmitter { expected: Address, found: Address },
    #[error("log was removed by a chain reorganisation")]
    Removed,
}

/// A decoded `PnpTwitterMarketCreated` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketEvent {
    pub condition_id: B256,
    pub market_creator: Address,
    /// Contract that emitted the log.
    pub emitter: Address,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
}

impl MarketEvent {
    /// Event with no block coordinates, as a host would hand over a bare trigger.
    pub fn new(condition_id: B256, market_creator: Address, emitter: Address) -> Self {
        Self {
            condition_id,
            market_creator,
            emitter,
            block_number: None,
            tx_hash: None,
        }
    }
}

impl std::fmt::Display for MarketEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MarketCreated(cid={}, creator={})",
            &format!("{}", self.condition_id)[..14],
            self.market_creator
        )
    }
}

/// The artifact handed back to the executor. Nothing here is signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPayload {
    pub target: Address,
    pub call_data: Bytes,
}

/// PnpTwitterMarketCreated(bytes32 indexed conditionId, address indexed marketCreator)
///
/// Topics: [sig, conditionId, marketCreator]. No data.
pub fn decode(log: &PrimitiveLog) -> Result<MarketEvent, DecodeError> {
    let topics = log.data.topics();

    let topic0 = topics.first().ok_or(DecodeError::MissingTopic0)?;
    if *topic0 != abi::MARKET_CREATED_TOPIC {
        return Err(DecodeError::WrongSignature(*topic0));
    }
    if topics.len() != abi::MARKET_CREATED_TOPIC_COUNT {
        return Err(DecodeError::TopicCount {
            expected: abi::MARKET_CREATED_TOPIC_COUNT,
            found: topics.len(),
        });
    }
    if !log.data.data.is_empty() {
        return Err(DecodeError::UnexpectedData(log.data.data.len()));
    }

    let condition_id = topics[1];
    let market_creator = address_from_topic(&topics[2])?;

    Ok(MarketEvent::new(condition_id, market_creator, log.address))
}

/// Decode an RPC log, keeping its block coordinates for observability.
pub fn decode_rpc(log: &Log) -> Result<MarketEvent, DecodeError> {
    if log.removed {
        return Err(DecodeError::Removed);
    }
    let mut event = decode(&log.inner)?;
    event.block_number = log.block_number;
    event.tx_hash = log.transaction_hash;
    Ok(event)
}

/// An indexed address is left-padded to 32 bytes; anything in the padding
/// means the topic was not produced from an address.
fn address_from_topic(topic: &B256) -> Result<Address, DecodeError> {
    if topic.0[..12].iter().any(|b| *b != 0) {
        return Err(DecodeError::MalformedAddress(*topic));
    }
    Ok(Address::from_slice(&topic.0[12..]))
}

/// Encode `settleTwitterMarket(conditionId, winningTokenId)` against `market`.
/// The token id is taken as given; choosing it is the outcome policy's job.
pub fn encode_settlement(market: Address, condition_id: B256, token_id: U256) -> SettlementPayload {
    let call = PnpMarket::settleTwitterMarketCall {
        conditionId: condition_id,
        _winningTokenId: token_id,
    };
    SettlementPayload {
        target: market,
        call_data: Bytes::from(call.abi_encode()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::{address, b256, LogData};

    pub const MARKET: Address = address!("00000000000000000000000000000000000000a1");
    pub const CREATOR: Address = address!("1111111111111111111111111111111111111111");
    pub const CID: B256 =
        b256!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

    pub fn creation_log(condition_id: B256, creator: Address) -> PrimitiveLog {
        PrimitiveLog {
            address: MARKET,
            data: LogData::new_unchecked(
                vec![
                    abi::MARKET_CREATED_TOPIC,
                    condition_id,
                    creator.into_word(),
                ],
                Bytes::new(),
            ),
        }
    }

    #[test]
    fn test_decode_extracts_fields() {
        let event = decode(&creation_log(CID, CREATOR)).unwrap();
        assert_eq!(event.condition_id, CID);
        assert_eq!(event.market_creator, CREATOR);
        assert_eq!(event.emitter, MARKET);
        assert_eq!(event.block_number, None);
    }

    #[test]
    fn test_decode_rejects_wrong_signature() {
        let mut log = creation_log(CID, CREATOR);
        let mut topics = log.data.topics().to_vec();
        topics[0] = B256::repeat_byte(0x01);
        log.data = LogData::new_unchecked(topics, Bytes::new());
        assert_eq!(
            decode(&log),
            Err(DecodeError::WrongSignature(B256::repeat_byte(0x01)))
        );
    }

    #[test]
    fn test_decode_rejects_missing_topics() {
        let mut log = creation_log(CID, CREATOR);
        log.data = LogData::new_unchecked(vec![abi::MARKET_CREATED_TOPIC, CID], Bytes::new());
        assert_eq!(
            decode(&log),
            Err(DecodeError::TopicCount { expected: 3, found: 2 })
        );

        log.data = LogData::new_unchecked(vec![], Bytes::new());
        assert_eq!(decode(&log), Err(DecodeError::MissingTopic0));
    }

    #[test]
    fn test_decode_rejects_dirty_address_padding() {
        let mut log = creation_log(CID, CREATOR);
        let dirty = B256::repeat_byte(0xff);
        log.data = LogData::new_unchecked(
            vec![abi::MARKET_CREATED_TOPIC, CID, dirty],
            Bytes::new(),
        );
        assert_eq!(decode(&log), Err(DecodeError::MalformedAddress(dirty)));
    }

    #[test]
    fn test_decode_rejects_trailing_data() {
        let mut log = creation_log(CID, CREATOR);
        log.data = LogData::new_unchecked(
            log.data.topics().to_vec(),
            Bytes::from(vec![0u8; 32]),
        );
        assert_eq!(decode(&log), Err(DecodeError::UnexpectedData(32)));
    }

    #[test]
    fn test_decode_rpc_keeps_block_coordinates() {
        let rpc_log = Log {
            inner: creation_log(CID, CREATOR),
            block_number: Some(42),
            transaction_hash: Some(B256::repeat_byte(0x07)),
            ..Default::default()
        };
        let event = decode_rpc(&rpc_log).unwrap();
        assert_eq!(event.block_number, Some(42));
        assert_eq!(event.tx_hash, Some(B256::repeat_byte(0x07)));
        assert_eq!(event.condition_id, CID);
    }

    #[test]
    fn test_decode_rpc_rejects_removed_log() {
        let rpc_log = Log {
            inner: creation_log(CID, CREATOR),
            removed: true,
            ..Default::default()
        };
        assert_eq!(decode_rpc(&rpc_log), Err(DecodeError::Removed));
    }

    #[test]
    fn test_encode_settlement_layout() {
        let payload = encode_settlement(MARKET, CID, U256::from(2));
        assert_eq!(payload.target, MARKET);

        let data = &payload.call_data;
        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(data[..4], abi::SETTLE_SELECTOR);
        assert_eq!(&data[4..36], CID.as_slice());
        assert_eq!(U256::from_be_slice(&data[36..68]), U256::from(2));

        let decoded = PnpMarket::settleTwitterMarketCall::abi_decode(data).unwrap();
        assert_eq!(decoded.conditionId, CID);
        assert_eq!(decoded._winningTokenId, U256::from(2));
    }
}
