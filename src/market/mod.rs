//! Market metadata resolution via read-only contract calls.
//!
//! For a given conditionId the market contract stores the question text
//! (`twitterQuestion`) and the social handle whose posts settle it
//! (`twitterSettlerId`). Both must resolve; there are no retries here.

use crate::trigger::abi::PnpMarket;
use alloy::primitives::{Address, B256};
use alloy::providers::RootProvider;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("{query} call failed: {message}")]
    Rpc { query: &'static str, message: String },
    #[error("{query} returned an empty value")]
    Empty { query: &'static str },
}

/// Per-market inputs resolved fresh on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketMetadata {
    pub question: String,
    /// Social-account handle whose recent posts are the evidence.
    pub evidence_identity: String,
}

#[async_trait]
pub trait MarketReader: Send + Sync {
    async fn resolve(
        &self,
        market: Address,
        condition_id: B256,
    ) -> Result<MarketMetadata, MetadataError>;
}

/// `MarketReader` backed by an HTTP JSON-RPC node.
pub struct ChainMarketReader {
    provider: RootProvider,
}

impl ChainMarketReader {
    pub fn new(provider: RootProvider) -> Self {
        Self { provider }
    }

    pub fn connect_http(rpc_url: &str) -> anyhow::Result<Self> {
        let provider = RootProvider::new_http(rpc_url.parse()?);
        Ok(Self::new(provider))
    }

    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }
}

#[async_trait]
impl MarketReader for ChainMarketReader {
    async fn resolve(
        &self,
        market: Address,
        condition_id: B256,
    ) -> Result<MarketMetadata, MetadataError> {
        let contract = PnpMarket::new(market, &self.provider);

        let question_call = contract.twitterQuestion(condition_id);
        let identity_call = contract.twitterSettlerId(condition_id);

        // Independent reads; either failing aborts the whole resolution.
        let (question, identity) = tokio::try_join!(
            async {
                question_call.call().await.map_err(|e| MetadataError::Rpc {
                    query: "twitterQuestion",
                    message: e.to_string(),
                })
            },
            async {
                identity_call.call().await.map_err(|e| MetadataError::Rpc {
                    query: "twitterSettlerId",
                    message: e.to_string(),
                })
            },
        )?;

        debug!(
            condition_id = %condition_id,
            question_len = question.len(),
            identity = %identity,
            "market metadata read"
        );

        MarketMetadata::from_raw(question, identity)
    }
}

impl MarketMetadata {
    /// Validate raw contract return values. Unset mappings come back as
    /// empty strings, which cannot drive a settlement.
    pub fn from_raw(question: String, identity: String) -> Result<Self, MetadataError> {
        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(MetadataError::Empty {
                query: "twitterQuestion",
            });
        }

        let evidence_identity = identity.trim().trim_start_matches('@').to_string();
        if evidence_identity.is_empty() {
            return Err(MetadataError::Empty {
                query: "twitterSettlerId",
            });
        }

        Ok(Self {
            question,
            evidence_identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_trims_and_strips_at() {
        let meta =
            MarketMetadata::from_raw(" Did X happen by Friday? ".into(), "@newsbot\n".into())
                .unwrap();
        assert_eq!(meta.question, "Did X happen by Friday?");
        assert_eq!(meta.evidence_identity, "newsbot");
    }

    #[test]
    fn test_from_raw_is_deterministic() {
        let raw = || (" Did X happen? ".to_string(), "@newsbot".to_string());
        let (q1, i1) = raw();
        let (q2, i2) = raw();
        assert_eq!(
            MarketMetadata::from_raw(q1, i1),
            MarketMetadata::from_raw(q2, i2)
        );
    }

    #[test]
    fn test_from_raw_rejects_unset_mappings() {
        assert_eq!(
            MarketMetadata::from_raw(String::new(), "newsbot".into()),
            Err(MetadataError::Empty {
                query: "twitterQuestion"
            })
        );
        assert_eq!(
            MarketMetadata::from_raw("q?".into(), "  ".into()),
            Err(MetadataError::Empty {
                query: "twitterSettlerId"
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_rpc_error() {
        // Nothing listens on port 9; the read must fail, never hang or default.
        let reader = ChainMarketReader::connect_http("http://127.0.0.1:9").unwrap();
        let err = reader
            .resolve(Address::repeat_byte(0xa1), B256::repeat_byte(0xaa))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Rpc { .. }));
    }
}
