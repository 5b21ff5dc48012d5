//! Settlement pipeline: one trigger in, one executor decision out.
//!
//! Decode → Resolve → Gather → Classify → Map → Encode, strictly in that
//! order, single attempt. Decode, Resolve and Gather failures end the run
//! with no payload. Classification cannot fail; an UNDETERMINED verdict
//! is handed to the outcome policy like any other.
//!
//! Nothing is persisted between runs and nothing is signed or sent: the
//! result is returned for the host to act on.

use crate::classify::{ClassificationService, Verdict};
use crate::evidence::{join_corpus, EvidenceSource};
use crate::market::MarketReader;
use crate::outcome::{OutcomeCode, OutcomePolicy};
use crate::trigger::{self, DecodeError, MarketEvent, SettlementPayload};
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a run produced no transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    DecodeError,
    MetadataUnavailable,
    EvidenceUnavailable,
    /// Verdict was UNDETERMINED and the policy withholds settlement.
    Unresolved,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::DecodeError => "DecodeError",
            ErrorKind::MetadataUnavailable => "MetadataUnavailable",
            ErrorKind::EvidenceUnavailable => "EvidenceUnavailable",
            ErrorKind::Unresolved => "Unresolved",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    Executable {
        condition_id: B256,
        verdict: Verdict,
        winning_token_id: U256,
        payload: SettlementPayload,
    },
    NotExecutable {
        condition_id: Option<B256>,
        reason: ErrorKind,
        detail: String,
    },
}

/// What the execution host consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorOutput {
    pub executable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_id: Option<String>,
}

impl PipelineResult {
    pub fn is_executable(&self) -> bool {
        matches!(self, PipelineResult::Executable { .. })
    }

    pub fn reason(&self) -> Option<ErrorKind> {
        match self {
            PipelineResult::Executable { .. } => None,
            PipelineResult::NotExecutable { reason, .. } => Some(*reason),
        }
    }

    pub fn payload(&self) -> Option<&SettlementPayload> {
        match self {
            PipelineResult::Executable { payload, .. } => Some(payload),
            PipelineResult::NotExecutable { .. } => None,
        }
    }

    pub fn to_output(&self) -> ExecutorOutput {
        match self {
            PipelineResult::Executable {
                condition_id,
                payload,
                ..
            } => ExecutorOutput {
                executable: true,
                call_target: Some(payload.target.to_string()),
                call_data: Some(payload.call_data.to_string()),
                reason: None,
                condition_id: Some(condition_id.to_string()),
            },
            PipelineResult::NotExecutable {
                condition_id,
                reason,
                ..
            } => ExecutorOutput {
                executable: false,
                call_target: None,
                call_data: None,
                reason: Some(*reason),
                condition_id: condition_id.map(|c| c.to_string()),
            },
        }
    }

    fn not_executable(condition_id: Option<B256>, reason: ErrorKind, detail: String) -> Self {
        PipelineResult::NotExecutable {
            condition_id,
            reason,
            detail,
        }
    }
}

/// Parse a raw JSON RPC log record and check it decodes as a creation
/// event. A record that is not valid JSON, is not a log, or carries the
/// wrong event all come back as a `DecodeError` result.
pub fn decode_json_log(raw: &str) -> Result<Log, PipelineResult> {
    let log: Log = serde_json::from_str(raw).map_err(|e| {
        PipelineResult::not_executable(
            None,
            ErrorKind::DecodeError,
            format!("invalid RPC log JSON: {e}"),
        )
    })?;
    if let Err(e) = trigger::decode_rpc(&log) {
        return Err(PipelineResult::not_executable(
            None,
            ErrorKind::DecodeError,
            e.to_string(),
        ));
    }
    Ok(log)
}

pub struct SettlementPipeline {
    market: Address,
    reader: Arc<dyn MarketReader>,
    evidence: Arc<dyn EvidenceSource>,
    classifier: Arc<dyn ClassificationService>,
    policy: OutcomePolicy,
    evidence_cap: usize,
}

impl SettlementPipeline {
    pub fn new(
        market: Address,
        reader: Arc<dyn MarketReader>,
        evidence: Arc<dyn EvidenceSource>,
        classifier: Arc<dyn ClassificationService>,
        policy: OutcomePolicy,
        evidence_cap: usize,
    ) -> Self {
        Self {
            market,
            reader,
            evidence,
            classifier,
            policy,
            evidence_cap,
        }
    }

    pub fn market(&self) -> Address {
        self.market
    }

    /// Full run from a raw log. Logs from any contract other than the
    /// configured market are rejected at decode.
    pub async fn handle(&self, log: &Log) -> PipelineResult {
        let event = match trigger::decode_rpc(log) {
            Ok(event) => event,
            Err(e) => {
                return self.finish(PipelineResult::not_executable(
                    None,
                    ErrorKind::DecodeError,
                    e.to_string(),
                ));
            }
        };

        if event.emitter != self.market {
            let e = DecodeError::UnexpectedEmitter {
                expected: self.market,
                found: event.emitter,
            };
            return self.finish(PipelineResult::not_executable(
                Some(event.condition_id),
                ErrorKind::DecodeError,
                e.to_string(),
            ));
        }

        self.settle(&event).await
    }

    /// Full run from a raw JSON log record.
    pub async fn handle_json(&self, raw: &str) -> PipelineResult {
        match decode_json_log(raw) {
            Ok(log) => self.handle(&log).await,
            Err(rejected) => self.finish(rejected),
        }
    }

    /// Run from an already-decoded trigger.
    pub async fn settle(&self, event: &MarketEvent) -> PipelineResult {
        let result = self.run(event).await;
        self.finish(result)
    }

    async fn run(&self, event: &MarketEvent) -> PipelineResult {
        let cid = event.condition_id;
        info!(event = %event, block = ?event.block_number, "market created, settling");

        // Resolve
        let meta = match self.reader.resolve(self.market, cid).await {
            Ok(meta) => meta,
            Err(e) => {
                warn!(condition_id = %cid, error = %e, "market metadata unavailable");
                return PipelineResult::not_executable(
                    Some(cid),
                    ErrorKind::MetadataUnavailable,
                    e.to_string(),
                );
            }
        };
        info!(
            condition_id = %cid,
            question = %meta.question,
            identity = %meta.evidence_identity,
            "market metadata resolved"
        );

        // Gather
        let items = match self
            .evidence
            .fetch(&meta.evidence_identity, self.evidence_cap)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    condition_id = %cid,
                    identity = %meta.evidence_identity,
                    error = %e,
                    "evidence unavailable"
                );
                return PipelineResult::not_executable(
                    Some(cid),
                    ErrorKind::EvidenceUnavailable,
                    e.to_string(),
                );
            }
        };
        // Sources are trusted to honour the cap, but the corpus is bounded here regardless.
        let items = &items[..items.len().min(self.evidence_cap)];
        let corpus = join_corpus(items);

        // Classify
        let verdict = self.classifier.classify(&meta.question, &corpus).await;
        info!(
            condition_id = %cid,
            posts = items.len(),
            verdict = %verdict,
            "verdict"
        );

        // Map + Encode
        match self.policy.map(verdict) {
            OutcomeCode::Settle(token_id) => {
                let payload = trigger::encode_settlement(self.market, cid, token_id);
                debug!(
                    condition_id = %cid,
                    call_data = %payload.call_data,
                    "settlement payload encoded"
                );
                PipelineResult::Executable {
                    condition_id: cid,
                    verdict,
                    winning_token_id: token_id,
                    payload,
                }
            }
            OutcomeCode::Withhold => PipelineResult::not_executable(
                Some(cid),
                ErrorKind::Unresolved,
                format!("verdict {verdict} withheld by outcome policy"),
            ),
        }
    }

    fn finish(&self, result: PipelineResult) -> PipelineResult {
        match &result {
            PipelineResult::Executable {
                condition_id,
                verdict,
                winning_token_id,
                ..
            } => info!(
                condition_id = %condition_id,
                verdict = %verdict,
                winning_token_id = %winning_token_id,
                "run complete: executable"
            ),
            PipelineResult::NotExecutable {
                condition_id,
                reason,
                detail,
            } => warn!(
                condition_id = ?condition_id,
                reason = %reason,
                detail = %detail,
                "run complete: no transaction"
            ),
        }
        result
    }
}
