//! Trigger watcher.
//!
//! Subscribes over WebSocket RPC to `PnpTwitterMarketCreated` logs from
//! the configured market contract and runs one pipeline invocation per
//! log. Results are emitted on a tokio channel; nothing is submitted.
//!
//! - Automatic reconnection with capped exponential backoff
//! - Logs flagged `removed` (reorged out) are skipped
//! - Each invocation runs in its own task; runs share no state

use crate::pipeline::{PipelineResult, SettlementPipeline};
use crate::trigger::abi;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct TriggerWatcher {
    ws_url: String,
    pipeline: Arc<SettlementPipeline>,
    result_tx: mpsc::UnboundedSender<PipelineResult>,
}

impl TriggerWatcher {
    pub fn new(
        ws_url: String,
        pipeline: Arc<SettlementPipeline>,
        result_tx: mpsc::UnboundedSender<PipelineResult>,
    ) -> Self {
        Self {
            ws_url,
            pipeline,
            result_tx,
        }
    }

    /// Start the watcher in a background task. Returns immediately.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_forever().await;
        })
    }

    /// Connect, subscribe, dispatch; reconnect on failure until the
    /// result receiver is dropped.
    async fn run_forever(&self) {
        let mut consecutive_failures: u32 = 0;

        loop {
            info!(url = %self.ws_url, "connecting to WebSocket RPC");

            match self.run_session().await {
                Ok(()) => {
                    info!("WebSocket session ended cleanly");
                    consecutive_failures = 0;
                }
                Err(e) => {
                    error!(url = %self.ws_url, error = %e, "WebSocket session error");
                    consecutive_failures += 1;
                }
            }

            if self.result_tx.is_closed() {
                info!("result receiver dropped, watcher stopping");
                return;
            }

            let backoff = backoff_for(consecutive_failures);
            info!(
                backoff_secs = backoff.as_secs(),
                failures = consecutive_failures,
                "reconnecting to WebSocket RPC"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    async fn run_session(&self) -> anyhow::Result<()> {
        let ws = WsConnect::new(self.ws_url.as_str());
        let provider = ProviderBuilder::new().connect_ws(ws).await?;

        let current_block = provider.get_block_number().await?;
        info!(block = current_block, "WebSocket connected, streaming forward");

        let filter = market_filter(self.pipeline.market());
        let sub = provider.subscribe_logs(&filter).await?;
        let mut stream = sub.into_stream();

        info!(market = %self.pipeline.market(), "subscribed to market creation events");

        while let Some(log) = stream.next().await {
            if log.removed {
                debug!(tx = ?log.transaction_hash, "skipping removed log");
                continue;
            }
            if self.result_tx.is_closed() {
                return Ok(());
            }
            self.dispatch(log);
        }

        // Stream ended — will reconnect
        Ok(())
    }

    fn dispatch(&self, log: Log) {
        let pipeline = self.pipeline.clone();
        let tx = self.result_tx.clone();
        tokio::spawn(async move {
            let result = pipeline.handle(&log).await;
            if tx.send(result).is_err() {
                warn!("result receiver dropped before run completed");
            }
        });
    }
}

/// Only the creation event, only from the market contract.
pub fn market_filter(market: Address) -> Filter {
    Filter::new()
        .address(market)
        .event_signature(abi::MARKET_CREATED_TOPIC)
}

fn backoff_for(consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
        return Duration::from_secs(1);
    }
    let secs = 2u64.pow(consecutive_failures.min(6));
    Duration::from_secs(secs).min(MAX_BACKOFF)
}
