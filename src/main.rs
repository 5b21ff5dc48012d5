//! PNP Twitter market settler.
//!
//! Usage:
//!   pnp-settler [--config <path>] watch          # subscribe and settle every new market
//!   pnp-settler [--config <path>] once <log.json> # settle a single RPC log record ("-" = stdin)
//!
//! Prints one JSON executor output per run to stdout. Never signs or
//! submits transactions.

use anyhow::{bail, Context, Result};
use alloy::providers::Provider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use pnp_settler::classify::LlmClassifier;
use pnp_settler::config::Config;
use pnp_settler::evidence::{SocialClient, SocialCredentials};
use pnp_settler::market::ChainMarketReader;
use pnp_settler::pipeline::{PipelineResult, SettlementPipeline};
use pnp_settler::watch::TriggerWatcher;

const DEFAULT_CONFIG: &str = "pnp-settler.toml";

/// Exit status of `once` when no transaction was produced.
const EXIT_NOT_EXECUTABLE: i32 = 2;

enum Mode {
    Watch,
    Once(String),
}

struct Args {
    config_path: PathBuf,
    mode: Mode,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut config_path = PathBuf::from(DEFAULT_CONFIG);
    let mut positional: Vec<&str> = Vec::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config_path = PathBuf::from(path);
        } else {
            positional.push(arg.as_str());
        }
    }

    let mode = match positional.as_slice() {
        [] | ["watch"] => Mode::Watch,
        ["once", source] => Mode::Once(source.to_string()),
        ["once"] => bail!("once needs a log file path or '-'"),
        other => bail!("unrecognised arguments: {}", other.join(" ")),
    };

    Ok(Args { config_path, mode })
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    let config = if args.config_path.exists() {
        Config::load(&args.config_path)?
    } else {
        Config::from_env()?
    };

    init_logging(&config);
    info!("pnp-settler v{} starting", env!("CARGO_PKG_VERSION"));
    if !args.config_path.exists() {
        info!(path = %args.config_path.display(), "no config file found, using env-only config");
    }

    let market = config.market_address()?;
    let reader = ChainMarketReader::connect_http(&config.chain.rpc_url)?;

    let chain_id = reader.provider().get_chain_id().await?;
    if chain_id != config.chain.chain_id {
        bail!(
            "RPC chain id {} does not match configured chain id {}",
            chain_id,
            config.chain.chain_id
        );
    }

    let creds =
        SocialCredentials::from_config(&config.evidence.username, &config.evidence.password);
    if creds.is_none() {
        warn!(
            "no evidence provider credentials configured - every run will end EvidenceUnavailable \
             (set EVIDENCE_USERNAME, EVIDENCE_PASSWORD)"
        );
    }
    if config.classifier.api_key.is_empty() {
        warn!("no classifier API key configured - every verdict will be UNDETERMINED (set GROQ_API_KEY)");
    }

    let evidence = SocialClient::new(
        config.evidence.base_url.clone(),
        creds,
        config.evidence.page_size,
        Duration::from_secs(config.evidence.timeout_secs),
    )?;
    let classifier = LlmClassifier::new(&config.classifier)?;

    let pipeline = Arc::new(SettlementPipeline::new(
        market,
        Arc::new(reader),
        Arc::new(evidence),
        Arc::new(classifier),
        config.outcome_policy(),
        config.evidence.max_posts,
    ));

    info!(
        chain_id,
        market = %market,
        evidence_cap = config.evidence.max_posts,
        model = %config.classifier.model,
        "pipeline ready"
    );

    match args.mode {
        Mode::Watch => run_watch(&config, pipeline).await,
        Mode::Once(source) => {
            let result = run_once(&source, &pipeline).await?;
            if !result.is_executable() {
                std::process::exit(EXIT_NOT_EXECUTABLE);
            }
            Ok(())
        }
    }
}

fn init_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    // stdout carries executor output; logs go to stderr
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run_watch(config: &Config, pipeline: Arc<SettlementPipeline>) -> Result<()> {
    if config.chain.ws_url.is_empty() {
        bail!("watch mode needs chain.ws_url (or PNP_WS_URL)");
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<PipelineResult>();
    let handle = TriggerWatcher::new(config.chain.ws_url.clone(), pipeline, tx).start();

    loop {
        tokio::select! {
            Some(result) = rx.recv() => print_output(&result)?,
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
                break;
            }
        }
    }

    handle.abort();
    Ok(())
}

async fn run_once(source: &str, pipeline: &SettlementPipeline) -> Result<PipelineResult> {
    let raw = read_source(source).await?;
    let result = pipeline.handle_json(&raw).await;
    print_output(&result)?;
    Ok(result)
}

async fn read_source(source: &str) -> Result<String> {
    if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin().read_to_string(&mut buf).await?;
        Ok(buf)
    } else {
        tokio::fs::read_to_string(Path::new(source))
            .await
            .with_context(|| format!("failed to read {source}"))
    }
}

fn print_output(result: &PipelineResult) -> Result<()> {
    println!("{}", serde_json::to_string(&result.to_output())?);
    Ok(())
}
