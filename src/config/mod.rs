use crate::outcome::{OutcomePolicy, UndeterminedPolicy};
use alloy::primitives::{Address, U256};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: ChainConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub outcome: OutcomeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Expected chain id (Base mainnet by default).
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// HTTP RPC URL used for read-only market queries.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// WebSocket RPC URL used by the watch loop.
    #[serde(default)]
    pub ws_url: String,
    /// Market contract that emits the creation event and receives the settlement call.
    pub market_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvidenceConfig {
    /// Evidence provider REST base URL
    #[serde(default = "default_evidence_url")]
    pub base_url: String,
    /// Login username - loaded from env EVIDENCE_USERNAME
    #[serde(default)]
    pub username: String,
    /// Login password - loaded from env EVIDENCE_PASSWORD
    #[serde(default)]
    pub password: String,
    /// Maximum number of posts gathered per run.
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
    /// Posts requested per provider page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_evidence_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_classifier_url")]
    pub base_url: String,
    /// API key - loaded from env GROQ_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Response length cap; one token is enough for YES/NO.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Requests whose system plus user prompt exceed this many chars are
    /// rejected without calling the backend.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeConfig {
    #[serde(default = "default_yes_token_id")]
    pub yes_token_id: u64,
    #[serde(default = "default_no_token_id")]
    pub no_token_id: u64,
    /// `"withhold"` or `{ reserved = <token id> }`.
    #[serde(default)]
    pub undetermined: UndeterminedConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndeterminedConfig {
    #[default]
    Withhold,
    Reserved(u64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_chain_id() -> u64 {
    8453
}
fn default_rpc_url() -> String {
    "https://mainnet.base.org".to_string()
}
fn default_evidence_url() -> String {
    "http://127.0.0.1:8787".to_string()
}
fn default_max_posts() -> usize {
    20
}
fn default_page_size() -> usize {
    20
}
fn default_evidence_timeout() -> u64 {
    15
}
fn default_classifier_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_model() -> String {
    "llama-3.1-70b-versatile".to_string()
}
fn default_max_tokens() -> u32 {
    1
}
fn default_max_prompt_chars() -> usize {
    24_000
}
fn default_classifier_timeout() -> u64 {
    20
}
fn default_yes_token_id() -> u64 {
    1
}
fn default_no_token_id() -> u64 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_evidence_url(),
            username: String::new(),
            password: String::new(),
            max_posts: default_max_posts(),
            page_size: default_page_size(),
            timeout_secs: default_evidence_timeout(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_url(),
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_prompt_chars: default_max_prompt_chars(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            yes_token_id: default_yes_token_id(),
            no_token_id: default_no_token_id(),
            undetermined: UndeterminedConfig::Withhold,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;

        // Secrets come from the environment, never from the file
        if let Ok(user) = std::env::var("EVIDENCE_USERNAME") {
            config.evidence.username = user;
        }
        if let Ok(pass) = std::env::var("EVIDENCE_PASSWORD") {
            config.evidence.password = pass;
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            config.classifier.api_key = key;
        }
        if let Ok(addr) = std::env::var("PNP_MARKET_ADDRESS") {
            config.chain.market_address = addr;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Build a config from environment variables only (no file needed).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let market_address = var("PNP_MARKET_ADDRESS")
            .ok_or_else(|| ConfigError::MissingEnv("PNP_MARKET_ADDRESS".to_string()))?;

        let config = Config {
            chain: ChainConfig {
                chain_id: parse_var(&var, "PNP_CHAIN_ID").unwrap_or_else(default_chain_id),
                rpc_url: var("PNP_RPC_URL").unwrap_or_else(default_rpc_url),
                ws_url: var("PNP_WS_URL").unwrap_or_default(),
                market_address,
            },
            evidence: EvidenceConfig {
                base_url: var("EVIDENCE_BASE_URL").unwrap_or_else(default_evidence_url),
                username: var("EVIDENCE_USERNAME").unwrap_or_default(),
                password: var("EVIDENCE_PASSWORD").unwrap_or_default(),
                max_posts: parse_var(&var, "EVIDENCE_MAX_POSTS").unwrap_or_else(default_max_posts),
                page_size: parse_var(&var, "EVIDENCE_PAGE_SIZE").unwrap_or_else(default_page_size),
                timeout_secs: parse_var(&var, "EVIDENCE_TIMEOUT_SECS")
                    .unwrap_or_else(default_evidence_timeout),
            },
            classifier: ClassifierConfig {
                base_url: var("CLASSIFIER_BASE_URL").unwrap_or_else(default_classifier_url),
                api_key: var("GROQ_API_KEY").unwrap_or_default(),
                model: var("CLASSIFIER_MODEL").unwrap_or_else(default_model),
                max_tokens: parse_var(&var, "CLASSIFIER_MAX_TOKENS").unwrap_or_else(default_max_tokens),
                max_prompt_chars: parse_var(&var, "CLASSIFIER_MAX_PROMPT_CHARS")
                    .unwrap_or_else(default_max_prompt_chars),
                timeout_secs: parse_var(&var, "CLASSIFIER_TIMEOUT_SECS")
                    .unwrap_or_else(default_classifier_timeout),
            },
            outcome: OutcomeConfig::default(),
            logging: LoggingConfig {
                level: var("LOG_LEVEL").unwrap_or_else(default_log_level),
                json: parse_var(&var, "LOG_JSON").unwrap_or(false),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn market_address(&self) -> Result<Address, ConfigError> {
        Address::from_str(self.chain.market_address.trim()).map_err(|_| {
            ConfigError::InvalidAddress {
                field: "chain.market_address",
                value: self.chain.market_address.clone(),
            }
        })
    }

    pub fn outcome_policy(&self) -> OutcomePolicy {
        let undetermined = match self.outcome.undetermined {
            UndeterminedConfig::Withhold => UndeterminedPolicy::Withhold,
            UndeterminedConfig::Reserved(id) => UndeterminedPolicy::Reserved(U256::from(id)),
        };
        OutcomePolicy {
            yes: U256::from(self.outcome.yes_token_id),
            no: U256::from(self.outcome.no_token_id),
            undetermined,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.market_address()?.is_zero() {
            return Err(ConfigError::Invalid(
                "chain.market_address must not be the zero address".to_string(),
            ));
        }
        if self.evidence.max_posts == 0 {
            return Err(ConfigError::Invalid("evidence.max_posts must be > 0".to_string()));
        }
        if self.evidence.page_size == 0 {
            return Err(ConfigError::Invalid("evidence.page_size must be > 0".to_string()));
        }
        let o = &self.outcome;
        if o.yes_token_id == o.no_token_id {
            return Err(ConfigError::Invalid(
                "outcome.yes_token_id and outcome.no_token_id must differ".to_string(),
            ));
        }
        if let UndeterminedConfig::Reserved(id) = o.undetermined {
            if id == o.yes_token_id || id == o.no_token_id {
                return Err(ConfigError::Invalid(format!(
                    "reserved undetermined outcome {id} collides with a YES/NO token id"
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.trim().parse().ok())
}
