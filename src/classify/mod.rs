//! Binary YES/NO classification of a market question against the
//! gathered evidence, via an OpenAI-compatible chat-completions backend
//! (Groq by default).
//!
//! Decoding is pinned (temperature 0, one-token cap) and the system
//! instruction only admits `YES` or `NO`. Every failure mode, from a
//! transport error to an unexpected answer, is absorbed here and
//! surfaces as `Verdict::Undetermined`; `classify` never errors.

use crate::config::ClassifierConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed judge instruction. Its stated default on insufficient evidence is NO.
pub const SYSTEM_PROMPT: &str = "You are an objective AI judge analyzing a specific prediction market question. \
Your ONLY task is to carefully review the provided tweets and determine a binary YES or NO answer. \
Rules: 1) Base your answer strictly on the tweet content. \
2) Analyze the tweets objectively and comprehensively. \
3) Respond ONLY with 'YES' or 'NO' - no additional explanation, context, or commentary is allowed. \
4) If the tweets are insufficient to make a clear determination, default to 'NO'.";

const SYSTEM_NAME: &str = "PNP_Protocol";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Yes,
    No,
    Undetermined,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Yes => write!(f, "YES"),
            Verdict::No => write!(f, "NO"),
            Verdict::Undetermined => write!(f, "UNDETERMINED"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("classifier API key not configured")]
    MissingApiKey,
    #[error("prompt of {len} chars exceeds limit of {max}")]
    InputTooLarge { len: usize, max: usize },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("response contained no message content")]
    EmptyResponse,
}

#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Always returns a well-formed verdict.
    async fn classify(&self, question: &str, evidence_text: &str) -> Verdict;
}

/// Map a raw model answer to a verdict. Only an exact YES or NO counts.
pub fn parse_verdict(answer: &str) -> Verdict {
    match answer.trim().to_uppercase().as_str() {
        "YES" => Verdict::Yes,
        "NO" => Verdict::No,
        _ => Verdict::Undetermined,
    }
}

/// Input size of one request: the system instruction plus the user prompt.
fn prompt_chars(user_prompt: &str) -> usize {
    SYSTEM_PROMPT.chars().count() + user_prompt.chars().count()
}

pub fn build_user_prompt(question: &str, evidence_text: &str) -> String {
    format!("Market question: {question}\n\nTweets:\n{evidence_text}")
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'static str>,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn first_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct LlmClassifier {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    max_prompt_chars: usize,
}

impl LlmClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            max_prompt_chars: config.max_prompt_chars,
        })
    }

    fn build_request<'a>(&'a self, user_prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    name: Some(SYSTEM_NAME),
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    name: None,
                    content: user_prompt,
                },
            ],
            temperature: 0.0,
            max_tokens: self.max_tokens,
        }
    }

    /// One backend call. Returns the raw answer text.
    pub async fn complete(
        &self,
        question: &str,
        evidence_text: &str,
    ) -> Result<String, ClassificationError> {
        if self.api_key.is_empty() {
            return Err(ClassificationError::MissingApiKey);
        }

        // No chunking: an oversized corpus is a failed call.
        let prompt = build_user_prompt(question, evidence_text);
        let len = prompt_chars(&prompt);
        if len > self.max_prompt_chars {
            return Err(ClassificationError::InputTooLarge {
                len,
                max: self.max_prompt_chars,
            });
        }

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(&prompt))
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status >= 400 {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassificationError::Api { status, body });
        }

        let parsed: ChatResponse = resp.json().await?;
        parsed
            .first_content()
            .ok_or(ClassificationError::EmptyResponse)
    }
}

#[async_trait]
impl ClassificationService for LlmClassifier {
    async fn classify(&self, question: &str, evidence_text: &str) -> Verdict {
        match self.complete(question, evidence_text).await {
            Ok(answer) => {
                debug!(answer = %answer, "raw classifier answer");
                let verdict = parse_verdict(&answer);
                if verdict == Verdict::Undetermined {
                    warn!(answer = %answer, "classifier answer is neither YES nor NO");
                } else {
                    info!(verdict = %verdict, model = %self.model, "classified");
                }
                verdict
            }
            Err(e) => {
                warn!(error = %e, "classification failed, verdict UNDETERMINED");
                Verdict::Undetermined
            }
        }
    }
}
