//! AI vision collaborator: describe an image and judge whether it matters.
//!
//! The prompt lives in [`crate::prompts`]; this module owns the retry
//! contract and the parsing of the model's JSON answer.
//!
//! ## Retry contract
//!
//! | Failure | Retries | Delay before retry *n* |
//! |---------|---------|------------------------|
//! | rate limited (HTTP 429) | 3 | `2 s × n` (2, 4, 6 s) |
//! | transport (timeout, connection) | 3 | fixed 5 s |
//! | any other API error | 0 | n/a |
//!
//! The two counters are independent. When a budget runs out the analyzer
//! does **not** fail: it returns an [`VisualContentType::Error`] analysis so
//! one stubborn image never aborts a document.

use crate::config::{ProcessingConfig, VisionRetryPolicy};
use crate::model::VisualContentType;
use crate::pipeline::encode;
use crate::prompts::VISION_ANALYSIS_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

pub const INVALID_JSON: &str = "AI analysis failed to return valid JSON.";
pub const RATE_LIMIT_EXCEEDED: &str = "Rate limit exceeded";
pub const NETWORK_ERROR: &str = "Network error";

/// Structured answer of the vision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAnalysis {
    pub content_type: VisualContentType,
    pub description: String,
    /// Text visible in the image; empty when none.
    pub raw_text: String,
}

impl VisualAnalysis {
    /// "No usable description" result carrying a human-readable reason.
    pub fn error(description: impl Into<String>) -> Self {
        Self {
            content_type: VisualContentType::Error,
            description: description.into(),
            raw_text: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.content_type == VisualContentType::Error
    }
}

/// Anything that can describe an image. Never fails; see the module docs.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8]) -> VisualAnalysis;
}

/// Failure of a single vision call, sorted by how it is retried.
#[derive(Debug, Error)]
pub enum VisionCallError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("API error: {0}")]
    Api(String),
}

impl VisionCallError {
    /// Sort a provider error message into a retry class.
    pub fn from_message(msg: String) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
            VisionCallError::RateLimited(msg)
        } else if ["timeout", "timed out", "connection", "network", "dns"]
            .iter()
            .any(|k| lower.contains(k))
        {
            VisionCallError::Transport(msg)
        } else {
            VisionCallError::Api(msg)
        }
    }
}

/// Drive `call` under the retry contract and parse its answer.
pub async fn analyze_with_retry<F, Fut>(policy: &VisionRetryPolicy, mut call: F) -> VisualAnalysis
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, VisionCallError>>,
{
    let mut rate_limited = 0u32;
    let mut transport = 0u32;

    loop {
        match call().await {
            Ok(answer) => return parse_analysis(&answer),
            Err(VisionCallError::RateLimited(msg)) => {
                if rate_limited >= policy.rate_limit_retries {
                    warn!("vision: rate limit retries exhausted ({})", msg);
                    return VisualAnalysis::error(RATE_LIMIT_EXCEEDED);
                }
                rate_limited += 1;
                let delay = policy.rate_limit_delay(rate_limited);
                warn!(
                    "vision: rate limited, retry {}/{} after {:?}",
                    rate_limited, policy.rate_limit_retries, delay
                );
                sleep(delay).await;
            }
            Err(VisionCallError::Transport(msg)) => {
                if transport >= policy.transport_retries {
                    warn!("vision: transport retries exhausted ({})", msg);
                    return VisualAnalysis::error(NETWORK_ERROR);
                }
                transport += 1;
                warn!(
                    "vision: {}, retry {}/{} after {:?}",
                    msg, transport, policy.transport_retries, policy.transport_delay
                );
                sleep(policy.transport_delay).await;
            }
            Err(e @ VisionCallError::Api(_)) => {
                warn!("vision: {}", e);
                return VisualAnalysis::error(e.to_string());
            }
        }
    }
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(rename = "contentType", default)]
    content_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "rawText", default)]
    raw_text: Option<String>,
}

/// Parse the model's answer, tolerating a surrounding Markdown fence or
/// chatter around the JSON object.
pub fn parse_analysis(answer: &str) -> VisualAnalysis {
    let trimmed = answer.trim();
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return VisualAnalysis::error(INVALID_JSON),
    };
    let raw: RawAnalysis = match serde_json::from_str(body) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("vision answer is not JSON: {}", e);
            return VisualAnalysis::error(INVALID_JSON);
        }
    };

    let content_type = match raw.content_type.as_deref().map(|s| s.trim().to_lowercase()) {
        Some(t) if t == "substantive" => VisualContentType::Substantive,
        Some(t) if t == "decorative" => VisualContentType::Decorative,
        Some(t) if t == "error" => VisualContentType::Error,
        _ => VisualContentType::Unknown,
    };
    VisualAnalysis {
        content_type,
        description: raw.description.unwrap_or_default(),
        raw_text: raw.raw_text.unwrap_or_default(),
    }
}

// ── edgequake-llm implementation ────────────────────────────────────────

/// Vision analyzer backed by any multimodal [`LLMProvider`].
pub struct LlmVisionAnalyzer {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    retry: VisionRetryPolicy,
}

impl LlmVisionAnalyzer {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ProcessingConfig) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(config.temperature),
                max_tokens: Some(config.max_tokens),
                ..Default::default()
            },
            retry: config.vision_retry.clone(),
        }
    }
}

#[async_trait]
impl VisionAnalyzer for LlmVisionAnalyzer {
    async fn analyze(&self, image: &[u8]) -> VisualAnalysis {
        let messages = vec![ChatMessage::user_with_images(
            VISION_ANALYSIS_PROMPT,
            vec![encode::image_data(image)],
        )];

        let messages = &messages;
        let options = &self.options;
        let provider = &self.provider;
        analyze_with_retry(&self.retry, move || async move {
            match provider.chat(messages, Some(options)).await {
                Ok(response) => {
                    debug!(
                        "vision: {} input tokens, {} output tokens",
                        response.prompt_tokens, response.completion_tokens
                    );
                    Ok(response.content)
                }
                Err(e) => Err(VisionCallError::from_message(e.to_string())),
            }
        })
        .await
    }
}
