//! Semantic classification via the Groq chat-completions API.
//!
//! The AI layer sits behind the `SemanticClassifier` trait so the pipeline
//! never knows which backend (or stub) is wired in. Calls are paced with a
//! governor rate limiter; the hard per-call timeout is enforced by the
//! caller with `tokio::time::timeout`.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{Quota, RateLimiter as GovRateLimiter};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AiConfig;
use crate::models::{DetectionSignal, Severity, SignalKind};

/// Groq OpenAI-compatible chat-completions endpoint.
const GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// System prompt for the moderation verdict.
const MODERATION_SYSTEM_PROMPT: &str = r#"You are a content moderation assistant for a group chat. Analyze the message for:
1. Illegal trade (drugs, weapons, forged documents, stolen data)
2. Scams and fraud (crypto schemes, phishing, fake giveaways)
3. Harassment and threats
4. Child-safety violations (always critical)

Respond ONLY with a JSON object in this format:
{"violation": true, "severity": "low|medium|high|critical", "confidence": 0.85, "category": "scam", "reason": "brief explanation"}

If the message is fine, respond with:
{"violation": false, "severity": "none", "confidence": 0.0, "category": "", "reason": ""}"#;

/// Errors from one classification attempt. All of them are recovered by the
/// pipeline; none reaches the caller of evaluate().
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The call exceeded the hard timeout and was abandoned.
    #[error("classification timed out")]
    Timeout,

    /// The API rejected or the transport failed.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    /// The API asked us to back off.
    #[error("classifier rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}

pub type ClassifyResult<T> = std::result::Result<T, ClassifyError>;

/// Parsed classifier verdict for one message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub violation: bool,
    #[serde(default = "default_severity_str")]
    pub severity: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub reason: String,
}

fn default_severity_str() -> String {
    "none".to_string()
}

impl Classification {
    /// Convert to a detection signal. Non-violations and out-of-range
    /// confidences produce no signal.
    pub fn into_signal(self) -> Option<DetectionSignal> {
        if !self.violation {
            return None;
        }
        let severity = Severity::parse(&self.severity);
        if severity == Severity::None {
            return None;
        }
        Some(DetectionSignal {
            kind: SignalKind::Ai,
            matched: self.category,
            severity,
            confidence: self.confidence.clamp(0.0, 1.0),
            reason: self.reason,
        })
    }
}

/// The seam between the pipeline and whatever does semantic analysis.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> ClassifyResult<Classification>;

    /// Whether the pipeline should call this classifier at all.
    fn is_enabled(&self) -> bool {
        true
    }
}

type DirectRateLimiter = GovRateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Groq-backed classifier.
pub struct GroqClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl GroqClassifier {
    pub fn new(config: &AiConfig) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN),
        );
        let rate_limiter = Arc::new(GovRateLimiter::direct(quota));

        // The transport timeout backs up the caller-side hard timeout.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            rate_limiter,
        }
    }

    fn build_request(&self, text: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MODERATION_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: text.to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: 200,
        }
    }

    fn parse_response(response: ChatResponse) -> ClassifyResult<Classification> {
        let content = response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("{}");

        let json_text = extract_json(content);
        serde_json::from_str(json_text)
            .map_err(|e| ClassifyError::Unavailable(format!("unparseable verdict: {}", e)))
    }
}

#[async_trait]
impl SemanticClassifier for GroqClassifier {
    async fn classify(&self, text: &str) -> ClassifyResult<Classification> {
        self.rate_limiter.until_ready().await;

        let request = self.build_request(text);
        let response = self
            .client
            .post(GROQ_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Unavailable(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ClassifyError::RateLimited {
                retry_after_ms: retry_after * 1000,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Unavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Unavailable(e.to_string()))?;
        Self::parse_response(chat_response)
    }
}

/// Stands in when AI moderation is disabled. The pipeline checks
/// `is_enabled` and never calls `classify`; the error is a safety net.
pub struct DisabledClassifier;

#[async_trait]
impl SemanticClassifier for DisabledClassifier {
    async fn classify(&self, _text: &str) -> ClassifyResult<Classification> {
        Err(ClassifyError::Unavailable("AI moderation disabled".to_string()))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Extract JSON from text that may be wrapped in markdown code blocks.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

// ============================================================================
// Groq API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
