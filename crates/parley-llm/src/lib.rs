pub mod mock;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed user-facing reply when the completion provider fails. Provider
/// error detail goes to the logs, never to the visitor.
pub const APOLOGY_REPLY: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again in a moment.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub total_tokens: i64,
}

/// Entity candidate as returned by the extraction call. Type is kept as a
/// raw string here; the API layer maps unknown types to `other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Seam between the chat handler and the hosted LLM. The mock
/// implementation keeps the service usable with no API key configured.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Primary chat completion over the assembled message list.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, LlmError>;

    /// Single-label classification: does this message ask for a resume?
    async fn classify_resume_intent(&self, message: &str) -> Result<bool, LlmError>;

    /// Best-effort named-entity extraction. Malformed provider output is
    /// treated as zero entities, not an error.
    async fn extract_entities(&self, message: &str) -> Result<Vec<ExtractedEntity>, LlmError>;
}

/// Rough token estimate for providers that omit usage data (~4 chars per
/// token for English text).
pub fn estimate_tokens(text: &str) -> i64 {
    (text.len() as i64 / 4).max(1)
}
