use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ChatMessage, Completion, CompletionProvider, ExtractedEntity, LlmError, estimate_tokens};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    /// Model or deployment name sent as the `model` field.
    pub deployment: String,
    /// Appended as `api-version` query parameter when set (Azure-style
    /// endpoints require it; plain OpenAI-compatible servers ignore it).
    pub api_version: Option<String>,
}

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self { client: Client::new(), config }
    }

    async fn chat(&self, messages: Vec<OpenAiMessage>) -> Result<OpenAiResponse, LlmError> {
        let body = OpenAiRequest {
            model: self.config.deployment.clone(),
            messages,
            stream: false,
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/')))
            .header("Content-Type", "application/json")
            .json(&body);

        if let Some(version) = &self.config.api_version {
            req = req.query(&[("api-version", version.as_str())]);
        }
        if !self.config.api_key.is_empty() {
            req = req.header("Authorization", format!("Bearer {}", self.config.api_key));
        }

        let resp = req.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message: text });
        }

        Ok(resp.json().await?)
    }

    async fn single_turn(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let resp = self
            .chat(vec![
                OpenAiMessage { role: "system".into(), content: system.into() },
                OpenAiMessage { role: "user".into(), content: user.into() },
            ])
            .await?;

        resp.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("no choices in response".into()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, LlmError> {
        let wire: Vec<OpenAiMessage> = messages
            .iter()
            .map(|m| OpenAiMessage { role: m.role.clone(), content: m.content.clone() })
            .collect();

        let resp = self.chat(wire).await?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Malformed("no choices in response".into()))?;

        let total_tokens = resp
            .usage
            .map(|u| u.total_tokens)
            .unwrap_or_else(|| estimate_tokens(&content));

        Ok(Completion { content, total_tokens })
    }

    async fn classify_resume_intent(&self, message: &str) -> Result<bool, LlmError> {
        let reply = self
            .single_turn(
                "You label chat messages. Answer with exactly 'yes' if the message asks \
                 for a resume or CV to be sent, otherwise exactly 'no'.",
                message,
            )
            .await?;
        Ok(reply.trim().to_lowercase().starts_with("yes"))
    }

    async fn extract_entities(&self, message: &str) -> Result<Vec<ExtractedEntity>, LlmError> {
        let reply = self
            .single_turn(
                "Extract named entities from the message. Respond with only a JSON array \
                 of objects: [{\"type\": \"company|job|person|skill|location|other\", \
                 \"value\": \"...\", \"confidence\": 0.0}]. Respond with [] if there are none.",
                message,
            )
            .await?;
        Ok(parse_entity_json(&reply))
    }
}

/// Lenient parse of the extraction reply. Models wrap JSON in prose or
/// code fences often enough that we scan for the outermost array; anything
/// unparseable is zero entities.
pub fn parse_entity_json(reply: &str) -> Vec<ExtractedEntity> {
    let start = match reply.find('[') {
        Some(i) => i,
        None => {
            warn!("entity extraction reply had no JSON array");
            return vec![];
        }
    };
    let end = match reply.rfind(']') {
        Some(i) if i >= start => i,
        _ => {
            warn!("entity extraction reply had no closing bracket");
            return vec![];
        }
    };

    match serde_json::from_str::<Vec<ExtractedEntity>>(&reply[start..=end]) {
        Ok(entities) => entities
            .into_iter()
            .filter(|e| !e.value.trim().is_empty())
            .collect(),
        Err(e) => {
            warn!("malformed entity JSON from provider: {}", e);
            vec![]
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    total_tokens: i64,
}
