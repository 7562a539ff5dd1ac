use async_trait::async_trait;

use crate::{ChatMessage, Completion, CompletionProvider, ExtractedEntity, LlmError, estimate_tokens};

/// Stand-in provider used when no LLM key is configured, and in tests.
/// Deterministic: canned reply, keyword resume detection, no entities.
pub struct MockProvider;

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let content = format!(
            "Thanks for your message! This instance is running without a configured \
             language model, so I can't answer \"{}\" properly yet.",
            last_user
        );
        let total_tokens = estimate_tokens(&content);
        Ok(Completion { content, total_tokens })
    }

    async fn classify_resume_intent(&self, message: &str) -> Result<bool, LlmError> {
        let lower = message.to_lowercase();
        Ok(lower.contains("resume") || lower.contains(" cv") || lower.starts_with("cv"))
    }

    async fn extract_entities(&self, _message: &str) -> Result<Vec<ExtractedEntity>, LlmError> {
        Ok(vec![])
    }
}
