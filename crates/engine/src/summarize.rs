//! Summarization strategy for context pruning.
//!
//! The context store takes the strategy as an optional object at
//! construction time and invokes it synchronously during `prune()`; absence
//! or failure degrades to plain discard.

use async_trait::async_trait;
use sotto_core::error::ProviderError;
use sotto_core::message::{Message, Role};
use sotto_core::provider::{ChatRequest, LanguageModel};
use std::sync::Arc;

/// Collapses a block of old messages into a short text summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message]) -> Result<String, ProviderError>;
}

/// Per-message content cap in the summary prompt; old messages only need to
/// contribute their gist.
const SNIPPET_CHARS: usize = 200;

/// A summarizer backed by the language-model provider.
pub struct ModelSummarizer {
    model: Arc<dyn LanguageModel>,
    model_name: String,
}

impl ModelSummarizer {
    pub fn new(model: Arc<dyn LanguageModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }

    fn build_prompt(messages: &[Message]) -> String {
        let mut prompt = String::from(
            "Summarize the following conversation in 2-3 sentences, \
             focusing on key topics and decisions:\n\n",
        );
        for msg in messages {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            };
            let snippet: String = msg.content.chars().take(SNIPPET_CHARS).collect();
            prompt.push_str(&format!("{role}: {snippet}\n"));
        }
        prompt.push_str("\nSummary:");
        prompt
    }
}

#[async_trait]
impl Summarizer for ModelSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String, ProviderError> {
        if messages.is_empty() {
            return Ok(String::new());
        }

        let mut request = ChatRequest::new(
            self.model_name.clone(),
            vec![Message::user(Self::build_prompt(messages))],
        );
        request.temperature = 0.3;
        request.max_tokens = Some(100);

        let response = self.model.complete(request).await?;
        Ok(response.message.content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sotto_core::provider::ChatResponse;

    struct EchoPromptModel;

    #[async_trait]
    impl LanguageModel for EchoPromptModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                message: Message::assistant(request.messages[0].content.clone()),
                usage: None,
                model: request.model,
            })
        }
    }

    #[test]
    fn prompt_contains_roles_and_truncated_content() {
        let long = "x".repeat(500);
        let messages = vec![Message::user(long), Message::assistant("short reply")];
        let prompt = ModelSummarizer::build_prompt(&messages);

        assert!(prompt.contains("user: "));
        assert!(prompt.contains("assistant: short reply"));
        assert!(prompt.ends_with("Summary:"));
        // The 500-char message was capped
        assert!(!prompt.contains(&"x".repeat(201)));
    }

    #[tokio::test]
    async fn summarize_sends_constrained_request() {
        let summarizer = ModelSummarizer::new(Arc::new(EchoPromptModel), "mini-model");
        let summary = summarizer
            .summarize(&[Message::user("let's talk about the weather")])
            .await
            .unwrap();

        assert!(summary.contains("weather"));
        assert!(summary.contains("Summarize the following conversation"));
    }

    #[tokio::test]
    async fn empty_block_summarizes_to_empty() {
        let summarizer = ModelSummarizer::new(Arc::new(EchoPromptModel), "mini-model");
        assert_eq!(summarizer.summarize(&[]).await.unwrap(), "");
    }
}
