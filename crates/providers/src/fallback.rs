//! Degraded-configuration fallback for the language model.
//!
//! When the primary model signals resource exhaustion (out of memory,
//! context window overflow, overloaded local server), one attempt is made
//! with a reduced configuration — a smaller model and/or a tighter token
//! budget — before the error is surfaced. All other failures pass through
//! untouched so the retry layer can handle them.

use async_trait::async_trait;
use sotto_core::error::{Classify, ErrorClass, ProviderError};
use sotto_core::provider::{ChatRequest, ChatResponse, LanguageModel, StreamChunk};
use std::sync::Arc;
use tracing::{info, warn};

/// A language model that downgrades the request once on resource exhaustion.
pub struct FallbackModel {
    primary: Arc<dyn LanguageModel>,
    degraded_model: String,
    degraded_max_tokens: Option<u32>,
}

impl FallbackModel {
    /// Wrap `primary`, falling back to `degraded_model` on capacity errors.
    pub fn new(primary: Arc<dyn LanguageModel>, degraded_model: impl Into<String>) -> Self {
        Self {
            primary,
            degraded_model: degraded_model.into(),
            degraded_max_tokens: None,
        }
    }

    /// Also cap max_tokens in the degraded request.
    pub fn with_degraded_max_tokens(mut self, max: u32) -> Self {
        self.degraded_max_tokens = Some(max);
        self
    }

    fn degrade(&self, request: &ChatRequest) -> ChatRequest {
        let mut degraded = request.clone();
        degraded.model = self.degraded_model.clone();
        if let Some(max) = self.degraded_max_tokens {
            degraded.max_tokens = Some(degraded.max_tokens.map_or(max, |m| m.min(max)));
        }
        degraded
    }
}

#[async_trait]
impl LanguageModel for FallbackModel {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn complete(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<ChatResponse, ProviderError> {
        match self.primary.complete(request.clone()).await {
            Ok(response) => Ok(response),
            Err(e) if e.classify() == ErrorClass::ResourceExhausted => {
                warn!(
                    error = %e,
                    degraded_model = %self.degraded_model,
                    "Primary model out of capacity, trying degraded configuration"
                );
                let response = self.primary.complete(self.degrade(&request)).await?;
                info!(model = %response.model, "Degraded completion succeeded");
                Ok(response)
            }
            Err(e) => Err(e),
        }
    }

    async fn stream(
        &self,
        request: ChatRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        match self.primary.stream(request.clone()).await {
            Ok(rx) => Ok(rx),
            Err(e) if e.classify() == ErrorClass::ResourceExhausted => {
                warn!(
                    error = %e,
                    degraded_model = %self.degraded_model,
                    "Primary model out of capacity, streaming degraded configuration"
                );
                self.primary.stream(self.degrade(&request)).await
            }
            Err(e) => Err(e),
        }
    }
}
