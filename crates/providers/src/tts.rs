//! HTTP text-to-speech client.
//!
//! Speaks the `/v1/audio/speech` dialect (local piper/kokoro bridges,
//! hosted endpoints). Called once per finalized reply, or once per streamed
//! utterance unit when the engine is streaming.

use async_trait::async_trait;
use sotto_core::error::ProviderError;
use sotto_core::provider::SpeechSynthesis;
use tracing::debug;

/// A speech-synthesis client for OpenAI-compatible speech endpoints.
pub struct HttpSpeechSynthesis {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    client: reqwest::Client,
}

impl HttpSpeechSynthesis {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "speech-server".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            voice: voice.into(),
            client,
        }
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }
}

#[async_trait]
impl SpeechSynthesis for HttpSpeechSynthesis {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, text: &str) -> std::result::Result<Vec<u8>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::UnsupportedInput(
                "Refusing to synthesize empty text".into(),
            ));
        }

        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
            "input": text,
        });

        debug!(provider = %self.name, chars = text.len(), "Sending synthesis request");

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                429 => ProviderError::RateLimited { retry_after_secs: 5 },
                401 | 403 => ProviderError::AuthenticationFailed(body),
                400 | 422 => ProviderError::UnsupportedInput(body),
                _ => ProviderError::ApiError {
                    status_code: status,
                    message: body,
                },
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::StreamInterrupted(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}
