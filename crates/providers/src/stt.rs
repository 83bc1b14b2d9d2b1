//! HTTP speech-to-text client.
//!
//! Speaks the `/v1/audio/transcriptions` dialect (whisper-server, faster
//! whisper bridges, hosted endpoints). Audio capture and voice-activity
//! detection happen upstream of this boundary — the client only sees a
//! finished, encoded utterance.

use async_trait::async_trait;
use serde::Deserialize;
use sotto_core::error::ProviderError;
use sotto_core::provider::{SpeechToText, Transcript};
use tracing::debug;

/// A whisper-compatible transcription client.
pub struct HttpSpeechToText {
    name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl HttpSpeechToText {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            name: "whisper-server".into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
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

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        language_hint: Option<&str>,
    ) -> std::result::Result<Transcript, ProviderError> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        debug!(provider = %self.name, bytes = audio.len(), "Sending transcription request");

        let file_part = reqwest::multipart::Part::bytes(audio)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::UnsupportedInput(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            // verbose_json carries the detected language
            .text("response_format", "verbose_json");

        if let Some(lang) = language_hint {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
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
                // Unsupported codec / malformed audio is not retryable
                400 | 415 | 422 => ProviderError::UnsupportedInput(body),
                _ => ProviderError::ApiError {
                    status_code: status,
                    message: body,
                },
            });
        }

        let parsed: TranscriptionResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse transcription: {e}"),
            })?;

        Ok(Transcript {
            text: parsed.text.trim().to_string(),
            language: parsed.language,
        })
    }
}
