use super::synthesis_backend::{SynthesisBackend, SynthesisError};
use crate::domain::survey::LanguageTag;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateSpeechRequest, SpeechModel, SpeechResponseFormat, Voice},
    Client,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// OpenAI has a limit of 4096 characters per request
const MAX_INPUT_CHARS: usize = 4096;

/// Voice names the speech endpoint accepts
pub const VOICE_NAMES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// Map a configured voice name onto the API enum, `None` for names the API does not know.
pub fn parse_voice(name: &str) -> Option<Voice> {
    match name.trim().to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

/// Retry and rate-limit settings for the remote API
#[derive(Debug, Clone)]
pub struct RemoteLimits {
    pub max_in_flight: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RemoteLimits {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// OpenAI TTS implementation of the synthesis backend
pub struct OpenAiSynthesisBackend {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    default_voice: String,
    voices: HashMap<LanguageTag, String>,
    limits: RemoteLimits,
    permits: Arc<Semaphore>,
}

impl OpenAiSynthesisBackend {
    pub fn new(
        client: Arc<Client<OpenAIConfig>>,
        model: String,
        default_voice: String,
        voices: HashMap<LanguageTag, String>,
        limits: RemoteLimits,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(limits.max_in_flight.max(1)));
        Self {
            client,
            model,
            default_voice,
            voices,
            limits,
            permits,
        }
    }

    /// Build a client from an API key
    pub fn client_for_key(api_key: &str) -> Arc<Client<OpenAIConfig>> {
        Arc::new(Client::with_config(
            OpenAIConfig::new().with_api_key(api_key),
        ))
    }

    fn voice_for_language(&self, language: &LanguageTag) -> &str {
        self.voices
            .get(language)
            .map(String::as_str)
            .unwrap_or(&self.default_voice)
    }

    fn speech_model(&self) -> SpeechModel {
        match self.model.as_str() {
            "tts-1" => SpeechModel::Tts1,
            "tts-1-hd" => SpeechModel::Tts1Hd,
            other => SpeechModel::Other(other.to_string()),
        }
    }

    /// Call OpenAI TTS API once
    async fn call_openai(&self, text: &str, voice: &str) -> Result<Vec<u8>, SynthesisError> {
        let voice_enum =
            parse_voice(voice).ok_or_else(|| SynthesisError::UnknownVoice(voice.to_string()))?;

        let request = CreateSpeechRequest {
            model: self.speech_model(),
            input: text.to_string(),
            voice: voice_enum,
            response_format: Some(SpeechResponseFormat::Wav),
            speed: None,
        };

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(classify_error)?;

        let audio_bytes = response.bytes.to_vec();
        if audio_bytes.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }
        Ok(audio_bytes)
    }
}

/// Split OpenAI failures into retryable and final kinds
fn classify_error(err: OpenAIError) -> SynthesisError {
    match err {
        OpenAIError::Reqwest(e) => SynthesisError::Network(e.to_string()),
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.as_deref().unwrap_or_default();
            let message = api.message.to_lowercase();
            if kind == "authentication_error"
                || (kind == "invalid_request_error" && message.contains("api key"))
            {
                SynthesisError::Auth(api.message)
            } else {
                SynthesisError::Api(api.message)
            }
        }
        other => SynthesisError::Api(other.to_string()),
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

#[async_trait]
impl SynthesisBackend for OpenAiSynthesisBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(
        &self,
        language: &LanguageTag,
        text: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        let length = text.chars().count();
        if length > MAX_INPUT_CHARS {
            return Err(SynthesisError::TextTooLong {
                length,
                limit: MAX_INPUT_CHARS,
            });
        }

        let voice = self.voice_for_language(language).to_string();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| SynthesisError::Api(e.to_string()))?;

        let start_time = std::time::Instant::now();
        let mut attempt = 1;
        loop {
            tracing::info!(
                language = %language,
                voice = %voice,
                model = %self.model,
                text_length = text.len(),
                attempt,
                "Calling OpenAI TTS API"
            );

            match self.call_openai(text, &voice).await {
                Ok(audio_data) => {
                    tracing::info!(
                        provider = "openai",
                        model = %self.model,
                        voice = %voice,
                        latency_ms = start_time.elapsed().as_millis(),
                        characters_count = length,
                        audio_size_bytes = audio_data.len(),
                        attempts = attempt,
                        "TTS synthesis completed"
                    );
                    return Ok(audio_data);
                }
                Err(e) if e.is_transient() && attempt < self.limits.max_attempts => {
                    let wait = backoff_delay(self.limits.backoff_base, attempt);
                    tracing::warn!(
                        error = %e,
                        attempt,
                        wait_ms = wait.as_millis(),
                        "OpenAI TTS call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        model = %self.model,
                        voice = %voice,
                        text_length = text.len(),
                        attempts = attempt,
                        "OpenAI TTS API call failed"
                    );
                    return Err(e);
                }
            }
        }
    }
}
