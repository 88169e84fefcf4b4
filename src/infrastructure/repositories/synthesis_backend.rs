use crate::domain::survey::LanguageTag;
use async_trait::async_trait;

/// Failure of a single synthesis call. Every variant is a hard failure for that unit.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("no voice configured for language {0}")]
    UnsupportedLanguage(String),
    #[error("unknown voice {0}")]
    UnknownVoice(String),
    #[error("failed to start synthesis engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("synthesis engine exited with {status}: {stderr}")]
    EngineFailed { status: String, stderr: String },
    #[error("synthesis produced no audio")]
    EmptyAudio,
    #[error("text too long for backend ({length} > {limit} characters)")]
    TextTooLong { length: usize, limit: usize },
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthesisError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SynthesisError::Network(_) | SynthesisError::Api(_))
    }
}

/// Speech synthesis capability used by the asset pipeline.
///
/// Abstracts the engine (local Piper process, OpenAI API). Implementations are responsible for:
/// - Provider-specific voice selection per language
/// - Provider-specific limits (text length, rate limits, retries)
/// - Returning a complete audio file (WAV), never a partial one
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Short provider name for logs and reports
    fn name(&self) -> &'static str;

    /// File extension of the audio this backend returns
    fn audio_extension(&self) -> &'static str {
        "wav"
    }

    /// Synthesize cleaned text for a language
    ///
    /// # Arguments
    /// * `language` - Language column the text came from; selects the voice
    /// * `text` - Synthesis text (markup stripped, whitespace normalized)
    async fn synthesize(&self, language: &LanguageTag, text: &str)
        -> Result<Vec<u8>, SynthesisError>;
}
