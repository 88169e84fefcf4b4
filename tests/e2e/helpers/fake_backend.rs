use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use survey_tts::domain::survey::LanguageTag;
use survey_tts::infrastructure::repositories::{SynthesisBackend, SynthesisError};

/// Text containing this marker fails synthesis.
pub const FAIL_MARKER: &str = "FAIL";
/// Text containing this marker takes [`SLOW_DELAY`] to synthesize.
pub const SLOW_MARKER: &str = "SLOW";
pub const SLOW_DELAY: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisCall {
    pub language: String,
    pub text: String,
}

/// In-process backend: audio is `RIFF` followed by the language and text, every call is recorded.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<SynthesisCall>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SynthesisCall> {
        self.calls.lock().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.text.clone()).collect()
    }
}

#[async_trait]
impl SynthesisBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn synthesize(
        &self,
        language: &LanguageTag,
        text: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        self.calls.lock().push(SynthesisCall {
            language: language.to_string(),
            text: text.to_string(),
        });

        if text.contains(SLOW_MARKER) {
            tokio::time::sleep(SLOW_DELAY).await;
        }
        if text.contains(FAIL_MARKER) {
            return Err(SynthesisError::EngineFailed {
                status: "exit status: 1".to_string(),
                stderr: format!("cannot speak {text:?}"),
            });
        }

        Ok(format!("RIFF{language}:{text}").into_bytes())
    }
}
