use super::synthesis_backend::{SynthesisBackend, SynthesisError};
use crate::domain::survey::LanguageTag;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Keep the tail of stderr in errors, Piper logs a lot on failure.
const STDERR_TAIL: usize = 500;

/// Voice model and its JSON config for one language.
#[derive(Debug, Clone, PartialEq)]
pub struct PiperVoice {
    pub model: PathBuf,
    pub config: PathBuf,
}

impl PiperVoice {
    /// Piper ships `<model>.onnx.json` next to each model.
    pub fn from_model(model: PathBuf) -> Self {
        let mut config = model.clone().into_os_string();
        config.push(".json");
        Self {
            model,
            config: PathBuf::from(config),
        }
    }
}

/// Local Piper engine: one process per unit, text on stdin, WAV written to a temp file.
pub struct PiperSynthesisBackend {
    executable: PathBuf,
    leading_args: Vec<String>,
    voices: HashMap<LanguageTag, PiperVoice>,
}

impl PiperSynthesisBackend {
    pub fn new(
        executable: PathBuf,
        leading_args: Vec<String>,
        voices: HashMap<LanguageTag, PiperVoice>,
    ) -> Self {
        Self {
            executable,
            leading_args,
            voices,
        }
    }

    fn voice_for(&self, language: &LanguageTag) -> Result<&PiperVoice, SynthesisError> {
        self.voices
            .get(language)
            .ok_or_else(|| SynthesisError::UnsupportedLanguage(language.to_string()))
    }
}

#[async_trait]
impl SynthesisBackend for PiperSynthesisBackend {
    fn name(&self) -> &'static str {
        "piper"
    }

    async fn synthesize(
        &self,
        language: &LanguageTag,
        text: &str,
    ) -> Result<Vec<u8>, SynthesisError> {
        let start_time = std::time::Instant::now();
        let voice = self.voice_for(language)?;

        // Removed on drop, including when the run is cancelled mid-synthesis.
        let output = tempfile::Builder::new()
            .prefix("piper-")
            .suffix(".wav")
            .tempfile()?;

        tracing::debug!(
            language = %language,
            model = %voice.model.display(),
            text_length = text.len(),
            "Starting Piper synthesis"
        );

        let mut child = Command::new(&self.executable)
            .args(&self.leading_args)
            .arg("--model")
            .arg(&voice.model)
            .arg("--config")
            .arg(&voice.config)
            .arg("--output_file")
            .arg(output.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(SynthesisError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            // An engine that dies early closes its stdin; the exit status below reports why.
            if let Err(e) = stdin.write_all(text.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL);
            let tail = stderr
                .get(tail_start..)
                .unwrap_or(stderr.as_ref())
                .trim()
                .to_string();
            tracing::error!(
                language = %language,
                status = %result.status,
                stderr = %tail,
                "Piper synthesis failed"
            );
            return Err(SynthesisError::EngineFailed {
                status: result.status.to_string(),
                stderr: tail,
            });
        }

        let audio = tokio::fs::read(output.path()).await?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        tracing::info!(
            provider = "piper",
            language = %language,
            latency_ms = start_time.elapsed().as_millis(),
            characters_count = text.chars().count(),
            audio_size_bytes = audio.len(),
            "TTS synthesis completed"
        );

        Ok(audio)
    }
}
