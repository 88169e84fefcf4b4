use crate::domain::survey::{CollisionPolicy, FailurePolicy, LanguageTag, PipelineOptions};
use crate::infrastructure::repositories::openai_synthesis_backend::{parse_voice, VOICE_NAMES};
use crate::infrastructure::repositories::{
    OpenAiSynthesisBackend, PiperSynthesisBackend, PiperVoice, RemoteLimits, SynthesisBackend,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    // Hosting
    pub hosting_root: PathBuf,
    pub public_base_url: Url,
    // Pipeline
    pub supported_languages: Vec<LanguageTag>,
    pub synthesis_concurrency: usize,
    pub failure_policy: FailurePolicy,
    pub collision_policy: CollisionPolicy,
    pub prune_stale_artifacts: bool,
    // Synthesis backends
    pub backend: BackendKind,
    pub piper: PiperSettings,
    pub openai: OpenAiSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Piper subprocess on this host
    Local,
    /// OpenAI speech API
    Remote,
}

#[derive(Debug, Clone)]
pub struct PiperSettings {
    pub executable: PathBuf,
    pub leading_args: Vec<String>,
    pub voices: HashMap<LanguageTag, PiperVoice>,
}

#[derive(Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub voices: HashMap<LanguageTag, String>,
    pub limits: RemoteLimits,
}

impl std::fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("voices", &self.voices)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let supported_languages = parse_languages(&var("SUPPORTED_LANGUAGES", "da,en"))?;

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .ok_or_else(|| ConfigError::Missing("PUBLIC_BASE_URL".to_string()))?;
        let public_base_url = Url::parse(public_base_url.trim())
            .map_err(|e| invalid("PUBLIC_BASE_URL", &public_base_url, e))?;

        let mut piper_voices = HashMap::new();
        let mut openai_voices = HashMap::new();
        for language in &supported_languages {
            let suffix = language.env_suffix();
            if let Some(model) = lookup(&format!("PIPER_MODEL_{suffix}")) {
                let mut voice = PiperVoice::from_model(PathBuf::from(model));
                if let Some(config) = lookup(&format!("PIPER_CONFIG_{suffix}")) {
                    voice.config = PathBuf::from(config);
                }
                piper_voices.insert(language.clone(), voice);
            }
            if let Some(voice) = lookup(&format!("OPENAI_TTS_VOICE_{suffix}")) {
                openai_voices.insert(language.clone(), voice);
            }
        }

        let config = Config {
            host: var("HOST", "0.0.0.0"),
            port: parse_number("PORT", &var("PORT", "8080"))?,
            environment: match var("ENVIRONMENT", "development").as_str() {
                "production" => Environment::Production,
                _ => Environment::Development,
            },
            log_format: match var("LOG_FORMAT", "pretty").as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            hosting_root: PathBuf::from(var("HOSTING_ROOT", "docs")),
            public_base_url,
            supported_languages,
            synthesis_concurrency: parse_number(
                "SYNTHESIS_CONCURRENCY",
                &var("SYNTHESIS_CONCURRENCY", "1"),
            )?,
            failure_policy: match var("SYNTHESIS_FAILURE_POLICY", "fail_fast").as_str() {
                "fail_fast" => FailurePolicy::FailFast,
                "continue" => FailurePolicy::Continue,
                other => {
                    return Err(invalid(
                        "SYNTHESIS_FAILURE_POLICY",
                        other,
                        "expected fail_fast or continue",
                    ))
                }
            },
            collision_policy: match var("KEY_COLLISION_POLICY", "last_write_wins").as_str() {
                "last_write_wins" => CollisionPolicy::LastWriteWins,
                "reject" => CollisionPolicy::Reject,
                other => {
                    return Err(invalid(
                        "KEY_COLLISION_POLICY",
                        other,
                        "expected last_write_wins or reject",
                    ))
                }
            },
            prune_stale_artifacts: parse_flag(
                "PRUNE_STALE_ARTIFACTS",
                &var("PRUNE_STALE_ARTIFACTS", "true"),
            )?,
            backend: match var("TTS_BACKEND", "local").as_str() {
                "local" => BackendKind::Local,
                "remote" => BackendKind::Remote,
                other => return Err(invalid("TTS_BACKEND", other, "expected local or remote")),
            },
            piper: PiperSettings {
                executable: PathBuf::from(var("PIPER_BIN", "piper")),
                leading_args: var("PIPER_ARGS", "")
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                voices: piper_voices,
            },
            openai: OpenAiSettings {
                api_key: lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty()),
                model: var("OPENAI_TTS_MODEL", "tts-1"),
                voice: var("OPENAI_TTS_VOICE", "alloy"),
                voices: openai_voices,
                limits: RemoteLimits {
                    max_in_flight: parse_number(
                        "OPENAI_MAX_IN_FLIGHT",
                        &var("OPENAI_MAX_IN_FLIGHT", "4"),
                    )?,
                    max_attempts: parse_number(
                        "OPENAI_MAX_ATTEMPTS",
                        &var("OPENAI_MAX_ATTEMPTS", "3"),
                    )?,
                    backoff_base: Duration::from_millis(parse_number(
                        "OPENAI_BACKOFF_MS",
                        &var("OPENAI_BACKOFF_MS", "500"),
                    )?),
                },
            },
        };

        Ok(config)
    }

    /// Cross-field checks that parsing alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.public_base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "PUBLIC_BASE_URL must be an http(s) URL, got {}",
                self.public_base_url
            )));
        }
        if self.synthesis_concurrency == 0 {
            return Err(ConfigError::Validation(
                "SYNTHESIS_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        match self.backend {
            BackendKind::Local => {
                let missing: Vec<String> = self
                    .supported_languages
                    .iter()
                    .filter(|language| !self.piper.voices.contains_key(*language))
                    .map(|language| format!("PIPER_MODEL_{}", language.env_suffix()))
                    .collect();
                if !missing.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "local backend needs a voice model per language, missing {}",
                        missing.join(", ")
                    )));
                }
            }
            BackendKind::Remote => {
                if self.openai.api_key.is_none() {
                    return Err(ConfigError::Missing("OPENAI_API_KEY".to_string()));
                }
                let configured = std::iter::once(("OPENAI_TTS_VOICE".to_string(), &self.openai.voice))
                    .chain(self.openai.voices.iter().map(|(language, voice)| {
                        (format!("OPENAI_TTS_VOICE_{}", language.env_suffix()), voice)
                    }));
                for (name, voice) in configured {
                    if parse_voice(voice).is_none() {
                        return Err(invalid(
                            &name,
                            voice,
                            format!("expected one of {}", VOICE_NAMES.join(", ")),
                        ));
                    }
                }
                if self.openai.limits.max_in_flight == 0 || self.openai.limits.max_attempts == 0 {
                    return Err(ConfigError::Validation(
                        "OPENAI_MAX_IN_FLIGHT and OPENAI_MAX_ATTEMPTS must be at least 1"
                            .to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Development builds log at debug level unless `RUST_LOG` says otherwise.
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            languages: self.supported_languages.clone(),
            concurrency: self.synthesis_concurrency,
            failure_policy: self.failure_policy,
            collision_policy: self.collision_policy,
            prune_stale_artifacts: self.prune_stale_artifacts,
        }
    }

    /// The backend for this process. Selected once at startup.
    pub fn synthesis_backend(&self) -> Result<Arc<dyn SynthesisBackend>, ConfigError> {
        let backend: Arc<dyn SynthesisBackend> = match self.backend {
            BackendKind::Local => Arc::new(PiperSynthesisBackend::new(
                self.piper.executable.clone(),
                self.piper.leading_args.clone(),
                self.piper.voices.clone(),
            )),
            BackendKind::Remote => {
                let api_key = self
                    .openai
                    .api_key
                    .as_deref()
                    .ok_or_else(|| ConfigError::Missing("OPENAI_API_KEY".to_string()))?;
                Arc::new(OpenAiSynthesisBackend::new(
                    OpenAiSynthesisBackend::client_for_key(api_key),
                    self.openai.model.clone(),
                    self.openai.voice.clone(),
                    self.openai.voices.clone(),
                    self.openai.limits.clone(),
                ))
            }
        };
        Ok(backend)
    }
}

fn invalid(name: &str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| invalid(name, value, e))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(name, value, "expected true or false")),
    }
}

fn parse_languages(value: &str) -> Result<Vec<LanguageTag>, ConfigError> {
    let mut languages: Vec<LanguageTag> = Vec::new();
    for raw in value.split(',').filter(|raw| !raw.trim().is_empty()) {
        let language = LanguageTag::parse(raw)
            .ok_or_else(|| invalid("SUPPORTED_LANGUAGES", raw, "not a language tag"))?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }
    if languages.is_empty() {
        return Err(invalid("SUPPORTED_LANGUAGES", value, "no languages listed"));
    }
    Ok(languages)
}
