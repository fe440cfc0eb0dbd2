//! Configuration management for Jarvix
//!
//! Produces one immutable [`Config`] from environment variables, the optional
//! TOML file and built-in defaults (env > toml > default).

pub mod file;

use std::time::Duration;

use crate::llm::BackendKind;
use crate::Result;

/// Default Home Assistant address
const DEFAULT_HOME_URL: &str = "http://localhost:8123";

/// Default Ollama address
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Jarvix configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected language model backend
    pub backend: BackendKind,

    /// Language model settings
    pub llm: LlmConfig,

    /// Voice processing settings
    pub voice: VoiceConfig,

    /// Home Assistant bridge, `None` when not configured
    pub home: Option<HomeConfig>,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// `OpenAI` chat model
    pub openai_model: String,

    /// `OpenAI` API base URL
    pub openai_base_url: String,

    /// Anthropic model
    pub anthropic_model: String,

    /// Anthropic API base URL
    pub anthropic_base_url: String,

    /// Ollama model tag
    pub ollama_model: String,

    /// Ollama server URL
    pub ollama_url: String,

    /// Reply length hint for the local model, in words
    pub word_limit: usize,

    /// Conversation history budget, in words
    pub max_history_tokens: usize,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable the voice loop
    pub enabled: bool,

    /// Wake phrase
    pub wake_word: String,

    /// STT model for Whisper
    pub stt_model: String,

    /// TTS model
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// Recording end-pointing
    pub recording: RecordingConfig,
}

/// Silence-based end-pointing parameters for utterance recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingConfig {
    /// RMS amplitude below which a chunk counts as silence
    pub silence_threshold: f32,

    /// Trailing silence that ends the recording
    pub trailing_silence: Duration,

    /// Recordings never stop before this
    pub min_duration: Duration,

    /// Recordings always stop at this
    pub max_duration: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            silence_threshold: 0.02,
            trailing_silence: Duration::from_millis(1300),
            min_duration: Duration::from_secs(1),
            max_duration: Duration::from_secs(30),
        }
    }
}

/// Home Assistant configuration
#[derive(Debug, Clone)]
pub struct HomeConfig {
    /// Base URL, without trailing slash
    pub base_url: String,

    /// Long-lived access token
    pub access_token: Option<String>,

    /// OAuth refresh token
    pub refresh_token: Option<String>,

    /// Command used to launch Home Assistant when it is down
    pub launch_command: Vec<String>,

    /// Overall wait for the server to come up
    pub startup_timeout: Duration,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (chat, Whisper and TTS)
    pub openai: Option<String>,

    /// `Anthropic` API key
    pub anthropic: Option<String>,
}

impl Config {
    /// Load configuration
    ///
    /// # Errors
    ///
    /// Returns error if the selected backend is not recognised
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if the selected backend is not recognised
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let fc = file::load_config_file();

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            anthropic: env("ANTHROPIC_API_KEY").or(fc.api_keys.anthropic),
        };

        // SELECTED_MODEL is the historical name for the backend switch
        let backend = env("SELECTED_MODEL")
            .or_else(|| env("JARVIX_BACKEND"))
            .or(fc.llm.backend)
            .map_or(Ok(BackendKind::Gpt), |s| s.parse())?;

        let llm = LlmConfig {
            openai_model: env("JARVIX_OPENAI_MODEL")
                .or(fc.llm.openai_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_base_url: env("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            anthropic_model: env("JARVIX_ANTHROPIC_MODEL")
                .or(fc.llm.anthropic_model)
                .unwrap_or_else(|| "claude-3-haiku-20240307".to_string()),
            anthropic_base_url: env("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            ollama_model: env("OLLAMA_MODEL")
                .or(fc.llm.ollama_model)
                .unwrap_or_else(|| "llama3.1".to_string()),
            ollama_url: env("OLLAMA_HOST")
                .or(fc.llm.ollama_url)
                .map_or_else(|| DEFAULT_OLLAMA_URL.to_string(), |u| normalize_url(&u)),
            word_limit: env("JARVIX_WORD_LIMIT")
                .and_then(|s| s.parse().ok())
                .or(fc.llm.word_limit)
                .unwrap_or(100),
            max_history_tokens: env("JARVIX_MAX_HISTORY_TOKENS")
                .and_then(|s| s.parse().ok())
                .or(fc.llm.max_history_tokens)
                .unwrap_or(4000),
        };

        let defaults = RecordingConfig::default();
        let recording = RecordingConfig {
            silence_threshold: fc
                .voice
                .silence_threshold
                .unwrap_or(defaults.silence_threshold),
            trailing_silence: fc
                .voice
                .trailing_silence_ms
                .map_or(defaults.trailing_silence, Duration::from_millis),
            min_duration: fc
                .voice
                .min_duration_ms
                .map_or(defaults.min_duration, Duration::from_millis),
            max_duration: fc
                .voice
                .max_duration_ms
                .map_or(defaults.max_duration, Duration::from_millis),
        };

        let voice_enabled = !disable_voice && fc.voice.enabled.unwrap_or(true);
        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
        }

        let voice = VoiceConfig {
            enabled: voice_enabled,
            wake_word: env("JARVIX_WAKE_WORD")
                .or(fc.voice.wake_word)
                .unwrap_or_else(|| "hey jarvix".to_string()),
            stt_model: env("JARVIX_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
            tts_model: env("JARVIX_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or_else(|| "tts-1".to_string()),
            tts_voice: env("JARVIX_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or_else(|| "nova".to_string()),
            tts_speed: fc.voice.tts_speed.unwrap_or(1.0),
            recording,
        };

        let home = Self::load_home_config(fc.home);

        Ok(Self {
            backend,
            llm,
            voice,
            home,
            api_keys,
        })
    }

    /// Resolve the Home Assistant section
    ///
    /// Enabled explicitly, or implicitly when any credential is present
    fn load_home_config(fc: file::HomeFileConfig) -> Option<HomeConfig> {
        let access_token = env("HA_TOKEN").or(fc.token);
        let refresh_token = env("HA_REFRESH_TOKEN").or(fc.refresh_token);

        let enabled = env("IS_HA_CONFIGURED")
            .map(|v| parse_bool(&v))
            .or(fc.enabled)
            .unwrap_or(access_token.is_some() || refresh_token.is_some());

        if !enabled {
            tracing::debug!("home assistant bridge not configured");
            return None;
        }

        // INTERNAL_URL holds a bare host:port
        let base_url = env("HA_URL")
            .or(fc.url)
            .or_else(|| env("INTERNAL_URL").map(|host| format!("http://{host}")))
            .map_or_else(|| DEFAULT_HOME_URL.to_string(), |u| normalize_url(&u));

        let launch_command = fc
            .launch_command
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| vec!["hass".to_string()]);

        Some(HomeConfig {
            base_url,
            access_token,
            refresh_token,
            launch_command,
            startup_timeout: Duration::from_secs(fc.startup_timeout_secs.unwrap_or(60)),
        })
    }
}

/// Read a non-empty environment variable
fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Interpret common truthy spellings
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Strip trailing slashes and add a scheme when missing
fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_truthy_values() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(parse_bool(" yes "));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn normalize_url_adds_scheme_and_strips_slash() {
        assert_eq!(normalize_url("localhost:8123"), "http://localhost:8123");
        assert_eq!(normalize_url("http://ha.local:8123/"), "http://ha.local:8123");
        assert_eq!(normalize_url("https://ha.example.com"), "https://ha.example.com");
    }

    #[test]
    fn home_config_disabled_without_credentials() {
        let fc = file::HomeFileConfig {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(Config::load_home_config(fc).is_none());
    }

    #[test]
    fn home_config_uses_file_values() {
        let fc = file::HomeFileConfig {
            enabled: Some(true),
            url: Some("ha.local:8123/".to_string()),
            launch_command: Some(vec![]),
            startup_timeout_secs: Some(30),
            ..Default::default()
        };
        let home = Config::load_home_config(fc).unwrap();
        assert!(home.base_url.ends_with("8123"));
        assert_eq!(home.launch_command, vec!["hass"]);
        assert_eq!(home.startup_timeout, Duration::from_secs(30));
    }

    #[test]
    fn recording_defaults_match_endpointing_policy() {
        let rec = RecordingConfig::default();
        assert_eq!(rec.min_duration, Duration::from_secs(1));
        assert_eq!(rec.max_duration, Duration::from_secs(30));
        assert_eq!(rec.trailing_silence, Duration::from_millis(1300));
    }
}
