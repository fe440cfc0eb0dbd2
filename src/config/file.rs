//! TOML configuration file loading
//!
//! Supports `~/.config/jarvix/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct JarvixConfigFile {
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Home Assistant bridge configuration
    #[serde(default)]
    pub home: HomeFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Language model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Selected backend ("gpt", "claude", "ollama")
    pub backend: Option<String>,

    /// `OpenAI` chat model (e.g. "gpt-4o-mini")
    pub openai_model: Option<String>,

    /// Anthropic model (e.g. "claude-3-haiku-20240307")
    pub anthropic_model: Option<String>,

    /// Ollama model tag (e.g. "llama3.1")
    pub ollama_model: Option<String>,

    /// Ollama server URL
    pub ollama_url: Option<String>,

    /// Reply length hint appended to local-model prompts
    pub word_limit: Option<usize>,

    /// Conversation history budget in words
    pub max_history_tokens: Option<usize>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable the voice loop
    pub enabled: Option<bool>,

    /// Wake phrase (e.g. "hey jarvix")
    pub wake_word: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "nova")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// RMS amplitude below which audio counts as silence
    pub silence_threshold: Option<f32>,

    /// Trailing silence that ends a recording, in milliseconds
    pub trailing_silence_ms: Option<u64>,

    /// Minimum recording length, in milliseconds
    pub min_duration_ms: Option<u64>,

    /// Maximum recording length, in milliseconds
    pub max_duration_ms: Option<u64>,
}

/// Home Assistant configuration
#[derive(Debug, Default, Deserialize)]
pub struct HomeFileConfig {
    /// Register the device control capability
    pub enabled: Option<bool>,

    /// Base URL of the Home Assistant instance
    pub url: Option<String>,

    /// Long-lived access token
    pub token: Option<String>,

    /// OAuth refresh token
    pub refresh_token: Option<String>,

    /// Command used to launch Home Assistant when it is not running
    pub launch_command: Option<Vec<String>>,

    /// Overall startup wait, in seconds
    pub startup_timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `JarvixConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> JarvixConfigFile {
    let Some(path) = config_file_path() else {
        return JarvixConfigFile::default();
    };

    if !path.exists() {
        return JarvixConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                JarvixConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            JarvixConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is invalid
pub fn parse_config_file(content: &str) -> crate::Result<JarvixConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/jarvix/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("jarvix").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let fc = parse_config_file("").unwrap();
        assert!(fc.llm.backend.is_none());
        assert!(fc.home.enabled.is_none());
        assert!(fc.voice.wake_word.is_none());
    }

    #[test]
    fn partial_overlay_parses() {
        let fc = parse_config_file(
            r#"
            [llm]
            backend = "ollama"
            ollama_model = "llama3.1"

            [home]
            enabled = true
            url = "http://ha.local:8123"
            launch_command = ["hass", "--config", "/srv/ha"]

            [voice]
            trailing_silence_ms = 900
            "#,
        )
        .unwrap();

        assert_eq!(fc.llm.backend.as_deref(), Some("ollama"));
        assert_eq!(fc.llm.ollama_model.as_deref(), Some("llama3.1"));
        assert_eq!(fc.home.enabled, Some(true));
        assert_eq!(
            fc.home.launch_command.unwrap(),
            vec!["hass", "--config", "/srv/ha"]
        );
        assert_eq!(fc.voice.trailing_silence_ms, Some(900));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(parse_config_file("[llm\nbackend =").is_err());
    }
}
