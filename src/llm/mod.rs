//! Language model backends
//!
//! Each backend normalizes its chat + function-calling response into a
//! [`ModelReply`]: plain text or a capability invocation.

mod anthropic;
mod ollama;
mod openai;

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;

pub use anthropic::AnthropicBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::Config;
use crate::context::ConversationHistory;
use crate::tools::{CapabilityDeclaration, CapabilityInvocation};
use crate::{Error, Result};

/// Persona instruction sent with every request
pub const SYSTEM_PROMPT: &str = "You are an AI System called Jarvix. Your job is to answer every \
question users ask you. Don't forget your name is Jarvix. If a user asks, tell them your name. \
You only speak English. Keep answers short, they will be spoken aloud.";

/// Configured backend identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// `OpenAI` chat completions
    #[default]
    Gpt,
    /// Anthropic messages
    Claude,
    /// Local Ollama runner
    Ollama,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GPT" | "OPENAI" => Ok(Self::Gpt),
            "CLAUDE" | "ANTHROPIC" => Ok(Self::Claude),
            "OLLAMA" => Ok(Self::Ollama),
            _ => Err(Error::UnsupportedBackend(s.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gpt => "GPT",
            Self::Claude => "CLAUDE",
            Self::Ollama => "OLLAMA",
        })
    }
}

/// Normalized model output
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// Text to speak as-is
    FinalText(String),
    /// Structured request to run a declared capability
    Invocation(CapabilityInvocation),
}

/// The selected language model backend
pub enum ModelBackend {
    OpenAi(OpenAiBackend),
    Anthropic(AnthropicBackend),
    Ollama(OllamaBackend),
}

impl ModelBackend {
    /// Build the backend selected in `config`
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedBackend` if the selected backend lacks its API key
    pub fn from_config(config: &Config) -> Result<Self> {
        let llm = &config.llm;
        let backend = match config.backend {
            BackendKind::Gpt => {
                let key = config.api_keys.openai.clone().ok_or_else(|| {
                    Error::UnsupportedBackend("GPT selected but OPENAI_API_KEY is not set".to_string())
                })?;
                Self::OpenAi(
                    OpenAiBackend::new(key, &llm.openai_model).with_base_url(&llm.openai_base_url),
                )
            }
            BackendKind::Claude => {
                let key = config.api_keys.anthropic.clone().ok_or_else(|| {
                    Error::UnsupportedBackend(
                        "CLAUDE selected but ANTHROPIC_API_KEY is not set".to_string(),
                    )
                })?;
                Self::Anthropic(
                    AnthropicBackend::new(key, &llm.anthropic_model)
                        .with_base_url(&llm.anthropic_base_url),
                )
            }
            BackendKind::Ollama => Self::Ollama(OllamaBackend::new(
                &llm.ollama_url,
                &llm.ollama_model,
                llm.word_limit,
            )),
        };

        tracing::info!(backend = %backend.kind(), model = backend.model(), "model backend selected");
        Ok(backend)
    }

    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::OpenAi(_) => BackendKind::Gpt,
            Self::Anthropic(_) => BackendKind::Claude,
            Self::Ollama(_) => BackendKind::Ollama,
        }
    }

    /// Model identifier in use
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi(b) => b.model(),
            Self::Anthropic(b) => b.model(),
            Self::Ollama(b) => b.model(),
        }
    }

    /// Whether prior turns are sent with each request
    #[must_use]
    pub const fn is_stateful(&self) -> bool {
        matches!(self, Self::Ollama(_))
    }

    /// Send `text` and get a normalized reply
    ///
    /// A tool call naming anything outside `capabilities` becomes a
    /// [`ModelReply::FinalText`] notice.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` or `MalformedResponse` on backend failure
    pub async fn process(
        &self,
        text: &str,
        history: &ConversationHistory,
        capabilities: &[CapabilityDeclaration],
    ) -> Result<ModelReply> {
        let reply = match self {
            Self::OpenAi(b) => b.complete(text, capabilities).await?,
            Self::Anthropic(b) => b.complete(text, capabilities).await?,
            Self::Ollama(b) => b.complete(text, history, capabilities).await?,
        };

        Ok(match reply {
            ModelReply::Invocation(invocation)
                if !capabilities.iter().any(|c| c.name == invocation.name) =>
            {
                tracing::warn!(function = %invocation.name, "model called an unknown function");
                ModelReply::FinalText(unknown_function(&invocation.name))
            }
            other => other,
        })
    }
}

/// Notice spoken when the model names an undeclared function
#[must_use]
pub fn unknown_function(name: &str) -> String {
    format!("Sorry, I tried to use an unknown function: {name}.")
}

/// Send a request and decode its JSON body
///
/// Transport errors and error statuses map to `BackendUnavailable`,
/// undecodable bodies to `MalformedResponse`.
async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder, backend: &str) -> Result<T> {
    let response = request.send().await.map_err(|e| {
        tracing::error!(backend, error = %e, "model request failed");
        Error::BackendUnavailable(format!("{backend}: {e}"))
    })?;

    let status = response.status();
    tracing::debug!(backend, status = %status, "received response");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(backend, status = %status, body = %body, "model API error");
        return Err(Error::BackendUnavailable(format!("{backend} returned {status}: {body}")));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::BackendUnavailable(format!("{backend}: {e}")))?;

    serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(backend, error = %e, "failed to parse model response");
        Error::MalformedResponse(format!("{backend}: {e}"))
    })
}

/// Capability schemas in the `OpenAI` tool shape (also used by Ollama)
fn openai_tools(capabilities: &[CapabilityDeclaration]) -> Vec<serde_json::Value> {
    capabilities
        .iter()
        .map(|c| {
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": c.name,
                    "description": c.description,
                    "parameters": c.parameters,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_is_case_insensitive() {
        assert_eq!("gpt".parse::<BackendKind>().unwrap(), BackendKind::Gpt);
        assert_eq!("Claude".parse::<BackendKind>().unwrap(), BackendKind::Claude);
        assert_eq!(" OLLAMA ".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(matches!(
            "gemini".parse::<BackendKind>(),
            Err(Error::UnsupportedBackend(name)) if name == "gemini"
        ));
    }

    #[test]
    fn openai_tool_shape() {
        let decl = CapabilityDeclaration {
            name: "x".to_string(),
            description: "does x".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let tools = openai_tools(&[decl]);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "x");
        assert_eq!(tools[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn unknown_function_notice_names_the_function() {
        let notice = unknown_function("launch_rockets");
        assert!(notice.contains("unknown function"));
        assert!(notice.contains("launch_rockets"));
    }
}
