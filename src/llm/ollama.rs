//! Ollama local runner backend
//!
//! Stateful: the running history is sent with every request. The runner is
//! started and the model pulled once, before the first request.

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

use super::{ModelReply, SYSTEM_PROMPT, openai_tools, send_json};
use crate::context::ConversationHistory;
use crate::lifecycle::{BackendSupervisor, HttpProbe, LaunchCommand};
use crate::tools::{CapabilityDeclaration, CapabilityInvocation};
use crate::{Error, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Client for a local Ollama server
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    word_limit: usize,
    supervisor: BackendSupervisor,
    ready: OnceCell<()>,
}

impl OllamaBackend {
    /// Create a client for `model` served at `base_url`
    #[must_use]
    pub fn new(base_url: &str, model: &str, word_limit: usize) -> Self {
        let launch = LaunchCommand::from_argv(&["ollama".to_string(), "serve".to_string()]);
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            word_limit,
            supervisor: BackendSupervisor::new("ollama", launch),
            ready: OnceCell::new(),
        }
    }

    /// Replace the startup supervisor (polling policy, launch command)
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: BackendSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Start the runner and pull the model if needed; runs once
    ///
    /// A failed warm-up is retried on the next call.
    ///
    /// # Errors
    ///
    /// Returns `StartupTimeout` if the runner never answers, or
    /// `BackendUnavailable` if the model cannot be pulled
    pub async fn warm_up(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                let probe = HttpProbe::new(self.client.clone(), format!("{}/api/tags", self.base_url));
                self.supervisor.ensure_running(&probe).await?;

                if self.has_model().await? {
                    tracing::debug!(model = %self.model, "ollama model present");
                } else {
                    self.pull_model().await?;
                }
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    async fn has_model(&self) -> Result<bool> {
        let tags: TagsResponse = send_json(
            self.client.get(format!("{}/api/tags", self.base_url)),
            "ollama",
        )
        .await?;

        let tagged = format!("{}:", self.model);
        Ok(tags
            .models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(&tagged)))
    }

    async fn pull_model(&self) -> Result<()> {
        tracing::info!(model = %self.model, "pulling ollama model, this may take a while");
        let _: serde_json::Value = send_json(
            self.client
                .post(format!("{}/api/pull", self.base_url))
                .json(&serde_json::json!({ "model": self.model, "stream": false })),
            "ollama",
        )
        .await?;
        tracing::info!(model = %self.model, "ollama model pulled");
        Ok(())
    }

    /// The current user message with the reply length hint
    fn prompt_with_limit(&self, text: &str) -> String {
        format!(
            "{text}\n\nPlease respond in no more than {} words.",
            self.word_limit
        )
    }

    pub(super) async fn complete(
        &self,
        text: &str,
        history: &ConversationHistory,
        capabilities: &[CapabilityDeclaration],
    ) -> Result<ModelReply> {
        self.warm_up().await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        });
        messages.extend(history.turns().map(|turn| ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }));
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: self.prompt_with_limit(text),
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            tools: openai_tools(capabilities),
        };

        tracing::debug!(model = %self.model, history = history.len(), "sending ollama chat");

        let response: ChatResponse = send_json(
            self.client
                .post(format!("{}/api/chat", self.base_url))
                .json(&request),
            "ollama",
        )
        .await?;

        if let Some(call) = response.message.tool_calls.into_iter().flatten().next() {
            let arguments = match call.function.arguments {
                serde_json::Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
                    Error::MalformedResponse(format!(
                        "ollama: invalid arguments for {}: {e}",
                        call.function.name
                    ))
                })?,
                other => other,
            };
            tracing::info!(function = %call.function.name, "model requested a function call");
            return Ok(ModelReply::Invocation(CapabilityInvocation::new(
                call.function.name,
                arguments,
            )));
        }

        Ok(ModelReply::FinalText(response.message.content.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_word_limit() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.1", 50);
        assert_eq!(
            backend.prompt_with_limit("hi"),
            "hi\n\nPlease respond in no more than 50 words."
        );
        assert_eq!(backend.base_url, "http://localhost:11434");
    }
}
