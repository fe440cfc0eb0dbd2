//! `OpenAI` chat completions backend

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ModelReply, SYSTEM_PROMPT, openai_tools, send_json};
use crate::tools::{CapabilityDeclaration, CapabilityInvocation};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    /// Compatible servers send `null` on plain replies
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
    /// JSON-encoded argument object
    arguments: String,
}

/// Stateless chat completions client
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiBackend {
    #[must_use]
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(api_key),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different API host (proxies, tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(super) async fn complete(
        &self,
        text: &str,
        capabilities: &[CapabilityDeclaration],
    ) -> Result<ModelReply> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            tools: openai_tools(capabilities),
        };

        tracing::debug!(model = %self.model, "sending chat completion");

        let response: ChatResponse = send_json(
            self.client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(self.api_key.expose_secret())
                .json(&request),
            "openai",
        )
        .await?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| Error::MalformedResponse("openai: no choices".to_string()))?;

        if let Some(call) = message.tool_calls.into_iter().flatten().next() {
            let arguments: serde_json::Value = serde_json::from_str(&call.function.arguments)
                .map_err(|e| {
                    Error::MalformedResponse(format!(
                        "openai: invalid arguments for {}: {e}",
                        call.function.name
                    ))
                })?;
            tracing::info!(function = %call.function.name, "model requested a function call");
            return Ok(ModelReply::Invocation(CapabilityInvocation::new(
                call.function.name,
                arguments,
            )));
        }

        Ok(ModelReply::FinalText(message.content.unwrap_or_default()))
    }
}
