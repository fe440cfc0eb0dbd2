//! Anthropic messages backend

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ModelReply, SYSTEM_PROMPT, send_json};
use crate::tools::{CapabilityDeclaration, CapabilityInvocation};
use crate::Result;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1000;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Tool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

/// Stateless Claude client
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl AnthropicBackend {
    #[must_use]
    pub fn new(api_key: String, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: SecretString::from(api_key),
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

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
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: text,
            }],
            tools: capabilities
                .iter()
                .map(|c| Tool {
                    name: &c.name,
                    description: &c.description,
                    input_schema: &c.parameters,
                })
                .collect(),
        };

        tracing::debug!(model = %self.model, "sending messages request");

        let response: MessagesResponse = send_json(
            self.client
                .post(format!("{}/v1/messages", self.base_url))
                .header("x-api-key", self.api_key.expose_secret())
                .header("anthropic-version", API_VERSION)
                .json(&request),
            "anthropic",
        )
        .await?;

        let mut text = String::new();
        for block in response.content {
            match block {
                ContentBlock::ToolUse { name, input } => {
                    tracing::info!(function = %name, "model requested a function call");
                    return Ok(ModelReply::Invocation(CapabilityInvocation::new(name, input)));
                }
                ContentBlock::Text { text: chunk } => text.push_str(&chunk),
                ContentBlock::Other => {}
            }
        }

        Ok(ModelReply::FinalText(text))
    }
}
