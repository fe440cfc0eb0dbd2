//! Shared test utilities

#![allow(dead_code)]

use jarvix::home::{Credentials, HomeClient};
use jarvix::{ConversationHistory, Conversation, CapabilityRegistry};
use jarvix::llm::{ModelBackend, OpenAiBackend};
use secrecy::SecretString;
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Long-lived token accepted by the mock Home Assistant
pub const HA_TOKEN: &str = "test-long-lived-token";

/// One `/api/states` record
#[must_use]
pub fn entity_json(entity_id: &str, state: &str, friendly_name: &str) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": { "friendly_name": friendly_name },
        "last_changed": "2024-05-01T12:00:00+00:00",
    })
}

/// The entity snapshot used across tests
#[must_use]
pub fn house() -> Vec<Value> {
    vec![
        entity_json("switch.test_plug", "on", "Test Plug"),
        entity_json("light.kitchen_light", "off", "Kitchen Light"),
        entity_json("light.kitchen_island", "off", "Kitchen Island"),
        entity_json("switch.kitchen_fan", "off", "Kitchen Fan"),
        json!({ "entity_id": "sun.sun", "state": "above_horizon", "attributes": {} }),
    ]
}

/// Start a mock Home Assistant serving `entities` from `/api/states`
pub async fn mock_home(entities: Vec<Value>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/states"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entities))
        .mount(&server)
        .await;
    server
}

/// Client for `server` using the long-lived test token
#[must_use]
pub fn home_client(server: &MockServer) -> HomeClient {
    HomeClient::with_base_url(
        &server.uri(),
        Some(Credentials::LongLived(SecretString::from(HA_TOKEN.to_string()))),
    )
    .expect("mock server uri is a valid url")
}

/// `OpenAI` chat completion with plain text content
#[must_use]
pub fn openai_text(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

/// `OpenAI` chat completion requesting one function call
#[must_use]
pub fn openai_tool_call(name: &str, arguments: &Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": name, "arguments": arguments.to_string() }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

/// `OpenAI` backend pointed at `server`
#[must_use]
pub fn openai_backend(server: &MockServer) -> ModelBackend {
    ModelBackend::OpenAi(OpenAiBackend::new("sk-test".to_string(), "gpt-4o-mini").with_base_url(&server.uri()))
}

/// Conversation over `backend` with the given capabilities
#[must_use]
pub fn conversation(backend: ModelBackend, registry: CapabilityRegistry) -> Conversation {
    Conversation::new(backend, registry, ConversationHistory::new(4000))
}
