//! Model backend integration tests
//!
//! Each backend is pointed at a wiremock server speaking its wire format

use jarvix::context::{ConversationHistory, Role};
use jarvix::llm::{AnthropicBackend, ModelBackend, ModelReply, OllamaBackend};
use jarvix::tools::{CONTROL_HOME_DEVICE, CapabilityDeclaration};
use jarvix::Error;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

use common::{openai_backend, openai_text, openai_tool_call};

fn control_declaration() -> CapabilityDeclaration {
    CapabilityDeclaration {
        name: CONTROL_HOME_DEVICE.to_string(),
        description: "Control a Home Assistant device".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["turn_on", "turn_off", "toggle"] },
                "entity_name": { "type": "string" }
            },
            "required": ["action", "entity_name"]
        }),
    }
}

#[tokio::test]
async fn test_openai_plain_text_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_text("It is sunny.")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = openai_backend(&server);
    let reply = backend
        .process("What's the weather?", &ConversationHistory::new(100), &[])
        .await
        .unwrap();

    assert_eq!(reply, ModelReply::FinalText("It is sunny.".to_string()));
}

#[tokio::test]
async fn test_openai_null_tool_calls_is_plain_text() {
    // Shape sent by OpenAI-compatible proxies on ordinary answers
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "My name is Jarvix.",
                    "tool_calls": null,
                    "refusal": null
                },
                "finish_reason": "stop"
            }]
        })))
        .mount(&server)
        .await;

    let reply = openai_backend(&server)
        .process("What's your name?", &ConversationHistory::new(100), &[control_declaration()])
        .await
        .unwrap();

    assert_eq!(reply, ModelReply::FinalText("My name is Jarvix.".to_string()));
}

#[tokio::test]
async fn test_openai_tool_call_becomes_invocation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{ "type": "function", "function": { "name": CONTROL_HOME_DEVICE } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call(
            CONTROL_HOME_DEVICE,
            &json!({ "action": "turn_off", "entity_name": "test plug" }),
        )))
        .mount(&server)
        .await;

    let backend = openai_backend(&server);
    let reply = backend
        .process(
            "Turn off the test plug",
            &ConversationHistory::new(100),
            &[control_declaration()],
        )
        .await
        .unwrap();

    let ModelReply::Invocation(invocation) = reply else {
        panic!("expected an invocation, got {reply:?}");
    };
    assert_eq!(invocation.name, CONTROL_HOME_DEVICE);
    assert_eq!(invocation.arguments["action"], "turn_off");
    assert_eq!(invocation.arguments["entity_name"], "test plug");
}

#[tokio::test]
async fn test_unknown_function_becomes_notice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call(
            "launch_rocket",
            &json!({}),
        )))
        .mount(&server)
        .await;

    let reply = openai_backend(&server)
        .process("Launch", &ConversationHistory::new(100), &[control_declaration()])
        .await
        .unwrap();

    assert_eq!(
        reply,
        ModelReply::FinalText("Sorry, I tried to use an unknown function: launch_rocket.".to_string())
    );
}

#[tokio::test]
async fn test_openai_error_status_is_backend_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let err = openai_backend(&server)
        .process("Hello", &ConversationHistory::new(100), &[])
        .await
        .unwrap_err();
    assert!(err.is_backend_failure());
    assert!(matches!(err, Error::BackendUnavailable(_)));
}

#[tokio::test]
async fn test_openai_bad_arguments_are_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": CONTROL_HOME_DEVICE, "arguments": "{not json" }
                    }]
                }
            }]
        })))
        .mount(&server)
        .await;

    let err = openai_backend(&server)
        .process("Hello", &ConversationHistory::new(100), &[control_declaration()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
}

#[tokio::test]
async fn test_anthropic_tool_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "max_tokens": 1000,
            "tools": [{ "name": CONTROL_HOME_DEVICE }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                { "type": "text", "text": "Turning it on." },
                {
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": CONTROL_HOME_DEVICE,
                    "input": { "action": "turn_on", "entity_name": "kitchen light" }
                }
            ],
            "stop_reason": "tool_use"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = ModelBackend::Anthropic(
        AnthropicBackend::new("sk-ant-test".to_string(), "claude-3-haiku-20240307")
            .with_base_url(&server.uri()),
    );
    let reply = backend
        .process(
            "Turn on the kitchen light",
            &ConversationHistory::new(100),
            &[control_declaration()],
        )
        .await
        .unwrap();

    let ModelReply::Invocation(invocation) = reply else {
        panic!("expected an invocation, got {reply:?}");
    };
    assert_eq!(invocation.arguments["entity_name"], "kitchen light");
}

#[tokio::test]
async fn test_anthropic_text_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{ "type": "text", "text": "Hello there." }]
        })))
        .mount(&server)
        .await;

    let backend = ModelBackend::Anthropic(
        AnthropicBackend::new("sk-ant-test".to_string(), "claude-3-haiku-20240307")
            .with_base_url(&server.uri()),
    );
    let reply = backend
        .process("Hi", &ConversationHistory::new(100), &[])
        .await
        .unwrap();

    assert_eq!(reply, ModelReply::FinalText("Hello there.".to_string()));
}

async fn mock_ollama_tags(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llama3.1:latest" }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_ollama_sends_history_and_word_limit() {
    let server = MockServer::start().await;
    mock_ollama_tags(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.1",
            "stream": false,
            "messages": [
                { "role": "system" },
                { "role": "user", "content": "What's my name?" },
                { "role": "assistant", "content": "You haven't told me." },
                {
                    "role": "user",
                    "content": "I'm Sam. Remember it.\n\nPlease respond in no more than 40 words."
                }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.1",
            "message": { "role": "assistant", "content": "Got it, Sam." },
            "done": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut history = ConversationHistory::new(100);
    history.append(Role::User, "What's my name?");
    history.append(Role::Assistant, "You haven't told me.");

    let backend = ModelBackend::Ollama(OllamaBackend::new(&server.uri(), "llama3.1", 40));
    assert!(backend.is_stateful());

    let reply = backend
        .process("I'm Sam. Remember it.", &history, &[])
        .await
        .unwrap();
    assert_eq!(reply, ModelReply::FinalText("Got it, Sam.".to_string()));
}

#[tokio::test]
async fn test_ollama_null_tool_calls_is_plain_text() {
    let server = MockServer::start().await;
    mock_ollama_tags(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "Hello!", "tool_calls": null },
            "done": true
        })))
        .mount(&server)
        .await;

    let backend = ModelBackend::Ollama(OllamaBackend::new(&server.uri(), "llama3.1", 40));
    let reply = backend
        .process("Hi", &ConversationHistory::new(100), &[])
        .await
        .unwrap();

    assert_eq!(reply, ModelReply::FinalText("Hello!".to_string()));
}

#[tokio::test]
async fn test_ollama_pulls_missing_model_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .and(body_partial_json(json!({ "model": "mistral", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "function": {
                        "name": CONTROL_HOME_DEVICE,
                        "arguments": { "action": "toggle", "entity_name": "fan" }
                    }
                }]
            },
            "done": true
        })))
        .expect(2)
        .mount(&server)
        .await;

    let backend = ModelBackend::Ollama(OllamaBackend::new(&server.uri(), "mistral", 100));
    let history = ConversationHistory::new(100);

    for _ in 0..2 {
        let reply = backend
            .process("Toggle the fan", &history, &[control_declaration()])
            .await
            .unwrap();
        let ModelReply::Invocation(invocation) = reply else {
            panic!("expected an invocation, got {reply:?}");
        };
        assert_eq!(invocation.arguments["action"], "toggle");
    }
}

#[test]
fn test_backend_kind_parsing() {
    use jarvix::llm::BackendKind;

    assert_eq!("gpt".parse::<BackendKind>().unwrap(), BackendKind::Gpt);
    assert_eq!("Claude".parse::<BackendKind>().unwrap(), BackendKind::Claude);
    assert_eq!("OLLAMA".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
    assert!(matches!(
        "gemini".parse::<BackendKind>(),
        Err(Error::UnsupportedBackend(_))
    ));
}
