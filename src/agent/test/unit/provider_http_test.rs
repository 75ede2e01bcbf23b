//! HTTP-level tests for the chat providers against a local mock server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::agent::errors::UpstreamError;

fn openai(server: &MockServer) -> OpenAIProvider {
    OpenAIProvider::new(
        &Endpoint {
            model: "test-model".to_string(),
            api_key: "sk-test".to_string(),
            base_url: format!("{}/v1/", server.uri()),
        },
        0.6,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn upstream(err: anyhow::Error) -> UpstreamError {
    UpstreamError::classify(&err)
}

#[tokio::test]
async fn openai_text_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "messages": [
                {"role": "system", "content": "be nice"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "hello"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = openai(&server)
        .chat(&[Message::system("be nice"), Message::user("hi")], None)
        .await
        .unwrap();

    assert_eq!(reply, LLMResponse::text("hello"));
}

#[tokio::test]
async fn openai_parses_tool_calls_and_sends_schemas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{"type": "function", "function": {"name": "weather"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "weather", "arguments": "{\"city\":\"Oslo\"}"}
                }]
            }}]
        })))
        .mount(&server)
        .await;

    let tools = vec![ToolSchema {
        name: "weather".to_string(),
        description: "Current weather".to_string(),
        parameters: json!({"type": "object"}),
    }];
    let reply = openai(&server)
        .chat(&[Message::user("weather in Oslo?")], Some(&tools))
        .await
        .unwrap();

    assert!(reply.has_tool_calls());
    assert_eq!(reply.content, "");
    assert_eq!(
        reply.tool_calls,
        vec![ToolCall {
            id: "call_1".to_string(),
            name: "weather".to_string(),
            arguments: "{\"city\":\"Oslo\"}".to_string(),
        }]
    );
}

#[tokio::test]
async fn openai_sends_images_as_content_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "max_tokens": 2048,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                    {"type": "text", "text": "what is this?"}
                ]
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "a square"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let message = Message::user("what is this?").with_image(ImageData {
        media_type: "image/png".to_string(),
        data: "AAAA".to_string(),
    });
    let reply = openai(&server)
        .with_max_tokens(2048)
        .chat(&[message], None)
        .await
        .unwrap();
    assert_eq!(reply.content, "a square");
}

#[tokio::test]
async fn openai_status_codes_map_to_taxonomy() {
    let cases = [
        (401, "auth"),
        (400, "bad_request"),
        (500, "server"),
        (502, "gateway"),
    ];

    for (status, kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = openai(&server)
            .chat(&[Message::user("hi")], None)
            .await
            .unwrap_err();

        let matched = match upstream(err) {
            UpstreamError::Auth(_) => "auth",
            UpstreamError::BadRequest(_) => "bad_request",
            UpstreamError::Server(_) => "server",
            UpstreamError::Gateway(_) => "gateway",
            other => panic!("status {status}: unexpected {other:?}"),
        };
        assert_eq!(matched, kind, "status {status}");
    }
}

#[tokio::test]
async fn openai_timeout_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(3))
                .set_body_json(json!({"choices": [{"message": {"content": "late"}}]})),
        )
        .mount(&server)
        .await;

    let provider = OpenAIProvider::new(
        &Endpoint {
            model: "m".to_string(),
            api_key: "k".to_string(),
            base_url: format!("{}/v1", server.uri()),
        },
        0.6,
        Duration::from_millis(200),
    )
    .unwrap();

    let err = provider.chat(&[Message::user("hi")], None).await.unwrap_err();
    assert!(matches!(upstream(err), UpstreamError::Timeout(_)));
}

#[tokio::test]
async fn openai_error_object_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"message": "model overloaded"}
        })))
        .mount(&server)
        .await;

    let err = openai(&server)
        .chat(&[Message::user("hi")], None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("model overloaded"));
}

#[tokio::test]
async fn ollama_reply_and_synthesized_call_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "stream": false,
            "options": {"temperature": 0.5}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "lookup", "arguments": {"q": "rust"}}}
                ]
            },
            "done": true
        })))
        .mount(&server)
        .await;

    let provider =
        OllamaProvider::new(&server.uri(), "llama3", 0.5, Duration::from_secs(5)).unwrap();
    let reply = provider.chat(&[Message::user("search")], None).await.unwrap();

    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.tool_calls[0].id, "call_0");
    assert_eq!(reply.tool_calls[0].name, "lookup");
    let args: serde_json::Value = serde_json::from_str(&reply.tool_calls[0].arguments).unwrap();
    assert_eq!(args, json!({"q": "rust"}));
}

#[tokio::test]
async fn ollama_unavailable_maps_to_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let provider =
        OllamaProvider::new(&server.uri(), "llama3", 0.6, Duration::from_secs(5)).unwrap();
    let err = provider.chat(&[Message::user("hi")], None).await.unwrap_err();
    assert!(matches!(upstream(err), UpstreamError::Gateway(_)));
}

#[test]
fn create_provider_respects_local_flag() {
    let mut config = Config::default();
    assert_eq!(create_provider(&config).unwrap().model(), "gpt-4o-mini");

    config.use_local_model = true;
    config.local_model = "qwen2".to_string();
    assert_eq!(create_provider(&config).unwrap().model(), "qwen2");

    config.vision_model = Some("vl".to_string());
    assert_eq!(create_vision_provider(&config).unwrap().model(), "vl");
}
