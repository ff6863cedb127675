use docchat_lib::config::LlmConfig;
use docchat_lib::llm::{ChatMessage, ChatRequest, SamplingParams};
use docchat_lib::{ChatModel, LlmError, Provider};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> Provider {
    let config = LlmConfig {
        provider: "together".into(),
        base_url: Some(server.uri()),
        api_key: Some("test-key".into()),
        ..LlmConfig::default()
    };
    Provider::from_config(&config).unwrap()
}

fn request() -> ChatRequest {
    ChatRequest {
        messages: vec![ChatMessage::user("Say hello")],
        model: "test-model".into(),
        sampling: SamplingParams::default(),
    }
}

fn sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        let event = json!({ "choices": [{ "delta": { "content": delta }, "finish_reason": null }] });
        body.push_str(&format!("data: {}\n\n", event));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn test_streamed_deltas_join_into_one_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": true,
            "top_k": 70,
            "stop": ["<|eot_id|>", "<|eom_id|>"]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse(&["Hel", "lo, ", "world"]), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let reply = provider_for(&server).complete(&request()).await.unwrap();
    assert_eq!(reply, "Hello, world");
}

#[tokio::test]
async fn test_server_error_is_reported_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = provider_for(&server).complete(&request()).await.unwrap_err();
    match err {
        LlmError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ollama_sends_no_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse(&["ok"]), "text/event-stream"))
        .mount(&server)
        .await;

    let provider = Provider::ollama(server.uri());
    assert_eq!(provider.complete(&request()).await.unwrap(), "ok");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(!received[0].headers.contains_key("authorization"));
}
