use futures::StreamExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wayfarer::config::LlmConfig;
use wayfarer::error::WayfarerError;
use wayfarer::llm::{LlmApiClient, LlmProvider, TextGenerator};

fn llm_config(base_url: String) -> LlmConfig {
    LlmConfig {
        model: "openai/gpt-4o-mini".to_string(),
        api_key: Some("test-key".to_string()),
        base_url: Some(base_url),
        timeout_secs: 5,
        max_retries: 0,
        temperature: None,
    }
}

fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for delta in deltas {
        let chunk = json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "delta": { "content": delta },
                "finish_reason": null
            }]
        });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_stream(server: &MockServer, deltas: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(sse_body(deltas), "text/event-stream"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_stream_yields_deltas_in_order() {
    let server = MockServer::start().await;
    mount_stream(&server, &["{\"city\": ", "\"Lisbon\"", "}"]).await;

    let client = LlmApiClient::new(&llm_config(server.uri())).unwrap();
    let chunks: Vec<String> = client
        .complete_stream("Describe the city of Lisbon")
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;

    assert_eq!(chunks, vec!["{\"city\": ", "\"Lisbon\"", "}"]);
}

#[tokio::test]
async fn test_provider_collects_generation() {
    let server = MockServer::start().await;
    mount_stream(&server, &["Hel", "lo"]).await;

    let provider = LlmProvider::new(Some(&llm_config(server.uri())));
    assert!(provider.is_available());

    let text = provider.generate("Say hello").await.unwrap();
    assert_eq!(text, "Hello");
}

#[tokio::test]
async fn test_unauthorized_open_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {
                "message": "Invalid API key",
                "type": "invalid_request_error",
                "param": null,
                "code": "invalid_api_key"
            }
        })))
        .mount(&server)
        .await;

    let client = LlmApiClient::new(&llm_config(server.uri())).unwrap();
    let result = client.complete_stream("Describe the city of Lisbon").await;

    assert!(matches!(result, Err(WayfarerError::LlmUnavailable(_))));
}
