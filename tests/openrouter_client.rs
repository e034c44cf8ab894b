use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tech_image_server::models::chat::ChatTurn;
use tech_image_server::upstream::extract;
use tech_image_server::upstream::openrouter::OpenRouterClient;
use tech_image_server::upstream::{ChatProvider, ImageProvider, UpstreamError};

fn client_for(server: &MockServer) -> OpenRouterClient {
    OpenRouterClient::new(
        Some("test-key".into()),
        &format!("{}/api/v1", server.uri()),
        "img-model".into(),
        "chat-model".into(),
    )
    .unwrap()
    .with_referer(Some("https://tech-image.test".into()))
}

#[tokio::test]
async fn test_image_request_succeeds_and_extracts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("x-title", "Tech-Image AI Studio"))
        .and(header("http-referer", "https://tech-image.test"))
        .and(body_partial_json(json!({ "model": "img-model", "modalities": ["image"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": {
                "images": [{ "image_url": { "url": "data:image/png;base64,AAAA" } }]
            }}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client_for(&server)
        .generate_image("a red bicycle --ar 4:3", None)
        .await
        .unwrap();
    assert_eq!(
        extract::result_reference(&payload).as_deref(),
        Some("data:image/png;base64,AAAA")
    );
}

#[tokio::test]
async fn test_image_request_honours_model_override() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "model": "other/model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "url": "https://cdn.test/out.webp" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = client_for(&server)
        .generate_image("a fox", Some("other/model"))
        .await
        .unwrap();
    assert_eq!(
        extract::result_reference(&payload).as_deref(),
        Some("https://cdn.test/out.webp")
    );
}

#[tokio::test]
async fn test_error_object_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "code": 402, "message": "Insufficient credits on provider" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate_image("x", None).await.unwrap_err();
    assert_eq!(
        err,
        UpstreamError::Api {
            code: Some(402),
            message: "Insufficient credits on provider".into()
        }
    );
}

#[tokio::test]
async fn test_error_object_with_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": { "message": "Model is overloaded" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate_image("x", None).await.unwrap_err();
    assert_eq!(
        err,
        UpstreamError::Api {
            code: None,
            message: "Model is overloaded".into()
        }
    );
}

#[tokio::test]
async fn test_null_error_field_is_not_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": null,
            "choices": [{ "message": { "images": [{ "url": "https://cdn.test/ok.png" }] } }]
        })))
        .mount(&server)
        .await;

    let payload = client_for(&server).generate_image("x", None).await.unwrap();
    assert_eq!(
        extract::result_reference(&payload).as_deref(),
        Some("https://cdn.test/ok.png")
    );
}

#[tokio::test]
async fn test_non_json_failure_keeps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>Service Unavailable</html>"))
        .mount(&server)
        .await;

    match client_for(&server).generate_image("x", None).await {
        Err(UpstreamError::Api { code, .. }) => assert_eq!(code, Some(503)),
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    let client = OpenRouterClient::new(
        Some("test-key".into()),
        "http://127.0.0.1:1/api/v1",
        "img-model".into(),
        "chat-model".into(),
    )
    .unwrap();

    let err = client.generate_image("x", None).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_chat_sends_system_prompt_and_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_partial_json(json!({ "model": "chat-model", "max_tokens": 1024 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Use golden hour light." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let turns = vec![ChatTurn {
        role: "user".into(),
        content: "How do I light a portrait?".into(),
    }];
    let payload = client.chat(&turns).await.unwrap();
    assert_eq!(
        extract::chat_reply(&payload).as_deref(),
        Some("Use golden hour light.")
    );
    assert_eq!(client.model(), "chat-model");

    let requests = server.received_requests().await.unwrap();
    let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = sent["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["content"], "How do I light a portrait?");
}
